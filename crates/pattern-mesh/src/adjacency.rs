//! Mesh topology queries via adjacency structures.

use hashbrown::HashMap;

/// Canonical (smaller, larger) key for an undirected edge.
#[inline]
pub fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Lightweight topology structure for mesh queries.
///
/// Provides edge-to-face lookups without the overhead of a full half-edge
/// data structure. Face lists are in ascending face order, so traversals
/// built on top are deterministic.
#[derive(Debug, Clone)]
pub struct MeshAdjacency {
    /// Maps edge (min_idx, max_idx) → list of face indices that share this edge.
    pub edge_to_faces: HashMap<(u32, u32), Vec<u32>>,
}

impl MeshAdjacency {
    /// Build adjacency structures from a face list.
    pub fn build(faces: &[[u32; 3]]) -> Self {
        let mut edge_to_faces: HashMap<(u32, u32), Vec<u32>> = HashMap::new();

        for (face_idx, &[v0, v1, v2]) in faces.iter().enumerate() {
            let face_idx = face_idx as u32;

            for &(a, b) in &[(v0, v1), (v1, v2), (v2, v0)] {
                edge_to_faces.entry(edge_key(a, b)).or_default().push(face_idx);
            }
        }

        Self { edge_to_faces }
    }

    /// Boundary edges (exactly 1 adjacent face), sorted.
    pub fn boundary_edges(&self) -> Vec<(u32, u32)> {
        self.edges_where(|count| count == 1)
    }

    /// Non-manifold edges (more than 2 adjacent faces), sorted.
    pub fn non_manifold_edges(&self) -> Vec<(u32, u32)> {
        self.edges_where(|count| count > 2)
    }

    fn edges_where(&self, pred: impl Fn(usize) -> bool) -> Vec<(u32, u32)> {
        let mut edges: Vec<(u32, u32)> = self
            .edge_to_faces
            .iter()
            .filter(|(_, faces)| pred(faces.len()))
            .map(|(&edge, _)| edge)
            .collect();
        edges.sort_unstable();
        edges
    }

    /// Check if the mesh is manifold.
    ///
    /// A manifold mesh has at most 2 faces for every edge.
    /// (Edges with 1 face are boundary edges, which is allowed.)
    pub fn is_manifold(&self) -> bool {
        self.edge_to_faces.values().all(|faces| faces.len() <= 2)
    }

    /// Check if the mesh is watertight (no boundary edges).
    pub fn is_watertight(&self) -> bool {
        self.edge_to_faces.values().all(|faces| faces.len() >= 2)
    }

    /// Count boundary edges.
    pub fn boundary_edge_count(&self) -> usize {
        self.edge_to_faces
            .values()
            .filter(|faces| faces.len() == 1)
            .count()
    }

    /// Count non-manifold edges.
    pub fn non_manifold_edge_count(&self) -> usize {
        self.edge_to_faces
            .values()
            .filter(|faces| faces.len() > 2)
            .count()
    }

    /// Get faces adjacent to an edge.
    /// The edge is automatically canonicalized (min, max).
    pub fn faces_for_edge(&self, v0: u32, v1: u32) -> Option<&[u32]> {
        self.edge_to_faces.get(&edge_key(v0, v1)).map(|v| v.as_slice())
    }

    /// Faces sharing an edge with `face`, in edge order (v0v1, v1v2, v2v0).
    pub fn face_neighbors(&self, faces: &[[u32; 3]], face: u32) -> Vec<u32> {
        let [a, b, c] = faces[face as usize];
        let mut out = Vec::with_capacity(3);
        for (p, q) in [(a, b), (b, c), (c, a)] {
            if let Some(shared) = self.faces_for_edge(p, q) {
                out.extend(shared.iter().copied().filter(|&f| f != face));
            }
        }
        out
    }

    /// Number of edge-connected face components.
    pub fn component_count(&self, faces: &[[u32; 3]]) -> usize {
        let mut seen = vec![false; faces.len()];
        let mut components = 0;
        let mut stack = Vec::new();

        for start in 0..faces.len() {
            if seen[start] {
                continue;
            }
            components += 1;
            seen[start] = true;
            stack.push(start as u32);
            while let Some(face) = stack.pop() {
                for next in self.face_neighbors(faces, face) {
                    if !seen[next as usize] {
                        seen[next as usize] = true;
                        stack.push(next);
                    }
                }
            }
        }

        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_triangle() -> Vec<[u32; 3]> {
        vec![[0, 1, 2]]
    }

    fn two_triangles_shared_edge() -> Vec<[u32; 3]> {
        vec![[0, 1, 2], [1, 0, 3]]
    }

    fn tetrahedron() -> Vec<[u32; 3]> {
        vec![[0, 1, 2], [0, 2, 3], [0, 3, 1], [1, 3, 2]]
    }

    #[test]
    fn test_single_triangle_is_not_watertight() {
        let adj = MeshAdjacency::build(&single_triangle());
        assert!(!adj.is_watertight());
        assert!(adj.is_manifold());
        assert_eq!(adj.boundary_edges(), vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn test_two_triangles_shared_edge() {
        let faces = two_triangles_shared_edge();
        let adj = MeshAdjacency::build(&faces);
        let shared = adj.faces_for_edge(0, 1).expect("edge exists");
        assert_eq!(shared.len(), 2);
        assert_eq!(adj.boundary_edge_count(), 4);
        assert_eq!(adj.face_neighbors(&faces, 0), vec![1]);
    }

    #[test]
    fn test_tetrahedron_is_watertight() {
        let adj = MeshAdjacency::build(&tetrahedron());
        assert!(adj.is_watertight());
        assert!(adj.is_manifold());
        assert_eq!(adj.non_manifold_edge_count(), 0);
    }

    #[test]
    fn test_fin_is_non_manifold() {
        let faces = vec![[0, 1, 2], [1, 0, 3], [0, 1, 4]];
        let adj = MeshAdjacency::build(&faces);
        assert!(!adj.is_manifold());
        assert_eq!(adj.non_manifold_edges(), vec![(0, 1)]);
    }

    #[test]
    fn test_component_count() {
        let faces = vec![[0, 1, 2], [1, 0, 3], [4, 5, 6]];
        let adj = MeshAdjacency::build(&faces);
        assert_eq!(adj.component_count(&faces), 2);
    }

    #[test]
    fn test_edge_canonicalization() {
        let adj = MeshAdjacency::build(&two_triangles_shared_edge());
        assert_eq!(adj.faces_for_edge(0, 1), adj.faces_for_edge(1, 0));
    }
}
