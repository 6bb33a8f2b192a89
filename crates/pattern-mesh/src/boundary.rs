//! Boundary loop extraction.

use hashbrown::HashMap;
use tracing::debug;

use crate::adjacency::MeshAdjacency;
use crate::error::{MeshError, MeshResult};
use crate::Mesh;

/// A closed chain of boundary vertices.
///
/// Vertices follow the direction of the faces' boundary half-edges, so for
/// consistently wound faces the outer boundary runs counter-clockwise when
/// viewed from the front and holes run clockwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryLoop {
    pub vertices: Vec<u32>,
}

impl BoundaryLoop {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// 3D length of the closed loop.
    pub fn length(&self, mesh: &Mesh) -> f64 {
        let n = self.vertices.len();
        (0..n)
            .map(|i| {
                let a = mesh.position(self.vertices[i]);
                let b = mesh.position(self.vertices[(i + 1) % n]);
                (b - a).norm()
            })
            .sum()
    }
}

/// Extract all boundary loops of a consistently wound surface.
///
/// Loops are returned longest first (3D length); the first loop of a
/// disc-like patch is its outer boundary. Each loop starts at its lowest
/// vertex index.
///
/// Fails with [`MeshError::PinchedBoundary`] when a vertex has more than one
/// outgoing boundary half-edge (bow-tie) and with [`MeshError::OpenBoundary`]
/// when a chain does not close.
pub fn boundary_loops(mesh: &Mesh) -> MeshResult<Vec<BoundaryLoop>> {
    let adjacency = MeshAdjacency::build(&mesh.faces);

    let mut next: HashMap<u32, u32> = HashMap::new();
    for &[a, b, c] in &mesh.faces {
        for (p, q) in [(a, b), (b, c), (c, a)] {
            let is_boundary = adjacency
                .faces_for_edge(p, q)
                .is_some_and(|faces| faces.len() == 1);
            if !is_boundary {
                continue;
            }
            if next.insert(p, q).is_some() {
                let outgoing = mesh
                    .faces
                    .iter()
                    .flat_map(|&[a, b, c]| [(a, b), (b, c), (c, a)])
                    .filter(|&(s, e)| {
                        s == p
                            && adjacency
                                .faces_for_edge(s, e)
                                .is_some_and(|faces| faces.len() == 1)
                    })
                    .count();
                return Err(MeshError::PinchedBoundary { vertex: p, outgoing });
            }
        }
    }

    let mut starts: Vec<u32> = next.keys().copied().collect();
    starts.sort_unstable();

    let mut used: HashMap<u32, bool> = HashMap::with_capacity(starts.len());
    let mut loops = Vec::new();

    for &start in &starts {
        if used.get(&start).copied().unwrap_or(false) {
            continue;
        }

        let mut chain = vec![start];
        used.insert(start, true);
        let mut current = start;

        loop {
            let Some(&succ) = next.get(&current) else {
                return Err(MeshError::OpenBoundary { start });
            };
            if succ == start {
                break;
            }
            if used.get(&succ).copied().unwrap_or(false) {
                return Err(MeshError::OpenBoundary { start });
            }
            used.insert(succ, true);
            chain.push(succ);
            current = succ;
        }

        loops.push(BoundaryLoop { vertices: chain });
    }

    // Stable sort keeps the lowest-start order among equal lengths.
    let mut measured: Vec<(f64, BoundaryLoop)> =
        loops.into_iter().map(|l| (l.length(mesh), l)).collect();
    measured.sort_by(|a, b| b.0.total_cmp(&a.0));

    debug!("Extracted {} boundary loops", measured.len());

    Ok(measured.into_iter().map(|(_, l)| l).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;

    /// 3x3 grid of quads with the centre quad removed.
    fn frame() -> Mesh {
        let mut mesh = Mesh::new();
        for j in 0..4 {
            for i in 0..4 {
                mesh.vertices.push(Vertex::from_coords(i as f64, j as f64, 0.0));
            }
        }
        for j in 0..3u32 {
            for i in 0..3u32 {
                if i == 1 && j == 1 {
                    continue;
                }
                let a = j * 4 + i;
                let (b, c, d) = (a + 1, a + 5, a + 4);
                mesh.faces.push([a, b, c]);
                mesh.faces.push([a, c, d]);
            }
        }
        mesh
    }

    #[test]
    fn test_square_has_one_ccw_loop() {
        let mesh = Mesh::from_parts(
            [
                nalgebra::Point3::new(0.0, 0.0, 0.0),
                nalgebra::Point3::new(1.0, 0.0, 0.0),
                nalgebra::Point3::new(1.0, 1.0, 0.0),
                nalgebra::Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        );
        let loops = boundary_loops(&mesh).unwrap();
        assert_eq!(loops, vec![BoundaryLoop { vertices: vec![0, 1, 2, 3] }]);
    }

    #[test]
    fn test_frame_has_outer_loop_and_hole() {
        let mesh = frame();
        let loops = boundary_loops(&mesh).unwrap();

        assert_eq!(loops.len(), 2);
        assert_eq!(loops[0].len(), 12);
        assert_eq!(loops[1].len(), 4);
        assert!((loops[0].length(&mesh) - 12.0).abs() < 1e-12);
        assert!((loops[1].length(&mesh) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_bow_tie_is_pinched() {
        let mesh = Mesh::from_parts(
            [
                nalgebra::Point3::new(0.0, 0.0, 0.0),
                nalgebra::Point3::new(-1.0, -1.0, 0.0),
                nalgebra::Point3::new(1.0, -1.0, 0.0),
                nalgebra::Point3::new(1.0, 1.0, 0.0),
                nalgebra::Point3::new(-1.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 3, 4]],
        );
        let err = boundary_loops(&mesh).unwrap_err();
        assert!(matches!(err, MeshError::PinchedBoundary { vertex: 0, outgoing: 2 }));
    }

    #[test]
    fn test_closed_surface_has_no_loops() {
        let mesh = Mesh::from_parts(
            [
                nalgebra::Point3::new(0.0, 0.0, 0.0),
                nalgebra::Point3::new(1.0, 0.0, 0.0),
                nalgebra::Point3::new(0.5, 1.0, 0.0),
                nalgebra::Point3::new(0.5, 0.5, 1.0),
            ],
            vec![[0, 1, 2], [0, 3, 1], [1, 3, 2], [2, 3, 0]],
        );
        assert!(boundary_loops(&mesh).unwrap().is_empty());
    }
}
