//! Winding order correction.

use std::collections::VecDeque;
use tracing::{debug, info};

use crate::adjacency::MeshAdjacency;
use crate::Mesh;

/// Fix winding order so adjacent faces have consistent orientation.
///
/// BFS flood fill from the lowest unvisited face of every edge-connected
/// component; each component keeps the orientation of its seed face. A
/// neighbour that traverses a shared edge in the same direction as the
/// (already corrected) current face is flipped.
///
/// Returns the number of faces that were flipped.
pub fn fix_winding_order(mesh: &mut Mesh) -> usize {
    if mesh.faces.is_empty() {
        return 0;
    }

    let adjacency = MeshAdjacency::build(&mesh.faces);
    let mut visited = vec![false; mesh.faces.len()];
    let mut flipped = 0usize;
    let mut components = 0usize;
    let mut queue: VecDeque<u32> = VecDeque::new();

    for seed in 0..mesh.faces.len() {
        if visited[seed] {
            continue;
        }
        components += 1;
        visited[seed] = true;
        queue.push_back(seed as u32);

        while let Some(face_idx) = queue.pop_front() {
            let face = mesh.faces[face_idx as usize];

            for edge_idx in 0..3 {
                let v0 = face[edge_idx];
                let v1 = face[(edge_idx + 1) % 3];

                let Some(neighbors) = adjacency.faces_for_edge(v0, v1) else {
                    continue;
                };

                for &neighbor_idx in neighbors {
                    if neighbor_idx == face_idx || visited[neighbor_idx as usize] {
                        continue;
                    }
                    visited[neighbor_idx as usize] = true;

                    let neighbor = &mut mesh.faces[neighbor_idx as usize];
                    if edge_direction_in_face(neighbor, v0, v1) == Some(true) {
                        neighbor.swap(1, 2);
                        flipped += 1;
                    }

                    queue.push_back(neighbor_idx);
                }
            }
        }
    }

    if flipped > 0 {
        info!(
            "Fixed winding order: flipped {} faces across {} components",
            flipped, components
        );
    } else {
        debug!("Winding order already consistent");
    }

    flipped
}

/// Check if edge (a, b) appears in face in the same direction (a -> b).
/// Returns Some(true) if same direction, Some(false) if opposite, None if edge not found.
pub fn edge_direction_in_face(face: &[u32; 3], a: u32, b: u32) -> Option<bool> {
    for i in 0..3 {
        let v0 = face[i];
        let v1 = face[(i + 1) % 3];

        if v0 == a && v1 == b {
            return Some(true);
        }
        if v0 == b && v1 == a {
            return Some(false);
        }
    }
    None
}
