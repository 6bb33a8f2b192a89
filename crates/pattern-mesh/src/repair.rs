//! Surface clean-up: degenerate removal and compaction.

use hashbrown::HashMap;
use tracing::info;

use crate::{Mesh, Triangle};

/// Remove triangles with area below threshold or repeated indices.
///
/// Returns the number of triangles removed.
pub fn remove_degenerate_triangles(mesh: &mut Mesh, area_threshold: f64) -> usize {
    let original_count = mesh.faces.len();
    let vertices = &mesh.vertices;

    mesh.faces.retain(|&[i0, i1, i2]| {
        if i0 == i1 || i1 == i2 || i0 == i2 {
            return false;
        }
        let tri = Triangle::new(
            vertices[i0 as usize].position,
            vertices[i1 as usize].position,
            vertices[i2 as usize].position,
        );
        tri.area() >= area_threshold
    });

    let removed = original_count - mesh.faces.len();
    if removed > 0 {
        info!("Removed {} degenerate triangles (area < {:.6})", removed, area_threshold);
    }
    removed
}

/// Remove unreferenced vertices and compact the vertex array.
///
/// Vertex order is preserved. Returns the old-to-new index map; unreferenced
/// vertices are absent from it.
pub fn remove_unreferenced_vertices(mesh: &mut Mesh) -> HashMap<u32, u32> {
    let original_count = mesh.vertices.len();

    let mut referenced = vec![false; original_count];
    for face in &mesh.faces {
        for &v in face {
            referenced[v as usize] = true;
        }
    }

    let mut new_vertices = Vec::with_capacity(original_count);
    let mut remap: HashMap<u32, u32> = HashMap::with_capacity(original_count);

    for (old_idx, vertex) in mesh.vertices.iter().enumerate() {
        if referenced[old_idx] {
            remap.insert(old_idx as u32, new_vertices.len() as u32);
            new_vertices.push(vertex.clone());
        }
    }

    if new_vertices.len() == original_count {
        return remap;
    }

    for face in &mut mesh.faces {
        *face = face.map(|v| remap[&v]);
    }

    let removed = original_count - new_vertices.len();
    mesh.vertices = new_vertices;
    info!("Removed {} unreferenced vertices", removed);

    remap
}
