//! Surface validation and reporting.

use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::adjacency::MeshAdjacency;
use crate::Mesh;

/// Validation report for a garment surface.
#[derive(Debug, Clone)]
pub struct MeshReport {
    /// Total vertex count.
    pub vertex_count: usize,

    /// Total face count.
    pub face_count: usize,

    /// Faces referencing a vertex index past the end of the vertex array.
    pub out_of_range_faces: usize,

    /// Faces that use the same vertex index more than once.
    pub repeated_index_faces: usize,

    /// Faces with (near) zero area.
    pub degenerate_faces: usize,

    /// Number of boundary edges (edges with 1 adjacent face).
    pub boundary_edge_count: usize,

    /// Number of non-manifold edges (edges with >2 adjacent faces).
    pub non_manifold_edge_count: usize,

    /// Edge-connected face components.
    pub component_count: usize,

    /// Bounding box as (min_corner, max_corner).
    pub bounds: Option<(Point3<f64>, Point3<f64>)>,
}

impl MeshReport {
    /// Non-empty, all indices in range, no repeated indices.
    pub fn is_well_formed(&self) -> bool {
        self.vertex_count > 0
            && self.face_count > 0
            && self.out_of_range_faces == 0
            && self.repeated_index_faces == 0
    }

    /// Every edge has at most two adjacent faces.
    pub fn is_manifold(&self) -> bool {
        self.non_manifold_edge_count == 0
    }

    /// Well formed and manifold; open boundaries are expected on garments.
    pub fn is_valid(&self) -> bool {
        self.is_well_formed() && self.is_manifold()
    }
}

impl std::fmt::Display for MeshReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Surface Report:")?;
        writeln!(f, "  Vertices: {}", self.vertex_count)?;
        writeln!(f, "  Faces: {}", self.face_count)?;

        if let Some((min, max)) = &self.bounds {
            writeln!(
                f,
                "  Bounds: [{:.1}, {:.1}, {:.1}] to [{:.1}, {:.1}, {:.1}]",
                min.x, min.y, min.z, max.x, max.y, max.z
            )?;
        }

        writeln!(
            f,
            "  Indices: {} (out of range: {}, repeated: {})",
            if self.is_well_formed() { "ok" } else { "BAD" },
            self.out_of_range_faces,
            self.repeated_index_faces
        )?;
        writeln!(f, "  Degenerate faces: {}", self.degenerate_faces)?;
        writeln!(
            f,
            "  Manifold: {} (non-manifold edges: {})",
            if self.is_manifold() { "yes" } else { "NO" },
            self.non_manifold_edge_count
        )?;
        writeln!(f, "  Boundary edges: {}", self.boundary_edge_count)?;
        writeln!(f, "  Components: {}", self.component_count)?;

        Ok(())
    }
}

/// Validate a surface and return a report.
///
/// `degenerate_area` is the area below which a face counts as degenerate.
pub fn validate_mesh(mesh: &Mesh, degenerate_area: f64) -> MeshReport {
    let vertex_count = mesh.vertex_count();
    let in_range = |face: &[u32; 3]| face.iter().all(|&i| (i as usize) < vertex_count);

    let out_of_range_faces = mesh.faces.iter().filter(|f| !in_range(f)).count();
    let repeated_index_faces = mesh
        .faces
        .iter()
        .filter(|[a, b, c]| a == b || b == c || a == c)
        .count();
    let degenerate_faces = mesh
        .faces
        .iter()
        .filter(|f| in_range(f))
        .filter(|&&[a, b, c]| {
            crate::Triangle::new(mesh.position(a), mesh.position(b), mesh.position(c))
                .is_degenerate(degenerate_area)
        })
        .count();

    // Topology only over faces that can be indexed safely.
    let indexable: Vec<[u32; 3]> = mesh.faces.iter().copied().filter(in_range).collect();
    let adjacency = MeshAdjacency::build(&indexable);

    let report = MeshReport {
        vertex_count,
        face_count: mesh.face_count(),
        out_of_range_faces,
        repeated_index_faces,
        degenerate_faces,
        boundary_edge_count: adjacency.boundary_edge_count(),
        non_manifold_edge_count: adjacency.non_manifold_edge_count(),
        component_count: adjacency.component_count(&indexable),
        bounds: mesh.bounds(),
    };

    if out_of_range_faces > 0 {
        warn!("{} faces reference vertices out of range", out_of_range_faces);
    }
    if repeated_index_faces > 0 {
        warn!("{} faces repeat a vertex index", repeated_index_faces);
    }
    if !report.is_manifold() {
        warn!(
            "Surface is not manifold: {} non-manifold edges",
            report.non_manifold_edge_count
        );
    }

    debug!("{}", report);

    report
}

/// Log a summary of surface validation.
pub fn log_validation(report: &MeshReport) {
    info!(
        "Surface: {} verts, {} faces, {} components, {} boundary edges",
        report.vertex_count, report.face_count, report.component_count, report.boundary_edge_count,
    );

    if report.degenerate_faces > 0 {
        info!("{} degenerate faces will be dropped", report.degenerate_faces);
    }
}
