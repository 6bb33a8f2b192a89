//! Garment surface data model and geometry primitives.
//!
//! This crate holds the pieces of the pattern pipeline that know nothing
//! about garments:
//!
//! - Triangle surfaces ([`Mesh`], [`Triangle`]) and file loading (STL, OBJ)
//! - Topology queries ([`MeshAdjacency`]) and validation ([`validate_mesh`])
//! - Clean-up: winding repair and degenerate/unreferenced removal
//! - Boundary loop extraction on open surfaces
//! - Closed 2D polygon geometry for flattened outlines ([`polygon`])
//!
//! # Example
//!
//! ```
//! use pattern_mesh::{Mesh, boundary_loops, validate_mesh};
//! use nalgebra::Point3;
//!
//! let mesh = Mesh::from_parts(
//!     [
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(1.0, 1.0, 0.0),
//!         Point3::new(0.0, 1.0, 0.0),
//!     ],
//!     vec![[0, 1, 2], [0, 2, 3]],
//! );
//!
//! assert!(validate_mesh(&mesh, 1e-12).is_valid());
//! assert_eq!(boundary_loops(&mesh).unwrap().len(), 1);
//! ```

mod adjacency;
mod boundary;
mod error;
mod io;
mod repair;
mod types;
mod validate;
mod winding;

pub mod polygon;

pub use adjacency::{edge_key, MeshAdjacency};
pub use boundary::{boundary_loops, BoundaryLoop};
pub use error::{MeshError, MeshResult};
pub use io::{load_mesh, MeshFormat};
pub use polygon::Bounds2;
pub use repair::{remove_degenerate_triangles, remove_unreferenced_vertices};
pub use types::{Mesh, Triangle, Vertex};
pub use validate::{log_validation, validate_mesh, MeshReport};
pub use winding::{edge_direction_in_face, fix_winding_order};

impl Mesh {
    /// Validate this surface and return a report.
    pub fn validate(&self, degenerate_area: f64) -> MeshReport {
        validate_mesh(self, degenerate_area)
    }

    /// Build adjacency for this surface.
    pub fn adjacency(&self) -> MeshAdjacency {
        MeshAdjacency::build(&self.faces)
    }

    /// Extract boundary loops of this surface.
    pub fn boundary_loops(&self) -> MeshResult<Vec<BoundaryLoop>> {
        boundary_loops(self)
    }
}
