//! Surface file loading for STL and OBJ reconstructions.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::{Mesh, Vertex};

/// Supported surface file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Stl,
    Obj,
}

impl MeshFormat {
    /// Detect format from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .and_then(|ext| match ext.as_str() {
                "stl" => Some(MeshFormat::Stl),
                "obj" => Some(MeshFormat::Obj),
                _ => None,
            })
    }
}

/// Load a surface from file, auto-detecting format from extension.
pub fn load_mesh(path: &Path) -> MeshResult<Mesh> {
    let format = MeshFormat::from_path(path).ok_or_else(|| MeshError::UnsupportedFormat {
        extension: path.extension().and_then(|e| e.to_str()).map(String::from),
    })?;

    info!("Loading surface from {:?} (format: {:?})", path, format);

    let mesh = match format {
        MeshFormat::Stl => load_stl(path)?,
        MeshFormat::Obj => load_obj(path)?,
    };

    if let Some((min, max)) = mesh.bounds() {
        let dims = max - min;
        info!(
            "Loaded surface: {} vertices, {} faces",
            mesh.vertex_count(),
            mesh.face_count()
        );
        debug!("Dimensions: {:.1} x {:.1} x {:.1}", dims.x, dims.y, dims.z);

        // Body scans are in centimetres; metres usually means a unit mix-up.
        let max_dim = dims.x.max(dims.y).max(dims.z);
        if max_dim < 5.0 {
            warn!(
                "Surface largest dimension is {:.3} - coordinates may not be in centimetres",
                max_dim
            );
        }
    }

    if mesh.is_empty() {
        return Err(MeshError::EmptyMesh {
            details: format!("{} has no vertices or faces", path.display()),
        });
    }

    Ok(mesh)
}

/// Load surface from STL file (binary or ASCII).
fn load_stl(path: &Path) -> MeshResult<Mesh> {
    let file = File::open(path).map_err(|e| MeshError::IoRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = BufReader::new(file);

    let stl = stl_io::read_stl(&mut reader).map_err(|e| MeshError::ParseError {
        path: path.to_path_buf(),
        details: e.to_string(),
    })?;

    debug!(
        "STL contains {} vertices, {} triangles",
        stl.vertices.len(),
        stl.faces.len()
    );

    let mut mesh = Mesh::with_capacity(stl.vertices.len(), stl.faces.len());
    mesh.vertices.extend(
        stl.vertices
            .iter()
            .map(|v| Vertex::from_coords(f64::from(v.0[0]), f64::from(v.0[1]), f64::from(v.0[2]))),
    );
    mesh.faces.extend(
        stl.faces
            .iter()
            .map(|f| f.vertices.map(|i| i as u32)),
    );

    Ok(mesh)
}

/// Load surface from OBJ file. Polygon faces are fan-triangulated by the loader.
fn load_obj(path: &Path) -> MeshResult<Mesh> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| MeshError::ParseError {
        path: path.to_path_buf(),
        details: e.to_string(),
    })?;

    if models.is_empty() {
        return Err(MeshError::EmptyMesh {
            details: format!("{} contains no objects", path.display()),
        });
    }

    // Reconstructions sometimes split the garment into groups; stitch them
    // back into one index space.
    let mut mesh = Mesh::new();
    for model in &models {
        let base = mesh.vertices.len() as u32;
        let positions = &model.mesh.positions;
        mesh.vertices.extend(
            positions
                .chunks_exact(3)
                .map(|p| Vertex::from_coords(f64::from(p[0]), f64::from(p[1]), f64::from(p[2]))),
        );
        mesh.faces.extend(
            model
                .mesh
                .indices
                .chunks_exact(3)
                .map(|t| [base + t[0], base + t[1], base + t[2]]),
        );
    }

    debug!(
        "OBJ: {} groups merged into {} vertices, {} faces",
        models.len(),
        mesh.vertex_count(),
        mesh.face_count()
    );

    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_stl() -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".stl").unwrap();

        writeln!(file, "solid panel").unwrap();
        writeln!(file, "  facet normal 0 0 1").unwrap();
        writeln!(file, "    outer loop").unwrap();
        writeln!(file, "      vertex 0 0 0").unwrap();
        writeln!(file, "      vertex 40 0 0").unwrap();
        writeln!(file, "      vertex 0 60 0").unwrap();
        writeln!(file, "    endloop").unwrap();
        writeln!(file, "  endfacet").unwrap();
        writeln!(file, "endsolid panel").unwrap();

        file
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(MeshFormat::from_path(Path::new("scan.stl")), Some(MeshFormat::Stl));
        assert_eq!(MeshFormat::from_path(Path::new("scan.STL")), Some(MeshFormat::Stl));
        assert_eq!(MeshFormat::from_path(Path::new("scan.obj")), Some(MeshFormat::Obj));
        assert_eq!(MeshFormat::from_path(Path::new("scan.3mf")), None);
    }

    #[test]
    fn test_load_stl() {
        let file = create_test_stl();
        let mesh = load_mesh(file.path()).expect("should load");

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.face_count(), 1);

        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(40.0, 60.0, 0.0));
    }

    #[test]
    fn test_load_obj_triangulates_quads() {
        let mut file = NamedTempFile::with_suffix(".obj").unwrap();
        writeln!(file, "v 0 0 0").unwrap();
        writeln!(file, "v 30 0 0").unwrap();
        writeln!(file, "v 30 40 0").unwrap();
        writeln!(file, "v 0 40 0").unwrap();
        writeln!(file, "f 1 2 3 4").unwrap();
        file.flush().unwrap();

        let mesh = load_mesh(file.path()).expect("should load");
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 2);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_mesh(Path::new("scan.ply")).unwrap_err();
        assert!(matches!(err, MeshError::UnsupportedFormat { .. }));
    }
}
