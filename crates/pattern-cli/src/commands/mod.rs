//! CLI command implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use pattern_core::{GarmentInput, GarmentType, Keypoint, MeshInput, PatternConfig, TemplateLibrary};

use crate::CliResult;

pub mod run;
pub mod sample;
pub mod templates;
pub mod validate;

/// Where the garment comes from: a full JSON document, or a mesh file plus
/// keypoints and a garment type.
#[derive(Debug, Clone, Args)]
pub struct InputArgs {
    /// Garment document (JSON with mesh, garment_type, keypoints).
    #[arg(short, long, required_unless_present = "mesh", conflicts_with = "mesh")]
    pub input: Option<PathBuf>,

    /// Surface file (OBJ or STL) used instead of an input document.
    #[arg(long, requires_all = ["keypoints", "garment_type"])]
    pub mesh: Option<PathBuf>,

    /// Keypoints (JSON array) for --mesh.
    #[arg(long)]
    pub keypoints: Option<PathBuf>,

    /// Garment type for --mesh, e.g. shirt, t-shirt, dress.
    #[arg(long)]
    pub garment_type: Option<String>,

    /// Template library (TOML) replacing the built-in one.
    #[arg(long)]
    pub templates: Option<PathBuf>,
}

impl InputArgs {
    pub fn load(&self) -> CliResult<GarmentInput> {
        if let Some(path) = &self.input {
            return Ok(GarmentInput::from_json_file(path)?);
        }

        let (Some(mesh), Some(keypoints), Some(garment_type)) =
            (&self.mesh, &self.keypoints, &self.garment_type)
        else {
            return Err("either --input or --mesh with --keypoints and --garment-type is required".into());
        };

        let surface = pattern_mesh::load_mesh(mesh)?;
        let keypoints = load_keypoints(keypoints)?;
        let garment_type: GarmentType = garment_type.parse()?;
        Ok(GarmentInput::new(MeshInput::from_mesh(&surface), garment_type, keypoints))
    }

    pub fn library(&self) -> CliResult<Arc<TemplateLibrary>> {
        match &self.templates {
            Some(path) => Ok(Arc::new(TemplateLibrary::from_toml_file(path)?)),
            None => Ok(TemplateLibrary::builtin()?),
        }
    }
}

fn load_keypoints(path: &Path) -> CliResult<Vec<Keypoint>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Configuration from an optional TOML file.
pub fn load_config(path: Option<&Path>) -> CliResult<PatternConfig> {
    match path {
        Some(path) => Ok(PatternConfig::from_toml_file(path)?),
        None => Ok(PatternConfig::default()),
    }
}
