//! Check a garment against its template: ingest and segment only.

use std::path::PathBuf;

use clap::Args;
use pattern_core::ingest::ingest;
use pattern_core::segment::segment;
use serde::Serialize;

use super::{load_config, InputArgs};
use crate::output;
use crate::{CliResult, OutputFormat};

#[derive(Debug, Clone, Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Pipeline configuration (TOML).
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct PieceCheck {
    piece_name: String,
    vertices: usize,
    faces: usize,
    boundary_loops: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ValidationReport {
    garment_type: String,
    template: String,
    vertices: usize,
    faces: usize,
    keypoints: usize,
    pieces: Vec<PieceCheck>,
    valid: bool,
}

pub fn execute(args: &ValidateArgs, format: OutputFormat, quiet: bool) -> CliResult<()> {
    let config = load_config(args.config.as_deref())?;
    let library = args.input.library()?;
    let input = args.input.load()?;

    let garment = ingest(&input, &library, &config)?;
    let pieces: Vec<PieceCheck> = segment(&garment)
        .into_iter()
        .map(|piece| match piece.result {
            Ok(patch) => PieceCheck {
                piece_name: piece.piece_name,
                vertices: patch.vertex_count(),
                faces: patch.mesh.face_count(),
                boundary_loops: patch.loops.len(),
                error: None,
            },
            Err(e) => PieceCheck {
                piece_name: piece.piece_name,
                vertices: 0,
                faces: 0,
                boundary_loops: 0,
                error: Some(e.to_string()),
            },
        })
        .collect();

    let report = ValidationReport {
        garment_type: garment.garment_type.to_string(),
        template: garment.template.name.clone(),
        vertices: garment.mesh.vertex_count(),
        faces: garment.mesh.face_count(),
        keypoints: garment.keypoints.len(),
        valid: pieces.iter().all(|p| p.error.is_none()),
        pieces,
    };

    output::print(&report, format, quiet);
    output::info(
        &format!(
            "{} garment, template '{}': {} vertices, {} faces, {} keypoints",
            report.garment_type, report.template, report.vertices, report.faces, report.keypoints
        ),
        format,
        quiet,
    );
    for piece in &report.pieces {
        match &piece.error {
            None => output::success(
                &format!(
                    "{}: {} vertices, {} faces, {} boundary loops",
                    piece.piece_name, piece.vertices, piece.faces, piece.boundary_loops
                ),
                format,
                quiet,
            ),
            Some(e) => output::failure(&format!("{}: {}", piece.piece_name, e), format),
        }
    }

    if !report.valid {
        return Err("some template pieces could not be segmented".into());
    }
    Ok(())
}
