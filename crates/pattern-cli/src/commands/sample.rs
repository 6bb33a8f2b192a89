//! Write the synthetic torso as an input document.

use std::path::PathBuf;

use clap::Args;
use pattern_core::synthetic;

use crate::output;
use crate::{CliResult, OutputFormat};

#[derive(Debug, Clone, Args)]
pub struct SampleArgs {
    /// Output path for the garment document.
    #[arg(short, long, default_value = "torso.json")]
    pub output: PathBuf,
}

pub fn execute(args: &SampleArgs, format: OutputFormat, quiet: bool) -> CliResult<()> {
    let input = synthetic::torso_input();
    std::fs::write(&args.output, serde_json::to_string_pretty(&input)?)?;

    output::success(
        &format!(
            "Wrote {} garment ({} vertices, {} keypoints) to {}",
            input.garment_type,
            input.mesh.vertices.len(),
            input.keypoints.len(),
            args.output.display()
        ),
        format,
        quiet,
    );
    Ok(())
}
