//! List the template library.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use pattern_core::TemplateLibrary;
use serde::Serialize;

use crate::output;
use crate::{CliResult, OutputFormat};

#[derive(Debug, Clone, Args)]
pub struct TemplatesArgs {
    /// Template library (TOML) to list instead of the built-in one.
    #[arg(long)]
    pub templates: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct TemplateSummary {
    name: String,
    garment_types: Vec<String>,
    pieces: Vec<String>,
    seams: Vec<String>,
    required_keypoints: Vec<String>,
}

pub fn execute(args: &TemplatesArgs, format: OutputFormat, quiet: bool) -> CliResult<()> {
    let library = match &args.templates {
        Some(path) => Arc::new(TemplateLibrary::from_toml_file(path)?),
        None => TemplateLibrary::builtin()?,
    };

    let summaries: Vec<TemplateSummary> = library
        .templates()
        .map(|t| TemplateSummary {
            name: t.name.clone(),
            garment_types: t.garment_types.iter().map(|g| g.to_string()).collect(),
            pieces: t.pieces.iter().map(|p| p.name.clone()).collect(),
            seams: t.seams.iter().map(|s| s.name.clone()).collect(),
            required_keypoints: t.required_keypoints().into_iter().map(String::from).collect(),
        })
        .collect();

    output::print(&summaries, format, quiet);
    for t in &summaries {
        output::info(
            &format!("{} ({})", t.name, t.garment_types.join(", ")),
            format,
            quiet,
        );
        output::info(&format!("  pieces:    {}", t.pieces.join(", ")), format, quiet);
        output::info(&format!("  seams:     {}", t.seams.join(", ")), format, quiet);
        output::info(
            &format!("  keypoints: {}", t.required_keypoints.join(", ")),
            format,
            quiet,
        );
    }

    Ok(())
}
