//! Run the pattern pipeline on one garment.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use pattern_core::{
    CornerJoinPolicy, MeasurementVector, OverallStatus, Pattern, PatternEngine, PieceStatus, Session,
    SessionId, SizeProfile, StandardSize,
};
use pattern_mesh::polygon::Bounds2;

use super::{load_config, InputArgs};
use crate::output;
use crate::{CliResult, OutputFormat};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CornerJoinArg {
    Miter,
    Round,
}

impl From<CornerJoinArg> for CornerJoinPolicy {
    fn from(arg: CornerJoinArg) -> Self {
        match arg {
            CornerJoinArg::Miter => CornerJoinPolicy::Miter,
            CornerJoinArg::Round => CornerJoinPolicy::Round,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Pipeline configuration (TOML).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Grade to a standard size (XS, S, M, L, XL).
    #[arg(long, conflicts_with = "measurements")]
    pub size: Option<String>,

    /// Grade to body measurements (JSON object, e.g. {"bust": 100.0}).
    #[arg(long)]
    pub measurements: Option<PathBuf>,

    /// Fill dimensions missing from --measurements from the nearest standard size.
    #[arg(long, requires = "measurements")]
    pub fill: bool,

    /// Seam allowance, overriding the configuration.
    #[arg(long)]
    pub seam_allowance: Option<f64>,

    /// Corner join policy, overriding the configuration.
    #[arg(long, value_enum)]
    pub corner_join: Option<CornerJoinArg>,

    /// Flattening worker threads, overriding the configuration.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Session deadline in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Session id to file the pattern under.
    #[arg(long)]
    pub session_id: Option<String>,

    /// Write the pattern JSON here.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    fn size_profile(&self) -> CliResult<Option<SizeProfile>> {
        if let Some(size) = &self.size {
            let size: StandardSize = size.parse()?;
            return Ok(Some(SizeProfile::Standard(size)));
        }
        let Some(path) = &self.measurements else {
            return Ok(None);
        };
        let measurements: MeasurementVector = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let profile = if self.fill {
            SizeProfile::Filled(measurements)
        } else {
            SizeProfile::Measurements(measurements)
        };
        profile.validate()?;
        Ok(Some(profile))
    }
}

pub fn execute(args: &RunArgs, format: OutputFormat, quiet: bool) -> CliResult<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(allowance) = args.seam_allowance {
        config = config.with_seam_allowance(allowance);
    }
    if let Some(join) = args.corner_join {
        config = config.with_corner_join_policy(join.into());
    }
    if let Some(threads) = args.threads {
        config = config.with_worker_threads(threads);
    }

    let engine = PatternEngine::with_library(config, args.input.library()?)?;
    let input = args.input.load()?;

    let mut session = Session::new(input);
    if let Some(id) = &args.session_id {
        session = session.with_id(SessionId::new(id.as_str()));
    }
    if let Some(profile) = args.size_profile()? {
        session = session.with_size_profile(profile);
    }
    if let Some(ms) = args.timeout_ms {
        session = session.with_timeout(Duration::from_millis(ms));
    }

    let pattern = engine.run(&session)?;

    if let Some(path) = &args.output {
        std::fs::write(path, pattern.to_json()?)?;
        output::success(&format!("Pattern written to {}", path.display()), format, quiet);
    }

    output::print(&pattern, format, quiet || args.output.is_some());
    report(&pattern, format, quiet);

    if pattern.overall_status == OverallStatus::Failed {
        return Err(format!("no pattern piece could be produced for session {}", pattern.session_id).into());
    }
    Ok(())
}

fn report(pattern: &Pattern, format: OutputFormat, quiet: bool) {
    output::info(
        &format!(
            "Session {} ({}, template '{}')",
            pattern.session_id, pattern.garment_type, pattern.template
        ),
        format,
        quiet,
    );
    if !pattern.scale_factors.is_identity() {
        let factors: Vec<String> = pattern
            .scale_factors
            .iter()
            .filter(|(_, f)| *f != 1.0)
            .map(|(d, f)| format!("{}={:.3}", d.as_str(), f))
            .collect();
        output::info(&format!("  Scale factors: {}", factors.join(", ")), format, quiet);
    }

    for piece in &pattern.patches {
        let size = Bounds2::from_points(&piece.outline)
            .map_or_else(String::new, |b| format!("{:.1} x {:.1}", b.width(), b.height()));
        let line = format!(
            "{}: {} ({} darts, {} notches, max distortion {:.4})",
            piece.piece_name,
            size,
            piece.darts.len(),
            piece.notches.len(),
            piece.distortion.max
        );
        match piece.status {
            PieceStatus::Ok => output::success(&line, format, quiet),
            PieceStatus::Warning => {
                output::warning(&line, format, quiet);
                for w in &piece.warnings {
                    output::warning(&format!("  {:?}", w), format, quiet);
                }
            }
            PieceStatus::Failed => {
                let reason = piece.error.as_ref().map_or_else(String::new, |e| e.to_string());
                output::failure(&format!("{}: {}", piece.piece_name, reason), format);
            }
        }
    }

    let report = &pattern.distortion_report;
    output::info(
        &format!(
            "Overall: {:?}, distortion max {:.4} mean {:.4}, max stretch {:.4}",
            pattern.overall_status, report.max, report.mean, report.max_stretch
        ),
        format,
        quiet,
    );
}
