//! The output contract: one [`Pattern`] per session.
//!
//! Assembly does no geometry. It collates what the stages produced for each
//! piece into a serializable value, sets per-piece and overall status and
//! sums up distortion.

use nalgebra::Point2;
use serde::Serialize;
use tracing::info;

use crate::dart::Dart;
use crate::error::GeometryError;
use crate::flatten::{DistortionSummary, DistortionWarning, FlattenedPatch};
use crate::input::GarmentType;
use crate::measurement::{ScaleFactors, SizeProfile};
use crate::seam::{GrainLine, Notch, PieceLabel, SeamAnnotation, SeamCurve, SeamOffsetWarning};
use crate::segment::PatchId;
use crate::session::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceStatus {
    Ok,
    Warning,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// No piece failed.
    Ok,
    /// Some pieces failed, some succeeded.
    Partial,
    /// No piece succeeded.
    Failed,
}

/// Non-fatal finding on a piece.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum PieceWarning {
    Distortion(DistortionWarning),
    SeamOffset(SeamOffsetWarning),
}

/// One piece of the pattern, in the piece's flattened frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternPiece {
    pub id: PatchId,
    pub piece_name: String,
    pub status: PieceStatus,
    pub outline: Vec<Point2<f64>>,
    pub holes: Vec<Vec<Point2<f64>>>,
    pub seam_curve: Option<SeamCurve>,
    pub grain_line: Option<GrainLine>,
    pub notches: Vec<Notch>,
    pub darts: Vec<Dart>,
    pub distortion: DistortionSummary,
    pub label: Option<PieceLabel>,
    pub warnings: Vec<PieceWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<GeometryError>,
}

impl PatternPiece {
    pub fn is_ok(&self) -> bool {
        self.status != PieceStatus::Failed
    }
}

/// Distortion over every flattened piece.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DistortionReport {
    pub max: f64,
    /// Mean over all flattened vertices.
    pub mean: f64,
    pub max_stretch: f64,
    pub flagged_pieces: Vec<String>,
}

/// Final geometry of a piece that made it through every stage.
#[derive(Debug, Clone)]
pub struct PieceGeometry {
    pub flat: FlattenedPatch,
    pub darts: Vec<Dart>,
    pub annotation: SeamAnnotation,
}

/// What the stages produced for one template piece.
#[derive(Debug, Clone)]
pub struct PieceOutcome {
    pub id: PatchId,
    pub piece_name: String,
    pub result: Result<PieceGeometry, GeometryError>,
}

/// Sized, annotated pattern of one garment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pattern {
    pub session_id: SessionId,
    pub garment_type: GarmentType,
    pub template: String,
    pub patches: Vec<PatternPiece>,
    pub size_profile_applied: Option<SizeProfile>,
    pub scale_factors: ScaleFactors,
    pub distortion_report: DistortionReport,
    pub overall_status: OverallStatus,
}

impl Pattern {
    pub fn piece(&self, name: &str) -> Option<&PatternPiece> {
        self.patches.iter().find(|p| p.piece_name == name)
    }

    pub fn failed_pieces(&self) -> impl Iterator<Item = &PatternPiece> {
        self.patches.iter().filter(|p| p.status == PieceStatus::Failed)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Everything [`assemble`] needs besides the piece outcomes.
#[derive(Debug, Clone)]
pub struct AssemblyInfo {
    pub session_id: SessionId,
    pub garment_type: GarmentType,
    pub template: String,
    pub size_profile: Option<SizeProfile>,
    pub scale_factors: ScaleFactors,
}

/// Collate piece outcomes into a pattern.
pub fn assemble(info: AssemblyInfo, outcomes: Vec<PieceOutcome>) -> Pattern {
    let distortion_report = distortion_report(&outcomes);
    let patches: Vec<PatternPiece> = outcomes.into_iter().map(piece_from_outcome).collect();

    let succeeded = patches.iter().filter(|p| p.is_ok()).count();
    let overall_status = if succeeded == patches.len() && succeeded > 0 {
        OverallStatus::Ok
    } else if succeeded > 0 {
        OverallStatus::Partial
    } else {
        OverallStatus::Failed
    };

    info!(
        "Assembled pattern for session {}: {}/{} pieces, status {:?}",
        info.session_id,
        succeeded,
        patches.len(),
        overall_status
    );

    Pattern {
        session_id: info.session_id,
        garment_type: info.garment_type,
        template: info.template,
        patches,
        size_profile_applied: info.size_profile,
        scale_factors: info.scale_factors,
        distortion_report,
        overall_status,
    }
}

fn piece_from_outcome(outcome: PieceOutcome) -> PatternPiece {
    let geometry = match outcome.result {
        Ok(geometry) => geometry,
        Err(error) => {
            return PatternPiece {
                id: outcome.id,
                piece_name: outcome.piece_name,
                status: PieceStatus::Failed,
                outline: Vec::new(),
                holes: Vec::new(),
                seam_curve: None,
                grain_line: None,
                notches: Vec::new(),
                darts: Vec::new(),
                distortion: DistortionSummary::default(),
                label: None,
                warnings: Vec::new(),
                error: Some(error),
            }
        }
    };

    let PieceGeometry {
        flat,
        darts,
        annotation,
    } = geometry;

    let mut warnings = Vec::new();
    if let Some(w) = flat.warning {
        warnings.push(PieceWarning::Distortion(w));
    }
    if let Some(w) = annotation.seam_curve.warning.clone() {
        warnings.push(PieceWarning::SeamOffset(w));
    }
    let status = if warnings.is_empty() {
        PieceStatus::Ok
    } else {
        PieceStatus::Warning
    };

    PatternPiece {
        id: outcome.id,
        piece_name: outcome.piece_name,
        status,
        outline: flat.outline(),
        holes: flat.holes(),
        seam_curve: Some(annotation.seam_curve),
        grain_line: Some(annotation.grain_line),
        notches: annotation.notches,
        darts,
        distortion: flat.summary,
        label: Some(annotation.label),
        warnings,
        error: None,
    }
}

fn distortion_report(outcomes: &[PieceOutcome]) -> DistortionReport {
    let mut report = DistortionReport::default();
    let mut total = 0.0;
    let mut vertices = 0usize;

    for (name, flat) in outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok().map(|g| (&o.piece_name, &g.flat)))
    {
        report.max = report.max.max(flat.summary.max);
        report.max_stretch = report.max_stretch.max(flat.max_stretch);
        total += flat.distortion.iter().sum::<f64>();
        vertices += flat.distortion.len();
        if flat.warning.is_some() {
            report.flagged_pieces.push(name.clone());
        }
    }
    if vertices > 0 {
        report.mean = total / vertices as f64;
    }
    report
}
