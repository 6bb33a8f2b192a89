//! Error types for the pattern pipeline.
//!
//! Input, configuration and template errors reject a session before any
//! stage runs. Geometry errors are scoped to one pattern piece and end up
//! in that piece's status; the rest of the pattern is still produced.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for whole-session operations.
pub type PatternResult<T> = Result<T, PatternError>;

/// The supplied garment cannot be processed at all.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum InputError {
    /// Bad indices, empty surface or non-manifold edges.
    #[error("malformed mesh: {details}")]
    MalformedMesh { details: String },

    /// Keypoints required by the template are absent or below the
    /// confidence threshold.
    #[error("insufficient keypoints for group '{group}': missing {}", .missing.join(", "))]
    InsufficientData { group: String, missing: Vec<String> },

    /// The garment type has no registered topology.
    #[error("no pattern template registered for garment type '{garment_type}'")]
    UnknownTemplate { garment_type: String },

    /// The input document could not be read or decoded.
    #[error("invalid garment input: {details}")]
    InvalidDocument { details: String },

    /// A body measurement is zero, negative or not finite.
    #[error("invalid body measurement: {dimension} is {value}")]
    InvalidMeasurement { dimension: String, value: f64 },
}

/// A failure confined to one pattern piece.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum GeometryError {
    /// The piece's region is empty, disconnected or has a pinched boundary.
    #[error("piece '{piece}' is not a single manifold patch: {details}")]
    NonManifoldPatch { piece: String, details: String },

    /// A cut plane could not be built from its keypoints.
    #[error("cut '{cut}' for piece '{piece}' is degenerate")]
    DegenerateCut { piece: String, cut: String },

    /// Flattening produced non-finite or runaway coordinates.
    #[error("flattening of '{piece}' diverged (max stretch {max_stretch})")]
    FlattenDivergence { piece: String, max_stretch: f64 },

    /// Ease remains after splitting darts up to the configured count.
    #[error("unresolved ease of {residual:.3} at section '{section}' of '{piece}'")]
    UnresolvedEase {
        piece: String,
        section: String,
        residual: f64,
    },

    /// No conflict-free dart position was found along the boundary.
    #[error("no conflict-free dart position at section '{section}' of '{piece}'")]
    DartConflict { piece: String, section: String },

    /// The seam allowance still self-intersects after the round-join fallback.
    #[error("seam allowance of '{piece}' self-intersects on loop {loop_index}")]
    SeamSelfIntersection { piece: String, loop_index: usize },
}

impl GeometryError {
    /// Name of the piece the error is scoped to.
    pub fn piece(&self) -> &str {
        match self {
            GeometryError::NonManifoldPatch { piece, .. }
            | GeometryError::DegenerateCut { piece, .. }
            | GeometryError::FlattenDivergence { piece, .. }
            | GeometryError::UnresolvedEase { piece, .. }
            | GeometryError::DartConflict { piece, .. }
            | GeometryError::SeamSelfIntersection { piece, .. } => piece,
        }
    }
}

/// Invalid configuration, rejected before any session starts.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("seam_allowance must be finite and non-negative, got {0}")]
    InvalidSeamAllowance(f64),

    #[error("flatten_iteration_cap must be at least 1")]
    ZeroIterationCap,

    #[error("{key} must be finite and positive, got {value}")]
    NotPositive { key: &'static str, value: f64 },

    #[error("max_dart_count must be at least 1")]
    ZeroDartCount,

    #[error("worker_threads must be at least 1")]
    ZeroWorkers,

    #[error("invalid size profile: {details}")]
    InvalidSizeProfile { details: String },

    #[error("failed to parse configuration: {details}")]
    Parse { details: String },

    #[error("failed to read configuration from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build worker pool: {details}")]
    WorkerPool { details: String },
}

/// Problems with a template table.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum TemplateError {
    #[error("failed to parse template library: {details}")]
    Parse { details: String },

    #[error("failed to read template library from {path}: {details}")]
    Io { path: PathBuf, details: String },

    #[error("template '{template}' is inconsistent: {details}")]
    Invalid { template: String, details: String },

    #[error("garment type '{garment_type}' is claimed by more than one template")]
    DuplicateGarmentType { garment_type: String },
}

/// Why a session stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Cancelled,
    DeadlineExceeded,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "cancelled by caller"),
            CancelReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Top-level error of a pattern session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PatternError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("session {session} stopped: {reason}")]
    Cancelled { session: String, reason: CancelReason },
}

/// Failure of a single flattening run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlattenError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("flattening interrupted: {0}")]
    Interrupted(CancelReason),
}
