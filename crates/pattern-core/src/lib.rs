//! Garment pattern pipeline.
//!
//! Turns a reconstructed 3D garment surface into sized, annotated 2D sewing
//! pattern pieces. A session runs these stages in order:
//!
//! - **Ingest**: validate and normalize the mesh, keypoints and garment type
//! - **Segment**: cut the surface into one patch per template piece
//! - **Flatten**: lay each patch flat with minimal stretch
//! - **Darts**: take in excess width at template cross-sections
//! - **Seams**: seam allowances, grain lines, notches and labels
//! - **Scale**: grade to a target size and redo darts and seams
//! - **Assemble**: collect everything into a [`Pattern`]
//!
//! Garment topology lives in declarative templates ([`TemplateLibrary`]);
//! the built-in library covers torso blocks, shirts, dresses, skirts and
//! trousers.
//!
//! # Example
//!
//! ```no_run
//! use pattern_core::{GarmentInput, PatternConfig, PatternEngine, Session, SizeProfile, StandardSize};
//!
//! let engine = PatternEngine::new(PatternConfig::default()).unwrap();
//! let input = GarmentInput::from_json_file("garment.json").unwrap();
//!
//! let session = Session::new(input).with_size_profile(SizeProfile::Standard(StandardSize::L));
//! let pattern = engine.run(&session).unwrap();
//!
//! for piece in &pattern.patches {
//!     println!("{}: {:?}, {} darts", piece.piece_name, piece.status, piece.darts.len());
//! }
//! ```

mod context;
mod error;

pub mod assembly;
pub mod config;
pub mod dart;
pub mod engine;
pub mod flatten;
pub mod ingest;
pub mod input;
pub mod measurement;
pub mod scale;
pub mod seam;
pub mod segment;
pub mod session;
pub mod synthetic;
pub mod template;

// Re-export core types at crate root
pub use error::{
    CancelReason, ConfigError, FlattenError, GeometryError, InputError, PatternError, PatternResult,
    TemplateError,
};

pub use assembly::{DistortionReport, OverallStatus, Pattern, PatternPiece, PieceStatus, PieceWarning};
pub use config::{CornerJoinPolicy, PatternConfig};
pub use context::PieceContext;
pub use dart::Dart;
pub use engine::PatternEngine;
pub use flatten::{DistortionSummary, DistortionWarning, DistortionWarningKind, FlattenedPatch};
pub use input::{GarmentInput, GarmentType, Keypoint, MeshInput};
pub use measurement::{Dimension, MeasurementVector, ScaleFactors, SizeProfile, StandardSize};
pub use seam::{GrainLine, Notch, PieceLabel, SeamCurve, SeamOffsetWarning};
pub use segment::{Patch, PatchId};
pub use session::{CancelToken, Session, SessionId};
pub use template::{GarmentTemplate, TemplateLibrary};
