//! Session execution.
//!
//! A [`PatternEngine`] is built once from a validated configuration and
//! shared between callers; each [`Session`] runs through every stage on the
//! calling thread except flattening, which fans out over the engine's
//! bounded worker pool.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, info, warn};

use crate::assembly::{assemble, AssemblyInfo, Pattern, PieceGeometry, PieceOutcome};
use crate::config::PatternConfig;
use crate::context::PieceContext;
use crate::dart::plan_darts;
use crate::error::{ConfigError, FlattenError, GeometryError, PatternError, PatternResult};
use crate::flatten::{flatten, FlattenedPatch};
use crate::ingest::ingest;
use crate::measurement::ScaleFactors;
use crate::scale::scale_patch;
use crate::seam::annotate;
use crate::segment::{segment, PatchId};
use crate::session::{Interrupt, Session};
use crate::template::TemplateLibrary;

/// Runs pattern sessions against a template library.
#[derive(Debug)]
pub struct PatternEngine {
    config: PatternConfig,
    library: Arc<TemplateLibrary>,
    pool: ThreadPool,
}

impl PatternEngine {
    /// Engine over the built-in templates.
    pub fn new(config: PatternConfig) -> PatternResult<Self> {
        let library = TemplateLibrary::builtin()?;
        Self::with_library(config, library)
    }

    /// Engine over a caller-supplied template library.
    pub fn with_library(config: PatternConfig, library: Arc<TemplateLibrary>) -> PatternResult<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("pattern-flatten-{i}"))
            .build()
            .map_err(|e| ConfigError::WorkerPool {
                details: e.to_string(),
            })?;

        debug!(
            "Pattern engine ready: {} workers, {} templates",
            config.worker_threads,
            library.templates().count()
        );

        Ok(Self {
            config,
            library,
            pool,
        })
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    pub fn library(&self) -> &Arc<TemplateLibrary> {
        &self.library
    }

    /// Run one session to a pattern.
    ///
    /// Input problems and an invalid session size profile reject the
    /// session before any geometry stage runs.
    /// Piece failures are recorded in the pattern. Cancellation and deadline
    /// expiry stop the session with [`PatternError::Cancelled`].
    pub fn run(&self, session: &Session) -> PatternResult<Pattern> {
        let started = Instant::now();
        let interrupt = self.interrupt_for(session);
        let cancelled = |reason| PatternError::Cancelled {
            session: session.id().to_string(),
            reason,
        };

        info!("Session {}: starting", session.id());

        if let Some(profile) = session.size_profile() {
            profile.validate()?;
        }

        // Step 1: Ingest
        if let Some(reason) = interrupt.check() {
            return Err(cancelled(reason));
        }
        let garment = ingest(session.input(), &self.library, &self.config)?;
        let template = Arc::clone(&garment.template);

        // Step 2: Segment
        let pieces = segment(&garment);
        let patch_ids: BTreeMap<String, PatchId> = pieces
            .iter()
            .filter(|p| p.result.is_ok())
            .map(|p| (p.piece_name.clone(), p.id))
            .collect();

        // Step 3: Flatten on the worker pool
        let flattened: Vec<Result<FlattenedPatch, FlattenError>> = self.pool.install(|| {
            pieces
                .par_iter()
                .map(|piece| match &piece.result {
                    Ok(patch) => flatten(Arc::clone(patch), &self.config, &interrupt),
                    Err(e) => Err(FlattenError::Geometry(e.clone())),
                })
                .collect()
        });
        let flattened: Vec<Result<FlattenedPatch, GeometryError>> = flattened
            .into_iter()
            .map(|r| match r {
                Ok(flat) => Ok(Ok(flat)),
                Err(FlattenError::Geometry(e)) => Ok(Err(e)),
                Err(FlattenError::Interrupted(reason)) => Err(reason),
            })
            .collect::<Result<_, _>>()
            .map_err(|reason| {
                warn!("Session {} stopped: {}", session.id(), reason);
                cancelled(reason)
            })?;

        // Step 4: Darts, seams and sizing per piece
        let size_profile = session
            .size_profile()
            .or(self.config.size_profile.as_ref())
            .cloned();
        let factors = size_profile
            .as_ref()
            .map_or_else(ScaleFactors::identity, |p| p.scale_factors(&template.base_measurements));

        let outcomes: Vec<PieceOutcome> = pieces
            .iter()
            .zip(flattened)
            .map(|(piece, flat)| {
                let result = flat.and_then(|flat| {
                    let spec = template.piece(&piece.piece_name).ok_or_else(|| {
                        GeometryError::NonManifoldPatch {
                            piece: piece.piece_name.clone(),
                            details: "piece is not in the template".into(),
                        }
                    })?;
                    let ctx = PieceContext {
                        template: &template,
                        piece: spec,
                        reference: &garment.reference_measurements,
                        patch_ids: &patch_ids,
                        config: &self.config,
                    };
                    finish_piece(flat, &ctx, &factors)
                });
                if let Err(e) = &result {
                    warn!("Piece '{}' failed: {}", piece.piece_name, e);
                }
                PieceOutcome {
                    id: piece.id,
                    piece_name: piece.piece_name.clone(),
                    result,
                }
            })
            .collect();

        // Step 5: Assemble
        let pattern = assemble(
            AssemblyInfo {
                session_id: session.id().clone(),
                garment_type: garment.garment_type,
                template: template.name.clone(),
                size_profile,
                scale_factors: factors,
            },
            outcomes,
        );

        info!(
            "Session {} finished in {:.2?}: {:?}",
            session.id(),
            started.elapsed(),
            pattern.overall_status
        );

        Ok(pattern)
    }

    /// The session's deadline, or the configured default timeout from now.
    fn interrupt_for(&self, session: &Session) -> Interrupt {
        let deadline = session
            .deadline()
            .or_else(|| self.config.session_timeout().map(|t| Instant::now() + t));
        Interrupt::new(session.cancel_token(), deadline)
    }
}

/// Darts and seams on the flattened piece, then again on the graded piece
/// with the ungraded seam curve as an obstacle.
fn finish_piece(
    flat: FlattenedPatch,
    ctx: &PieceContext<'_>,
    factors: &ScaleFactors,
) -> Result<PieceGeometry, GeometryError> {
    let darts = plan_darts(&flat, ctx, &[])?;
    let annotation = annotate(&flat, ctx)?;
    if factors.is_identity() {
        return Ok(PieceGeometry {
            flat,
            darts,
            annotation,
        });
    }

    let scaled = scale_patch(&flat, ctx.piece, factors);
    let darts = plan_darts(&scaled, ctx, std::slice::from_ref(&annotation.seam_curve))?;
    let annotation = annotate(&scaled, ctx)?;
    Ok(PieceGeometry {
        flat: scaled,
        darts,
        annotation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::OverallStatus;
    use crate::measurement::{Dimension, MeasurementVector, SizeProfile};
    use crate::session::CancelToken;
    use crate::synthetic;
    use approx::assert_relative_eq;

    fn engine() -> PatternEngine {
        PatternEngine::new(PatternConfig::default().with_worker_threads(2)).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = PatternEngine::new(PatternConfig::default().with_seam_allowance(-1.0)).unwrap_err();
        assert!(matches!(err, PatternError::Config(ConfigError::InvalidSeamAllowance(_))));
    }

    #[test]
    fn test_torso_runs_clean() {
        let pattern = engine().run(&Session::new(synthetic::torso_input())).unwrap();
        assert_eq!(pattern.overall_status, OverallStatus::Ok);
        assert_eq!(pattern.patches.len(), 2);
        assert!(pattern.scale_factors.is_identity());
        assert!(pattern.patches.iter().all(|p| p.darts.is_empty()));
    }

    #[test]
    fn test_session_profile_grades_and_adds_dart() {
        let session = Session::new(synthetic::torso_input()).with_size_profile(
            SizeProfile::Measurements(MeasurementVector::new().with(Dimension::Bust, 112.8)),
        );
        let pattern = engine().run(&session).unwrap();

        assert_relative_eq!(pattern.scale_factors.get(Dimension::Bust), 1.2, epsilon = 1e-12);
        let front = pattern.piece("front").unwrap();
        assert_eq!(front.darts.len(), 1);
        assert_relative_eq!(front.darts[0].width, 9.4, epsilon = 1e-9);
    }

    #[test]
    fn test_cancelled_session_returns_no_pattern() {
        let token = CancelToken::new();
        token.cancel();
        let session = Session::new(synthetic::torso_input()).with_cancel_token(token);
        let err = engine().run(&session).unwrap_err();
        assert!(matches!(err, PatternError::Cancelled { .. }));
    }

    #[test]
    fn test_engine_is_shared_across_threads() {
        let engine = Arc::new(engine());
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || engine.run(&Session::new(synthetic::torso_input())))
            })
            .collect();
        let patterns: Vec<Pattern> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        for pattern in &patterns[1..] {
            assert_eq!(pattern.patches, patterns[0].patches);
        }
    }

    #[test]
    fn test_invalid_session_profile_is_rejected() {
        let session = Session::new(synthetic::torso_input()).with_size_profile(
            SizeProfile::Measurements(MeasurementVector::new().with(Dimension::Bust, -94.0)),
        );
        let err = engine().run(&session).unwrap_err();
        assert!(matches!(
            err,
            PatternError::Config(ConfigError::InvalidSizeProfile { .. })
        ));
    }
}
