//! Pipeline configuration.
//!
//! [`PatternConfig`] is plain data with serde support, so a whole run can be
//! described in a TOML file:
//!
//! ```toml
//! seam_allowance = 1.5
//! corner_join_policy = "round"
//! max_dart_width = 4.0
//! flatten_iteration_cap = 800
//!
//! [size_profile]
//! standard = "L"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::measurement::SizeProfile;

/// How seam allowance corners are joined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CornerJoinPolicy {
    /// Sharp corners, limited by [`PatternConfig::miter_limit`].
    #[default]
    Miter,
    /// Circular arcs around convex corners.
    Round,
}

/// Configuration for every pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Seam allowance offset distance.
    pub seam_allowance: f64,

    /// Corner join policy for seam allowances.
    pub corner_join_policy: CornerJoinPolicy,

    /// Miter length limit, in multiples of the allowance.
    pub miter_limit: f64,

    /// Largest allowed width of one dart leg before splitting.
    pub max_dart_width: f64,

    /// Largest number of darts per cross-section.
    pub max_dart_count: usize,

    /// Slide attempts when a dart conflicts with a seam.
    pub max_dart_slide_steps: usize,

    /// Excess length below which no dart is placed.
    pub ease_tolerance: f64,

    /// Maximum relaxation iterations per patch.
    pub flatten_iteration_cap: usize,

    /// Energy decrease below which relaxation has converged.
    pub flatten_convergence_epsilon: f64,

    /// Per-vertex distortion above which a converged patch is flagged.
    pub max_distortion: f64,

    /// Edge stretch beyond which flattening is considered diverged.
    pub max_stretch_bound: f64,

    /// Minimum confidence for a required keypoint.
    pub min_keypoint_confidence: f64,

    /// Size of the flattening worker pool.
    pub worker_threads: usize,

    /// Default wall-clock budget for a session.
    pub session_timeout_ms: Option<u64>,

    /// Default target size when the session does not name one.
    pub size_profile: Option<SizeProfile>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            seam_allowance: 1.0,
            corner_join_policy: CornerJoinPolicy::Miter,
            miter_limit: 4.0,
            max_dart_width: 5.0,
            max_dart_count: 4,
            max_dart_slide_steps: 40,
            ease_tolerance: 0.5,
            flatten_iteration_cap: 500,
            flatten_convergence_epsilon: 1e-9,
            max_distortion: 0.1,
            max_stretch_bound: 1000.0,
            min_keypoint_confidence: 0.5,
            worker_threads: 4,
            session_timeout_ms: None,
            size_profile: None,
        }
    }
}

impl PatternConfig {
    /// Set the seam allowance.
    pub fn with_seam_allowance(mut self, allowance: f64) -> Self {
        self.seam_allowance = allowance;
        self
    }

    /// Set the corner join policy.
    pub fn with_corner_join_policy(mut self, policy: CornerJoinPolicy) -> Self {
        self.corner_join_policy = policy;
        self
    }

    /// Set the dart leg width split threshold.
    pub fn with_max_dart_width(mut self, width: f64) -> Self {
        self.max_dart_width = width;
        self
    }

    /// Set the flattening stop conditions.
    pub fn with_flatten_limits(mut self, iteration_cap: usize, epsilon: f64) -> Self {
        self.flatten_iteration_cap = iteration_cap;
        self.flatten_convergence_epsilon = epsilon;
        self
    }

    /// Set the worker pool size.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Set the default size profile.
    pub fn with_size_profile(mut self, profile: SizeProfile) -> Self {
        self.size_profile = Some(profile);
        self
    }

    /// Default session deadline, if configured.
    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_ms.map(Duration::from_millis)
    }

    /// Check every value before any session runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.seam_allowance.is_finite() || self.seam_allowance < 0.0 {
            return Err(ConfigError::InvalidSeamAllowance(self.seam_allowance));
        }
        if self.flatten_iteration_cap == 0 {
            return Err(ConfigError::ZeroIterationCap);
        }
        if self.max_dart_count == 0 {
            return Err(ConfigError::ZeroDartCount);
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::ZeroWorkers);
        }

        let positive = [
            ("miter_limit", self.miter_limit),
            ("max_dart_width", self.max_dart_width),
            ("flatten_convergence_epsilon", self.flatten_convergence_epsilon),
            ("max_distortion", self.max_distortion),
            ("max_stretch_bound", self.max_stretch_bound),
        ];
        for (key, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NotPositive { key, value });
            }
        }
        if !self.ease_tolerance.is_finite() || self.ease_tolerance < 0.0 {
            return Err(ConfigError::NotPositive {
                key: "ease_tolerance",
                value: self.ease_tolerance,
            });
        }
        if !(0.0..=1.0).contains(&self.min_keypoint_confidence) {
            return Err(ConfigError::NotPositive {
                key: "min_keypoint_confidence",
                value: self.min_keypoint_confidence,
            });
        }

        if let Some(profile) = &self.size_profile {
            profile.validate()?;
        }

        Ok(())
    }

    /// Parse and validate a configuration from TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConfigError::Parse {
            details: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            details: e.to_string(),
        })
    }
}
