//! Per-session values owned by the caller.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::CancelReason;
use crate::input::GarmentInput;
use crate::measurement::SizeProfile;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Identifier the caller files a Pattern under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A process-unique id.
    pub fn generate() -> Self {
        Self(format!("session-{}", NEXT_SESSION.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared flag the caller flips to stop a running session.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Cancellation checkpoint polled between flattening iterations.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    token: Option<CancelToken>,
    deadline: Option<Instant>,
}

impl Interrupt {
    /// Never fires.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn new(token: CancelToken, deadline: Option<Instant>) -> Self {
        Self {
            token: Some(token),
            deadline,
        }
    }

    /// Why the session must stop, if it must.
    pub fn check(&self) -> Option<CancelReason> {
        if self.token.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }
}

/// One garment's pass through the pipeline.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    input: GarmentInput,
    size_profile: Option<SizeProfile>,
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl Session {
    pub fn new(input: GarmentInput) -> Self {
        Self {
            id: SessionId::generate(),
            input,
            size_profile: None,
            deadline: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_id(mut self, id: SessionId) -> Self {
        self.id = id;
        self
    }

    /// Override the engine's default size profile.
    pub fn with_size_profile(mut self, profile: SizeProfile) -> Self {
        self.size_profile = Some(profile);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn input(&self) -> &GarmentInput {
        &self.input
    }

    pub fn size_profile(&self) -> Option<&SizeProfile> {
        self.size_profile.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Handle for cancelling this session from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn interrupt(&self) -> Interrupt {
        Interrupt::new(self.cancel.clone(), self.deadline)
    }
}
