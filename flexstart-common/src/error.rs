use thiserror::Error;

/// Errors surfaced by provider collaborators (instance directory, shape
/// catalog, pricing catalog, policy store, idempotency store).
///
/// `CapacityUnavailable` is its own class on purpose: it is the one failure
/// that drives fallback progression instead of aborting an attempt.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("insufficient capacity for shape {shape}")]
    CapacityUnavailable { shape: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// Transient/recoverable provider failure (throttling, network blip,
    /// region restriction). Callers may degrade instead of aborting.
    #[error("provider temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("provider call failed: {0}")]
    Api(String),
}

impl ProviderError {
    pub fn is_capacity(&self) -> bool {
        matches!(self, ProviderError::CapacityUnavailable { .. })
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }
}

/// Engine-level error taxonomy. Per-instance errors are caught at the
/// instance-processing boundary and converted into result entries; they never
/// abort siblings in the same batch.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("policy error: {0}")]
    Policy(String),

    #[error("capacity unavailable for shape {0}")]
    Capacity(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("idempotency store error: {0}")]
    Store(String),

    #[error("timed out: {0}")]
    Timeout(String),
}
