use futures::future::BoxFuture;

use crate::errors::DtxError;
use crate::record::TransactionId;

/// Error type for two-phase commit participant operations.
///
/// This enum encapsulates potential errors that can occur while a resource
/// participates in a distributed transaction, including coordinator-level
/// protocol errors and resource-specific issues.
#[derive(Debug, thiserror::Error)]
pub enum ParticipantError {
    /// A protocol-level error occurred during a participant operation.
    #[error("participant error: {0}")]
    Dtx(#[from] DtxError),
    /// A general-purpose error variant for resource-specific issues.
    #[error("other participant error: {0}")]
    Other(String),
}

impl ParticipantError {
    /// Machine-readable error kind, delegating to [`DtxError::kind`] for
    /// protocol errors. Resource-specific errors report `OTHER`.
    pub fn kind(&self) -> &'static str {
        match self {
            ParticipantError::Dtx(err) => err.kind(),
            ParticipantError::Other(_) => "OTHER",
        }
    }
}

/// The outcome of a single participant phase call. `Ok(true)` is a yes vote,
/// `Ok(false)` a no vote without a hard error, `Err` a failure.
pub type ParticipantResult = std::result::Result<bool, ParticipantError>;

/// Trait for a participant in a two-phase commit protocol.
///
/// Any resource wishing to join a distributed transaction implements this
/// trait, either directly or through one of the adapters in
/// [`crate::adapters`]. The coordinator invokes each phase concurrently
/// across all participants and aggregates the results; participants never
/// see each other.
///
/// Methods return a [`BoxFuture`] so the trait stays object-safe while the
/// coordinator fans calls out with `join_all`. The coordinator imposes no
/// timeout: a participant that never resolves its future stalls that phase.
///
/// Implementations must be `Send` and `Sync`.
pub trait Participant: Send + Sync {
    /// Phase 1: do all work needed to guarantee that [`Participant::commit`]
    /// will succeed for `transaction_id`. Side effects must be confined so
    /// that [`Participant::rollback`] can fully undo them.
    ///
    /// Should be tolerant of being invoked twice with the same id, although
    /// the coordinator does not rely on it.
    fn prepare(&self, transaction_id: TransactionId) -> BoxFuture<'_, ParticipantResult>;

    /// Phase 2: finalize previously prepared work.
    ///
    /// Calling `commit` for a `transaction_id` that was never prepared is an
    /// error (`TRANSACTION_NOT_PREPARED`).
    fn commit(&self, transaction_id: TransactionId) -> BoxFuture<'_, ParticipantResult>;

    /// Phase 2 (compensating): undo prepared work.
    ///
    /// Calling `rollback` for a `transaction_id` that was never prepared is
    /// likewise an error.
    fn rollback(&self, transaction_id: TransactionId) -> BoxFuture<'_, ParticipantResult>;
}
