use thiserror::Error;

use crate::record::TransactionId;

#[derive(Error, Debug)]
pub enum DtxError {
    #[error("transaction {transaction_id}: not all participants prepared")]
    PrepareFailed { transaction_id: TransactionId },

    #[error(
        "transaction {transaction_id}: partial commit, some participants committed while others did not; manual recovery required"
    )]
    CommitFailed { transaction_id: TransactionId },

    #[error("transaction {transaction_id}: not all participants rolled back")]
    RollbackFailed { transaction_id: TransactionId },

    #[error("transaction {transaction_id} was never prepared")]
    TransactionNotPrepared { transaction_id: TransactionId },

    #[error("transaction {transaction_id}: event commit failed: {reason}")]
    EventCommitFailed {
        transaction_id: TransactionId,
        reason: String,
    },

    #[error("transaction {transaction_id} has already started; registration is closed")]
    RegistrationClosed { transaction_id: TransactionId },
}

impl DtxError {
    /// Machine-readable error kind. These codes are stable and safe for
    /// external error-handling logic to match on.
    pub fn kind(&self) -> &'static str {
        match self {
            DtxError::PrepareFailed { .. } => "PREPARE_FAILED",
            DtxError::CommitFailed { .. } => "COMMIT_FAILED",
            DtxError::RollbackFailed { .. } => "ROLLBACK_FAILED",
            DtxError::TransactionNotPrepared { .. } => "TRANSACTION_NOT_PREPARED",
            DtxError::EventCommitFailed { .. } => "EVENT_COMMIT_FAILED",
            DtxError::RegistrationClosed { .. } => "REGISTRATION_CLOSED",
        }
    }

    /// The transaction the error belongs to.
    pub fn transaction_id(&self) -> &TransactionId {
        match self {
            DtxError::PrepareFailed { transaction_id }
            | DtxError::CommitFailed { transaction_id }
            | DtxError::RollbackFailed { transaction_id }
            | DtxError::TransactionNotPrepared { transaction_id }
            | DtxError::EventCommitFailed { transaction_id, .. }
            | DtxError::RegistrationClosed { transaction_id } => transaction_id,
        }
    }
}

pub type Result<T> = std::result::Result<T, DtxError>;
