//! Dtx: a two-phase commit coordinator for heterogeneous in-process
//! resources.
//!
//! Independently-owned resources (relational transactions, event stores,
//! other sub-transactions) register with a [`TransactionCoordinator`] as
//! [`Participant`]s and are committed or rolled back atomically as a group.
//! Phase 1 fans `prepare` out to all participants concurrently; if all
//! succeed, phase 2 fans `commit` out to them, otherwise the prepared ones
//! are rolled back.
//!
//! Known limitations: the transaction record lives only in process memory
//! (no durable log, no crash recovery), and participant calls carry no
//! deadline (an unresponsive participant stalls its phase).

pub mod adapters;
pub mod coordinator;
pub mod errors;
pub mod participant;
pub mod record;

// Re-export key types and structs for easier access
pub use adapters::{
    AppendLog, EventLogAdapter, EventRecord, ResourceTransaction, TransactionalAdapter,
    TransactionalResource,
};
pub use coordinator::TransactionCoordinator;
pub use errors::{DtxError, Result};
pub use participant::{Participant, ParticipantError, ParticipantResult};
pub use record::{
    ParticipantId, ParticipantRecord, ParticipantSnapshot, ParticipantStatus, StatusSnapshot,
    TransactionId, TransactionRecord, TxPhase,
};

use serde::{Deserialize, Serialize};

/// The kind of resource backing a participant, chosen explicitly by the
/// caller at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A begin/commit/rollback-capable resource behind a
    /// [`TransactionalAdapter`].
    Transactional,
    /// An append-only log behind an [`EventLogAdapter`].
    EventLog,
    /// A caller-provided [`Participant`] implementation.
    Custom,
}

impl ResourceKind {
    /// The stable string form used in status snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Transactional => "transactional",
            ResourceKind::EventLog => "event_log",
            ResourceKind::Custom => "custom",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
