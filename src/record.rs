use std::fmt;
use std::time::SystemTime;

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use serde::{Deserialize, Serialize};

use crate::ResourceKind;

/// A globally unique identifier for a distributed transaction.
///
/// Assigned when the coordinator is constructed and never changes for the
/// lifetime of the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    pub(crate) fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque key identifying a registered participant.
///
/// Assigned by the coordinator at registration time and used as the index
/// into every status set. Participants are unaware of their own identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub(crate) fn new(n: u64) -> Self {
        Self(format!("p-{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The state of a distributed transaction in the 2PC protocol.
///
/// `Init` is the only start state; `Committed`, `RolledBack`, and `Failed`
/// are terminal: no further phase transition is attempted automatically from
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxPhase {
    Init,
    Preparing,
    Prepared,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
    Failed,
}

/// The derived status of a single participant, never stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantStatus {
    Init,
    Prepared,
    RolledBack,
    Committed,
}

/// Static registration data for one participant. Status is derived from the
/// transaction record's membership sets, see
/// [`TransactionRecord::participant_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub name: String,
    pub kind: ResourceKind,
}

/// The aggregate root of the coordinator's state: phase, per-participant
/// membership sets, and per-phase timestamps.
///
/// Mutated only by the owning coordinator, and only after a phase fan-out has
/// fully joined. The mark methods enforce the membership invariants
/// structurally: a participant can only be committed or rolled back after
/// being prepared, and never both.
#[derive(Debug)]
pub struct TransactionRecord {
    transaction_id: TransactionId,
    coordinator_id: String,
    phase: TxPhase,
    participants: HashMap<ParticipantId, ParticipantRecord>,
    prepared: HashSet<ParticipantId>,
    committed: HashSet<ParticipantId>,
    rolled_back: HashSet<ParticipantId>,
    prepare_time: Option<SystemTime>,
    commit_time: Option<SystemTime>,
    rollback_time: Option<SystemTime>,
}

impl TransactionRecord {
    pub(crate) fn new(coordinator_id: String) -> Self {
        Self {
            transaction_id: TransactionId::generate(),
            coordinator_id,
            phase: TxPhase::Init,
            participants: HashMap::new(),
            prepared: HashSet::new(),
            committed: HashSet::new(),
            rolled_back: HashSet::new(),
            prepare_time: None,
            commit_time: None,
            rollback_time: None,
        }
    }

    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    pub fn coordinator_id(&self) -> &str {
        &self.coordinator_id
    }

    pub fn phase(&self) -> TxPhase {
        self.phase
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn prepared_count(&self) -> usize {
        self.prepared.len()
    }

    pub fn committed_count(&self) -> usize {
        self.committed.len()
    }

    pub fn rolled_back_count(&self) -> usize {
        self.rolled_back.len()
    }

    pub(crate) fn set_phase(&mut self, phase: TxPhase) {
        self.phase = phase;
    }

    pub(crate) fn register(&mut self, id: ParticipantId, record: ParticipantRecord) {
        self.participants.insert(id, record);
    }

    /// Marks the start of the prepare phase. The timestamp is set once and
    /// never reset.
    pub(crate) fn begin_prepare(&mut self) {
        self.phase = TxPhase::Preparing;
        self.prepare_time.get_or_insert_with(SystemTime::now);
    }

    pub(crate) fn begin_commit(&mut self) {
        self.phase = TxPhase::Committing;
        self.commit_time.get_or_insert_with(SystemTime::now);
    }

    pub(crate) fn begin_rollback(&mut self) {
        self.phase = TxPhase::RollingBack;
        self.rollback_time.get_or_insert_with(SystemTime::now);
    }

    /// Adds a participant to the prepared set. Unknown ids are ignored.
    pub(crate) fn mark_prepared(&mut self, id: &ParticipantId) -> bool {
        if !self.participants.contains_key(id) {
            return false;
        }
        self.prepared.insert(id.clone());
        true
    }

    /// Adds a participant to the committed set. Only prepared, not
    /// rolled-back participants can be committed.
    pub(crate) fn mark_committed(&mut self, id: &ParticipantId) -> bool {
        if !self.prepared.contains(id) || self.rolled_back.contains(id) {
            return false;
        }
        self.committed.insert(id.clone());
        true
    }

    /// Adds a participant to the rolled-back set. Only prepared,
    /// not-yet-committed participants can be rolled back.
    pub(crate) fn mark_rolled_back(&mut self, id: &ParticipantId) -> bool {
        if !self.prepared.contains(id) || self.committed.contains(id) {
            return false;
        }
        self.rolled_back.insert(id.clone());
        true
    }

    /// The ids a prepare fan-out targets: every registered participant.
    pub(crate) fn prepare_targets(&self) -> Vec<ParticipantId> {
        self.participants.keys().cloned().collect()
    }

    /// The ids a commit fan-out targets: every prepared participant.
    pub(crate) fn commit_targets(&self) -> Vec<ParticipantId> {
        self.prepared.iter().cloned().collect()
    }

    /// The ids a rollback fan-out targets: prepared participants that have
    /// not committed. An already committed participant is never rolled back.
    pub(crate) fn rollback_targets(&self) -> Vec<ParticipantId> {
        self.prepared
            .iter()
            .filter(|id| !self.committed.contains(*id))
            .cloned()
            .collect()
    }

    /// Derives a participant's status from the membership sets, checked in
    /// priority order: committed, rolled back, prepared, init.
    pub fn participant_status(&self, id: &ParticipantId) -> ParticipantStatus {
        if self.committed.contains(id) {
            ParticipantStatus::Committed
        } else if self.rolled_back.contains(id) {
            ParticipantStatus::RolledBack
        } else if self.prepared.contains(id) {
            ParticipantStatus::Prepared
        } else {
            ParticipantStatus::Init
        }
    }

    /// A pure, side-effect-free projection of the record for observability.
    pub fn snapshot(&self) -> StatusSnapshot {
        let participants = self
            .participants
            .iter()
            .map(|(id, record)| {
                (
                    id.clone(),
                    ParticipantSnapshot {
                        name: record.name.clone(),
                        kind: record.kind,
                        status: self.participant_status(id),
                    },
                )
            })
            .collect();

        StatusSnapshot {
            transaction_id: self.transaction_id.clone(),
            coordinator_id: self.coordinator_id.clone(),
            phase: self.phase,
            prepare_time: self.prepare_time,
            commit_time: self.commit_time,
            rollback_time: self.rollback_time,
            participant_count: self.participants.len(),
            prepared_count: self.prepared.len(),
            committed_count: self.committed.len(),
            rolled_back_count: self.rolled_back.len(),
            participants,
        }
    }
}

/// Per-participant entry in a [`StatusSnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantSnapshot {
    pub name: String,
    pub kind: ResourceKind,
    pub status: ParticipantStatus,
}

/// A plain read-only view of a transaction's state, suitable for logging or
/// shipping to operational tooling.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub transaction_id: TransactionId,
    pub coordinator_id: String,
    pub phase: TxPhase,
    pub prepare_time: Option<SystemTime>,
    pub commit_time: Option<SystemTime>,
    pub rollback_time: Option<SystemTime>,
    pub participant_count: usize,
    pub prepared_count: usize,
    pub committed_count: usize,
    pub rolled_back_count: usize,
    pub participants: std::collections::HashMap<ParticipantId, ParticipantSnapshot>,
}
