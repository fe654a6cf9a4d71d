use std::sync::Arc;

use ahash::AHashMap as HashMap;
use futures::future::join_all;
use futures::lock::Mutex;
use log::{debug, error, warn};

use crate::ResourceKind;
use crate::adapters::{AppendLog, EventLogAdapter, TransactionalAdapter, TransactionalResource};
use crate::errors::{DtxError, Result};
use crate::participant::Participant;
use crate::record::{
    ParticipantId, ParticipantRecord, StatusSnapshot, TransactionId, TransactionRecord, TxPhase,
};

/// Which phase a fan-out is running; selects the participant method.
#[derive(Debug, Clone, Copy)]
enum PhaseOp {
    Prepare,
    Commit,
    Rollback,
}

impl PhaseOp {
    fn name(self) -> &'static str {
        match self {
            PhaseOp::Prepare => "prepare",
            PhaseOp::Commit => "commit",
            PhaseOp::Rollback => "rollback",
        }
    }
}

struct CoordinatorState {
    record: TransactionRecord,
    participants: HashMap<ParticipantId, Arc<dyn Participant>>,
    next_participant: u64,
}

/// Orchestrates a two-phase commit across all registered participants.
///
/// One coordinator instance owns exactly one distributed transaction. The
/// caller registers participants, then drives the protocol through
/// [`TransactionCoordinator::commit`] or
/// [`TransactionCoordinator::rollback`]. Each phase is a concurrent fan-out:
/// every participant call is issued without waiting for siblings, and the
/// coordinator suspends until all have completed, never cancelling the
/// others early. A single slow or failing participant therefore cannot
/// prevent the coordinator from learning the outcome of every other
/// participant.
///
/// All state sits behind an async mutex, so registration and phase entry
/// points are serialized even when the instance is driven by multiple
/// callers. The transaction record itself is mutated only after a phase's
/// fan-out has fully joined.
///
/// There is no durable transaction log: a process crash mid-commit leaves
/// resources unreconciled with no record to resume from.
pub struct TransactionCoordinator {
    transaction_id: TransactionId,
    coordinator_id: String,
    state: Mutex<CoordinatorState>,
}

impl TransactionCoordinator {
    /// Creates a coordinator with a fresh, globally unique transaction id.
    pub fn new(coordinator_id: impl Into<String>) -> Self {
        let coordinator_id = coordinator_id.into();
        let record = TransactionRecord::new(coordinator_id.clone());
        let transaction_id = record.transaction_id().clone();
        Self {
            transaction_id,
            coordinator_id,
            state: Mutex::new(CoordinatorState {
                record,
                participants: HashMap::new(),
                next_participant: 0,
            }),
        }
    }

    /// The id of the transaction this coordinator owns.
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    pub fn coordinator_id(&self) -> &str {
        &self.coordinator_id
    }

    /// Registers an arbitrary [`Participant`] and returns its assigned id.
    ///
    /// Registration is only allowed before the transaction begins; once the
    /// first prepare fan-out has started, further registrations are rejected
    /// with `REGISTRATION_CLOSED`.
    pub async fn register_participant(
        &self,
        name: &str,
        participant: Arc<dyn Participant>,
    ) -> Result<ParticipantId> {
        self.register(name, ResourceKind::Custom, participant).await
    }

    /// Registers a transactional resource behind a [`TransactionalAdapter`].
    pub async fn register_transactional<R>(
        &self,
        name: &str,
        adapter: Arc<TransactionalAdapter<R>>,
    ) -> Result<ParticipantId>
    where
        R: TransactionalResource + 'static,
    {
        self.register(name, ResourceKind::Transactional, adapter)
            .await
    }

    /// Registers an append-only log behind an [`EventLogAdapter`]. The caller
    /// keeps its own `Arc` to the adapter as the
    /// [`EventLogAdapter::add_events`] handle.
    pub async fn register_event_log<L>(
        &self,
        name: &str,
        adapter: Arc<EventLogAdapter<L>>,
    ) -> Result<ParticipantId>
    where
        L: AppendLog + 'static,
    {
        self.register(name, ResourceKind::EventLog, adapter).await
    }

    async fn register(
        &self,
        name: &str,
        kind: ResourceKind,
        participant: Arc<dyn Participant>,
    ) -> Result<ParticipantId> {
        let mut state = self.state.lock().await;
        if state.record.phase() != TxPhase::Init {
            return Err(DtxError::RegistrationClosed {
                transaction_id: self.transaction_id.clone(),
            });
        }
        let id = ParticipantId::new(state.next_participant);
        state.next_participant += 1;
        state.record.register(
            id.clone(),
            ParticipantRecord {
                name: name.to_string(),
                kind,
            },
        );
        state.participants.insert(id.clone(), participant);
        debug!(
            "registered participant {id} ({name}, {kind}) for transaction {}",
            self.transaction_id
        );
        Ok(id)
    }

    /// Phase 1: fans `prepare` out to every registered participant and
    /// returns whether all of them prepared.
    ///
    /// With zero participants this returns `true` trivially and leaves the
    /// phase untouched.
    pub async fn prepare_all(&self) -> bool {
        let mut state = self.state.lock().await;
        Self::run_prepare(&mut state).await
    }

    /// Phase 2a: fans `commit` out to every prepared participant (never to
    /// unprepared ones) and returns whether all of them committed.
    pub async fn commit_all(&self) -> bool {
        let mut state = self.state.lock().await;
        Self::run_commit(&mut state).await
    }

    /// Compensating phase: fans `rollback` out over every prepared,
    /// not-yet-committed participant and returns whether all of them rolled
    /// back. An already committed participant is never rolled back.
    pub async fn rollback_all(&self) -> bool {
        let mut state = self.state.lock().await;
        Self::run_rollback(&mut state).await
    }

    /// Runs the full protocol: prepare every participant, then commit them.
    ///
    /// If any participant fails to prepare, every participant that did
    /// prepare is rolled back and `PREPARE_FAILED` is returned; no partial
    /// commit is attempted. If all prepare but any fail to commit, the
    /// transaction is left partially committed and the distinct
    /// `COMMIT_FAILED` error is returned: some resources are now durably
    /// committed while others are not, and the protocol provides no further
    /// automatic remedy. Operator intervention is required.
    pub async fn commit(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if !Self::run_prepare(&mut state).await {
            // Compensate, but never let a rollback failure mask the
            // original prepare failure.
            if !Self::run_rollback(&mut state).await {
                warn!(
                    "transaction {}: rollback after failed prepare left participants unrecovered",
                    self.transaction_id
                );
            }
            return Err(DtxError::PrepareFailed {
                transaction_id: self.transaction_id.clone(),
            });
        }

        if !Self::run_commit(&mut state).await {
            return Err(DtxError::CommitFailed {
                transaction_id: self.transaction_id.clone(),
            });
        }

        debug!("transaction {} committed", self.transaction_id);
        Ok(())
    }

    /// Unconditionally rolls back every prepared, not-yet-committed
    /// participant.
    ///
    /// A participant that fails to roll back is logged at warning severity
    /// (this is already the error path) and the aggregate outcome surfaces
    /// as `ROLLBACK_FAILED`.
    pub async fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !Self::run_rollback(&mut state).await {
            return Err(DtxError::RollbackFailed {
                transaction_id: self.transaction_id.clone(),
            });
        }
        Ok(())
    }

    /// A pure projection of the transaction record for observability. Does
    /// not mutate any state.
    pub async fn transaction_status(&self) -> StatusSnapshot {
        self.state.lock().await.record.snapshot()
    }

    async fn run_prepare(state: &mut CoordinatorState) -> bool {
        let targets = state.record.prepare_targets();
        if targets.is_empty() {
            return true;
        }
        state.record.begin_prepare();
        let outcomes = Self::fan_out(state, &targets, PhaseOp::Prepare).await;
        for (id, ok) in &outcomes {
            if *ok {
                state.record.mark_prepared(id);
            }
        }
        let all = state.record.prepared_count() == state.record.participant_count();
        state.record.set_phase(if all { TxPhase::Prepared } else { TxPhase::Failed });
        if !all {
            warn!(
                "transaction {}: {} of {} participants prepared",
                state.record.transaction_id(),
                state.record.prepared_count(),
                state.record.participant_count()
            );
        }
        all
    }

    async fn run_commit(state: &mut CoordinatorState) -> bool {
        let targets = state.record.commit_targets();
        if targets.is_empty() {
            return true;
        }
        state.record.begin_commit();
        let outcomes = Self::fan_out(state, &targets, PhaseOp::Commit).await;
        for (id, ok) in &outcomes {
            if *ok {
                state.record.mark_committed(id);
            }
        }
        let all = state.record.committed_count() == state.record.prepared_count();
        state.record.set_phase(if all { TxPhase::Committed } else { TxPhase::Failed });
        if !all {
            error!(
                "transaction {}: PARTIAL COMMIT, {} of {} prepared participants committed; manual recovery required",
                state.record.transaction_id(),
                state.record.committed_count(),
                state.record.prepared_count()
            );
        }
        all
    }

    async fn run_rollback(state: &mut CoordinatorState) -> bool {
        let targets = state.record.rollback_targets();
        if targets.is_empty() {
            return true;
        }
        // A compensating rollback after a failed prepare leaves the
        // transaction failed; only a rollback of a fully prepared
        // transaction reaches RolledBack.
        let compensating = state.record.phase() == TxPhase::Failed;
        state.record.begin_rollback();
        let outcomes = Self::fan_out(state, &targets, PhaseOp::Rollback).await;
        for (id, ok) in &outcomes {
            if *ok {
                state.record.mark_rolled_back(id);
            }
        }
        let all = state.record.rolled_back_count() == targets.len();
        let next = if !all || compensating {
            TxPhase::Failed
        } else {
            TxPhase::RolledBack
        };
        state.record.set_phase(next);
        if !all {
            warn!(
                "transaction {}: {} of {} targeted participants rolled back",
                state.record.transaction_id(),
                state.record.rolled_back_count(),
                targets.len()
            );
        }
        all
    }

    /// Issues one phase call per target concurrently and waits for all of
    /// them, success or failure. Individual participant errors are converted
    /// to failure entries; they never abort sibling operations.
    async fn fan_out(
        state: &CoordinatorState,
        targets: &[ParticipantId],
        op: PhaseOp,
    ) -> Vec<(ParticipantId, bool)> {
        let tx_id = state.record.transaction_id().clone();
        let calls: Vec<_> = targets
            .iter()
            .filter_map(|id| {
                let participant = Arc::clone(state.participants.get(id)?);
                let id = id.clone();
                let tx = tx_id.clone();
                Some(async move {
                    let outcome = match op {
                        PhaseOp::Prepare => participant.prepare(tx).await,
                        PhaseOp::Commit => participant.commit(tx).await,
                        PhaseOp::Rollback => participant.rollback(tx).await,
                    };
                    (id, outcome)
                })
            })
            .collect();

        let mut results = Vec::with_capacity(calls.len());
        for (id, outcome) in join_all(calls).await {
            let ok = match outcome {
                Ok(true) => {
                    debug!("participant {id} finished {} for transaction {tx_id}", op.name());
                    true
                }
                Ok(false) => {
                    warn!("participant {id} voted no on {} for transaction {tx_id}", op.name());
                    false
                }
                Err(err) => {
                    warn!(
                        "participant {id} failed {} for transaction {tx_id}: {err}",
                        op.name()
                    );
                    false
                }
            };
            results.push((id, ok));
        }
        results
    }
}
