//! Shared mock resources for testing the dtx coordinator.
//!
//! Provides a scriptable direct [`Participant`] implementation, an in-memory
//! transactional resource, and an in-memory append-only store, all with
//! counters and captured state so tests can assert on what each phase
//! actually did.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;

use dtx::{
    AppendLog, EventRecord, Participant, ParticipantError, ParticipantResult, ResourceTransaction,
    StatusSnapshot, TransactionId, TransactionalResource,
};

/// Counts in a snapshot must always respect the membership invariants:
/// committed and rolled-back participants are subsets of the prepared ones,
/// and never overlap.
pub fn assert_invariants(snapshot: &StatusSnapshot) {
    assert!(snapshot.committed_count <= snapshot.prepared_count);
    assert!(snapshot.rolled_back_count <= snapshot.prepared_count - snapshot.committed_count);
    assert!(snapshot.prepared_count <= snapshot.participant_count);
}

/// A participant whose phase outcomes are scripted up front. Counts every
/// call so tests can verify fan-out behavior.
pub struct ScriptedParticipant {
    fail_prepare: bool,
    fail_commit: bool,
    fail_rollback: bool,
    pub prepare_calls: AtomicUsize,
    pub commit_calls: AtomicUsize,
    pub rollback_calls: AtomicUsize,
}

impl ScriptedParticipant {
    fn with_failures(fail_prepare: bool, fail_commit: bool, fail_rollback: bool) -> Arc<Self> {
        Arc::new(Self {
            fail_prepare,
            fail_commit,
            fail_rollback,
            prepare_calls: AtomicUsize::new(0),
            commit_calls: AtomicUsize::new(0),
            rollback_calls: AtomicUsize::new(0),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::with_failures(false, false, false)
    }

    pub fn failing_prepare() -> Arc<Self> {
        Self::with_failures(true, false, false)
    }

    pub fn failing_commit() -> Arc<Self> {
        Self::with_failures(false, true, false)
    }

    pub fn failing_rollback() -> Arc<Self> {
        Self::with_failures(false, false, true)
    }

    fn outcome(fail: bool, phase: &str) -> ParticipantResult {
        if fail {
            Err(ParticipantError::Other(format!("scripted {phase} failure")))
        } else {
            Ok(true)
        }
    }
}

impl Participant for ScriptedParticipant {
    fn prepare(&self, _transaction_id: TransactionId) -> BoxFuture<'_, ParticipantResult> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = Self::outcome(self.fail_prepare, "prepare");
        async move { outcome }.boxed()
    }

    fn commit(&self, _transaction_id: TransactionId) -> BoxFuture<'_, ParticipantResult> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = Self::outcome(self.fail_commit, "commit");
        async move { outcome }.boxed()
    }

    fn rollback(&self, _transaction_id: TransactionId) -> BoxFuture<'_, ParticipantResult> {
        self.rollback_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = Self::outcome(self.fail_rollback, "rollback");
        async move { outcome }.boxed()
    }
}

/// Counters shared between a [`MockResource`] and the transaction handles it
/// hands out.
#[derive(Default)]
pub struct ResourceCounters {
    pub begun: AtomicUsize,
    pub committed: AtomicUsize,
    pub rolled_back: AtomicUsize,
}

/// An in-memory begin/commit/rollback-capable resource.
pub struct MockResource {
    pub counters: Arc<ResourceCounters>,
    pub published: Mutex<Vec<EventRecord>>,
    fail_begin: bool,
    fail_commit: bool,
    fail_publish: bool,
    buffered_events: Vec<EventRecord>,
}

impl MockResource {
    fn build(
        fail_begin: bool,
        fail_commit: bool,
        fail_publish: bool,
        buffered_events: Vec<EventRecord>,
    ) -> Arc<Self> {
        Arc::new(Self {
            counters: Arc::new(ResourceCounters::default()),
            published: Mutex::new(Vec::new()),
            fail_begin,
            fail_commit,
            fail_publish,
            buffered_events,
        })
    }

    pub fn new() -> Arc<Self> {
        Self::build(false, false, false, Vec::new())
    }

    pub fn with_events(events: Vec<EventRecord>) -> Arc<Self> {
        Self::build(false, false, false, events)
    }

    pub fn failing_begin() -> Arc<Self> {
        Self::build(true, false, false, Vec::new())
    }

    pub fn failing_commit() -> Arc<Self> {
        Self::build(false, true, false, Vec::new())
    }

    pub fn failing_publish(events: Vec<EventRecord>) -> Arc<Self> {
        Self::build(false, false, true, events)
    }
}

pub struct MockTx {
    counters: Arc<ResourceCounters>,
    events: Vec<EventRecord>,
    fail_commit: bool,
}

impl ResourceTransaction for MockTx {
    fn commit(&mut self) -> Result<(), ParticipantError> {
        if self.fail_commit {
            return Err(ParticipantError::Other("mock commit failure".to_string()));
        }
        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ParticipantError> {
        self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn take_events(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.events)
    }
}

impl TransactionalResource for MockResource {
    type Tx = MockTx;

    fn begin(&self) -> Result<MockTx, ParticipantError> {
        if self.fail_begin {
            return Err(ParticipantError::Other("mock begin failure".to_string()));
        }
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        Ok(MockTx {
            counters: Arc::clone(&self.counters),
            events: self.buffered_events.clone(),
            fail_commit: self.fail_commit,
        })
    }

    fn publish_events(&self, events: Vec<EventRecord>) -> Result<(), ParticipantError> {
        if self.fail_publish {
            return Err(ParticipantError::Other("mock publish failure".to_string()));
        }
        self.published.lock().extend(events);
        Ok(())
    }
}

/// An in-memory append-only store.
pub struct MockEventStore {
    pub appended: Mutex<Vec<EventRecord>>,
    fail_append: bool,
}

impl MockEventStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            appended: Mutex::new(Vec::new()),
            fail_append: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            appended: Mutex::new(Vec::new()),
            fail_append: true,
        })
    }
}

impl AppendLog for MockEventStore {
    fn append(&self, records: Vec<EventRecord>) -> Result<(), ParticipantError> {
        if self.fail_append {
            return Err(ParticipantError::Other("mock append failure".to_string()));
        }
        self.appended.lock().extend(records);
        Ok(())
    }
}

pub fn event(stream: &str, kind: &str, payload: &[u8]) -> EventRecord {
    EventRecord {
        stream: stream.to_string(),
        kind: kind.to_string(),
        payload: payload.to_vec(),
    }
}
