use std::sync::Arc;

use ahash::AHashMap as HashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::DtxError;
use crate::participant::{Participant, ParticipantError, ParticipantResult};
use crate::record::TransactionId;

/// A single record destined for an append-only store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// The stream or topic the record belongs to.
    pub stream: String,
    /// The record's kind, e.g. a domain event name.
    pub kind: String,
    /// Opaque payload bytes; serialization is the caller's concern.
    pub payload: Vec<u8>,
}

/// An append-only store, such as an event store or a write-ahead journal.
///
/// `append` must be atomic: either every record in the batch lands or none
/// do.
pub trait AppendLog: Send + Sync {
    fn append(&self, records: Vec<EventRecord>) -> std::result::Result<(), ParticipantError>;
}

/// [`Participant`] adapter for an append-only log.
///
/// `prepare` is a no-op that only guarantees an (initially empty) buffer
/// exists for the transaction id; the owning caller appends records through
/// [`EventLogAdapter::add_events`] at any point before commit. `commit`
/// flushes the buffer to the underlying store and discards it; `rollback`
/// discards the buffer without flushing. Prepare need not do real work here,
/// it only provides the commit/rollback guarantee.
pub struct EventLogAdapter<L: AppendLog> {
    store: Arc<L>,
    buffers: Mutex<HashMap<TransactionId, Vec<EventRecord>>>,
}

impl<L: AppendLog> EventLogAdapter<L> {
    pub fn new(store: Arc<L>) -> Self {
        Self {
            store,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Buffers records for `transaction_id`, creating the buffer if it does
    /// not exist yet. Nothing reaches the store until commit.
    pub fn add_events(&self, transaction_id: &TransactionId, records: Vec<EventRecord>) {
        self.buffers
            .lock()
            .entry(transaction_id.clone())
            .or_default()
            .extend(records);
    }

    /// Number of records currently buffered for `transaction_id`.
    pub fn buffered(&self, transaction_id: &TransactionId) -> usize {
        self.buffers
            .lock()
            .get(transaction_id)
            .map_or(0, Vec::len)
    }

    fn do_prepare(&self, transaction_id: &TransactionId) -> ParticipantResult {
        self.buffers
            .lock()
            .entry(transaction_id.clone())
            .or_default();
        Ok(true)
    }

    fn do_commit(&self, transaction_id: &TransactionId) -> ParticipantResult {
        let mut buffers = self.buffers.lock();
        let events = buffers.get(transaction_id).ok_or_else(|| {
            DtxError::TransactionNotPrepared {
                transaction_id: transaction_id.clone(),
            }
        })?;
        if !events.is_empty() {
            let count = events.len();
            // The buffer is discarded only once the store has accepted the
            // records; after a failed flush it stays in place so a later
            // rollback can still discard it.
            self.store.append(events.clone()).map_err(|err| {
                DtxError::EventCommitFailed {
                    transaction_id: transaction_id.clone(),
                    reason: err.to_string(),
                }
            })?;
            debug!("event log adapter flushed {count} records for transaction {transaction_id}");
        }
        buffers.remove(transaction_id);
        Ok(true)
    }

    fn do_rollback(&self, transaction_id: &TransactionId) -> ParticipantResult {
        let dropped = self.buffers.lock().remove(transaction_id).ok_or_else(|| {
            DtxError::TransactionNotPrepared {
                transaction_id: transaction_id.clone(),
            }
        })?;
        debug!(
            "event log adapter discarded {} records for transaction {transaction_id}",
            dropped.len()
        );
        Ok(true)
    }
}

impl<L: AppendLog> Participant for EventLogAdapter<L> {
    fn prepare(&self, transaction_id: TransactionId) -> BoxFuture<'_, ParticipantResult> {
        async move { self.do_prepare(&transaction_id) }.boxed()
    }

    fn commit(&self, transaction_id: TransactionId) -> BoxFuture<'_, ParticipantResult> {
        async move { self.do_commit(&transaction_id) }.boxed()
    }

    fn rollback(&self, transaction_id: TransactionId) -> BoxFuture<'_, ParticipantResult> {
        async move { self.do_rollback(&transaction_id) }.boxed()
    }
}
