use std::sync::Arc;

use ahash::AHashMap as HashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use log::debug;
use parking_lot::Mutex;

use crate::adapters::event_log::EventRecord;
use crate::errors::DtxError;
use crate::participant::{Participant, ParticipantError, ParticipantResult};
use crate::record::TransactionId;

/// A live transaction handle on an underlying resource.
///
/// Obtained from [`TransactionalResource::begin`] and driven to exactly one
/// of `commit` or `rollback` by the adapter.
pub trait ResourceTransaction: Send {
    fn commit(&mut self) -> std::result::Result<(), ParticipantError>;

    fn rollback(&mut self) -> std::result::Result<(), ParticipantError>;

    /// Drains the domain events the resource buffered while this transaction
    /// ran. Called once, after a successful commit.
    fn take_events(&mut self) -> Vec<EventRecord>;
}

/// A resource capable of beginning transactions that can later be committed
/// or rolled back, such as a relational database connection.
///
/// Implementations must be `Send` and `Sync`; the adapter calls `begin`
/// concurrently with other participants' prepare work.
pub trait TransactionalResource: Send + Sync {
    type Tx: ResourceTransaction + 'static;

    fn begin(&self) -> std::result::Result<Self::Tx, ParticipantError>;

    /// Publishes domain events collected during a committed transaction.
    fn publish_events(
        &self,
        events: Vec<EventRecord>,
    ) -> std::result::Result<(), ParticipantError>;
}

/// [`Participant`] adapter for a begin/commit/rollback-capable resource.
///
/// `prepare` begins the underlying resource's transaction and remembers it
/// keyed by transaction id. `commit` commits that transaction and publishes
/// any domain events it buffered; `rollback` rolls it back. Both forget the
/// handle afterwards and fail with `TRANSACTION_NOT_PREPARED` for an id this
/// adapter instance never prepared.
pub struct TransactionalAdapter<R: TransactionalResource> {
    resource: Arc<R>,
    open: Mutex<HashMap<TransactionId, R::Tx>>,
}

impl<R: TransactionalResource> TransactionalAdapter<R> {
    pub fn new(resource: Arc<R>) -> Self {
        Self {
            resource,
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Number of transactions currently prepared and awaiting phase 2.
    pub fn open_transactions(&self) -> usize {
        self.open.lock().len()
    }

    fn do_prepare(&self, transaction_id: &TransactionId) -> ParticipantResult {
        let mut open = self.open.lock();
        if open.contains_key(transaction_id) {
            // Repeated prepare keeps the original resource transaction.
            return Ok(true);
        }
        let tx = self.resource.begin()?;
        open.insert(transaction_id.clone(), tx);
        debug!("transactional adapter prepared transaction {transaction_id}");
        Ok(true)
    }

    fn do_commit(&self, transaction_id: &TransactionId) -> ParticipantResult {
        let mut open = self.open.lock();
        let tx = open.get_mut(transaction_id).ok_or_else(|| {
            DtxError::TransactionNotPrepared {
                transaction_id: transaction_id.clone(),
            }
        })?;
        // The handle is forgotten only once the resource transaction has
        // committed; after a failed commit it stays prepared so a later
        // rollback can still undo it.
        tx.commit()?;
        let events = tx.take_events();
        open.remove(transaction_id);
        drop(open);
        if !events.is_empty() {
            self.resource.publish_events(events).map_err(|err| {
                DtxError::EventCommitFailed {
                    transaction_id: transaction_id.clone(),
                    reason: err.to_string(),
                }
            })?;
        }
        debug!("transactional adapter committed transaction {transaction_id}");
        Ok(true)
    }

    fn do_rollback(&self, transaction_id: &TransactionId) -> ParticipantResult {
        let mut tx = self.open.lock().remove(transaction_id).ok_or_else(|| {
            DtxError::TransactionNotPrepared {
                transaction_id: transaction_id.clone(),
            }
        })?;
        tx.rollback()?;
        debug!("transactional adapter rolled back transaction {transaction_id}");
        Ok(true)
    }
}

impl<R: TransactionalResource> Participant for TransactionalAdapter<R> {
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
