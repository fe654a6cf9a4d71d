//! Fan-out tests with participants that complete in randomized order.
//!
//! Each phase call resolves on a background thread after a random delay, so
//! participants genuinely finish in a different order on every run. The
//! final membership of the prepared/committed/rolled-back sets must be
//! independent of that order.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use futures::FutureExt;
use futures::channel::oneshot;
use futures::executor::block_on;
use futures::future::BoxFuture;
use rand::Rng;

use dtx::{
    Participant, ParticipantError, ParticipantResult, TransactionCoordinator, TransactionId,
    TxPhase,
};

/// A participant whose phase calls resolve on a background thread after a
/// randomized delay.
struct LatencyParticipant {
    fail_prepare: bool,
    max_delay_ms: u64,
    prepare_calls: AtomicUsize,
    rollback_calls: AtomicUsize,
}

impl LatencyParticipant {
    fn new(fail_prepare: bool, max_delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            fail_prepare,
            max_delay_ms,
            prepare_calls: AtomicUsize::new(0),
            rollback_calls: AtomicUsize::new(0),
        })
    }

    fn delayed(&self, outcome: ParticipantResult) -> BoxFuture<'_, ParticipantResult> {
        let delay = Duration::from_millis(rand::rng().random_range(1..=self.max_delay_ms));
        let (tx, rx) = oneshot::channel();
        thread::spawn(move || {
            thread::sleep(delay);
            let _ = tx.send(());
        });
        async move {
            let _ = rx.await;
            outcome
        }
        .boxed()
    }
}

impl Participant for LatencyParticipant {
    fn prepare(&self, _transaction_id: TransactionId) -> BoxFuture<'_, ParticipantResult> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = if self.fail_prepare {
            Err(ParticipantError::Other("delayed prepare failure".to_string()))
        } else {
            Ok(true)
        };
        self.delayed(outcome)
    }

    fn commit(&self, _transaction_id: TransactionId) -> BoxFuture<'_, ParticipantResult> {
        self.delayed(Ok(true))
    }

    fn rollback(&self, _transaction_id: TransactionId) -> BoxFuture<'_, ParticipantResult> {
        self.rollback_calls.fetch_add(1, Ordering::SeqCst);
        self.delayed(Ok(true))
    }
}

#[test]
fn completion_order_does_not_change_a_successful_outcome() {
    for _ in 0..5 {
        block_on(async {
            let coordinator = TransactionCoordinator::new("coord-1");
            for i in 0..6 {
                coordinator
                    .register_participant(&format!("r-{i}"), LatencyParticipant::new(false, 20))
                    .await
                    .unwrap();
            }

            coordinator.commit().await.unwrap();

            let status = coordinator.transaction_status().await;
            assert_eq!(status.phase, TxPhase::Committed);
            assert_eq!(status.prepared_count, 6);
            assert_eq!(status.committed_count, 6);
            assert_eq!(status.rolled_back_count, 0);
        });
    }
}

#[test]
fn completion_order_does_not_change_a_failed_outcome() {
    for _ in 0..5 {
        block_on(async {
            let coordinator = TransactionCoordinator::new("coord-1");
            let mut participants = Vec::new();
            for i in 0..6 {
                let participant = LatencyParticipant::new(i == 2, 20);
                coordinator
                    .register_participant(&format!("r-{i}"), participant.clone())
                    .await
                    .unwrap();
                participants.push(participant);
            }

            let err = coordinator.commit().await.unwrap_err();
            assert_eq!(err.kind(), "PREPARE_FAILED");

            // Whatever order the calls finished in, exactly the five that
            // prepared were rolled back.
            let status = coordinator.transaction_status().await;
            assert_eq!(status.phase, TxPhase::Failed);
            assert_eq!(status.prepared_count, 5);
            assert_eq!(status.committed_count, 0);
            assert_eq!(status.rolled_back_count, 5);
            for (i, participant) in participants.iter().enumerate() {
                let expected = if i == 2 { 0 } else { 1 };
                assert_eq!(participant.rollback_calls.load(Ordering::SeqCst), expected);
            }
        });
    }
}

#[test]
fn a_slow_participant_is_never_cancelled_by_a_failing_sibling() {
    block_on(async {
        let coordinator = TransactionCoordinator::new("coord-1");
        let slow = LatencyParticipant::new(false, 60);
        let failing = LatencyParticipant::new(true, 2);
        coordinator
            .register_participant("slow", slow.clone())
            .await
            .unwrap();
        coordinator
            .register_participant("failing", failing.clone())
            .await
            .unwrap();

        let err = coordinator.commit().await.unwrap_err();
        assert_eq!(err.kind(), "PREPARE_FAILED");

        // The slow participant's prepare ran to completion and, having
        // prepared, it was rolled back.
        assert_eq!(slow.prepare_calls.load(Ordering::SeqCst), 1);
        assert_eq!(slow.rollback_calls.load(Ordering::SeqCst), 1);
        assert_eq!(failing.rollback_calls.load(Ordering::SeqCst), 0);
        let status = coordinator.transaction_status().await;
        assert_eq!(status.prepared_count, 1);
        assert_eq!(status.rolled_back_count, 1);
    });
}
