//! Reconciliation worker
//!
//! Two cooperating loops joined by an unbounded channel:
//!
//! - the scanner wakes every `poll_interval` (first tick immediately), reads
//!   the awaiting set and queues each number not already queued;
//! - the processor asks the accrual service about each queued number and
//!   applies terminal verdicts to the ledger.
//!
//! A slow accrual service delays draining but never blocks the next scan.
//! Nothing is retried explicitly: an order without a verdict stays in the
//! awaiting set and is picked up again on a later cycle.

use observability::ReconcileMetrics;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::clients::accrual::AccrualClient;
use crate::error::Result;
use crate::store::traits::LedgerStore;
use crate::types::{OrderNumber, OrderStatus};

/// Worker timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
        }
    }
}

impl WorkerSettings {
    pub fn from_config(worker: &config::WorkerConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(worker.poll_interval_seconds.max(1)),
        }
    }
}

/// What happened to one looked-up order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessOutcome {
    /// Terminal verdict applied
    Settled(OrderStatus),
    /// Terminal verdict arrived but the order was already terminal
    AlreadySettled,
    /// Service knows the order but has not decided yet
    Pending,
    /// Service had nothing for us (non-200)
    NoVerdict,
    /// Lookup or settlement failed; retried next cycle
    Failed,
}

/// Background worker that applies accrual verdicts to the ledger
pub struct ReconciliationWorker {
    store: Arc<dyn LedgerStore>,
    accrual: Arc<dyn AccrualClient>,
    settings: WorkerSettings,
    in_flight: Mutex<HashSet<OrderNumber>>,
    metrics: ReconcileMetrics,
}

impl ReconciliationWorker {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        accrual: Arc<dyn AccrualClient>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            store,
            accrual,
            settings,
            in_flight: Mutex::new(HashSet::new()),
            metrics: ReconcileMetrics::new(),
        }
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            poll_interval_secs = self.settings.poll_interval.as_secs_f64(),
            "Starting reconciliation worker"
        );

        let (tx, rx) = mpsc::unbounded_channel();

        let scanner = tokio::spawn({
            let worker = self.clone();
            let shutdown = shutdown.clone();
            async move { worker.scan_loop(tx, shutdown).await }
        });
        let processor = tokio::spawn({
            let worker = self.clone();
            async move { worker.process_loop(rx, shutdown).await }
        });

        let (scan_result, process_result) = tokio::join!(scanner, processor);
        if let Err(e) = scan_result {
            error!(%e, "Scanner task failed");
        }
        if let Err(e) = process_result {
            error!(%e, "Processor task failed");
        }

        info!("Reconciliation worker stopped");
    }

    async fn scan_loop(&self, tx: mpsc::UnboundedSender<OrderNumber>, shutdown: CancellationToken) {
        let mut timer = tokio::time::interval(self.settings.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Scanner shutting down");
                    return;
                }
                _ = timer.tick() => {
                    if self.enqueue_awaiting(&tx).await.is_err() {
                        // Processor is gone
                        return;
                    }
                }
            }
        }
    }

    /// Queue every awaiting number that is not already queued
    ///
    /// Returns `Err(())` only when the processor side of the channel is closed.
    async fn enqueue_awaiting(&self, tx: &mpsc::UnboundedSender<OrderNumber>) -> std::result::Result<usize, ()> {
        self.metrics.cycle_started();

        let awaiting = match self.store.orders_awaiting_verdict().await {
            Ok(numbers) => numbers,
            Err(e) => {
                self.metrics.scan_failed();
                warn!(%e, "Failed to read orders awaiting a verdict");
                return Ok(0);
            }
        };

        let mut queued = 0;
        for number in awaiting {
            if !self.in_flight.lock().insert(number.clone()) {
                continue;
            }
            if tx.send(number).is_err() {
                return Err(());
            }
            queued += 1;
        }

        self.metrics.set_queued(queued);
        if queued > 0 {
            debug!(queued, "Queued orders for accrual lookup");
        }
        Ok(queued)
    }

    async fn process_loop(&self, mut rx: mpsc::UnboundedReceiver<OrderNumber>, shutdown: CancellationToken) {
        loop {
            let number = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = rx.recv() => match next {
                    Some(number) => number,
                    None => break,
                },
            };

            // A lookup already started runs to completion
            self.process(&number).await;
            self.in_flight.lock().remove(&number);
        }
        debug!("Processor shutting down");
    }

    /// Look up one order and apply a terminal verdict
    #[instrument(skip(self, number), fields(order = %number))]
    pub async fn process(&self, number: &OrderNumber) -> ProcessOutcome {
        let verdict = match self.accrual.lookup(number).await {
            Ok(Some(verdict)) => verdict,
            Ok(None) => return ProcessOutcome::NoVerdict,
            Err(e) => {
                self.metrics.lookup_failed();
                warn!(%e, "Accrual lookup failed");
                return ProcessOutcome::Failed;
            }
        };

        if verdict.order != number.as_str() {
            warn!(echoed = %verdict.order, "Accrual service echoed a different order number");
        }

        let Some((status, accrual)) = verdict.settlement() else {
            debug!(status = %verdict.status, "Verdict not final yet");
            return ProcessOutcome::Pending;
        };

        match self.store.settle_order(number, status, accrual).await {
            Ok(true) => {
                self.metrics.settled(status.as_str());
                info!(%status, accrual, "Order settled");
                ProcessOutcome::Settled(status)
            }
            Ok(false) => {
                debug!("Order already settled");
                ProcessOutcome::AlreadySettled
            }
            Err(e) => {
                warn!(%e, "Failed to settle order");
                ProcessOutcome::Failed
            }
        }
    }

    /// One scan plus sequential processing of everything found
    ///
    /// Returns how many orders were settled.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<usize> {
        self.metrics.cycle_started();
        let awaiting = self.store.orders_awaiting_verdict().await?;
        self.metrics.set_queued(awaiting.len());

        let mut settled = 0;
        for number in &awaiting {
            if let ProcessOutcome::Settled(_) = self.process(number).await {
                settled += 1;
            }
        }

        debug!(awaiting = awaiting.len(), settled, "Reconciliation cycle complete");
        Ok(settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::accrual::{AccrualStatus, AccrualVerdict, MockAccrualClient};
    use crate::manager::{create_in_memory, OrderManager};
    use crate::test_support::number;
    use crate::types::AccountId;
    use async_trait::async_trait;

    async fn setup(client: Arc<MockAccrualClient>) -> (OrderManager, ReconciliationWorker, AccountId) {
        let manager = create_in_memory();
        let account = manager.register_account("alice", "pw").await.unwrap();
        let worker = ReconciliationWorker::new(manager.store(), client, WorkerSettings::default());
        (manager, worker, account)
    }

    #[tokio::test]
    async fn test_processed_verdict_credits_balance() {
        let client = Arc::new(MockAccrualClient::new());
        let (manager, worker, alice) = setup(client.clone()).await;
        let n = number("79927398713");

        manager.register_credit(alice, &n).await.unwrap();
        assert_eq!(manager.list_credits(alice).await.unwrap()[0].status, OrderStatus::New);

        client.set_verdict("79927398713", AccrualStatus::Processed, Some(500.0));
        assert_eq!(worker.run_cycle().await.unwrap(), 1);

        assert_eq!(manager.balance(alice).await.unwrap().current, 500.0);
        assert!(manager.store().orders_awaiting_verdict().await.unwrap().is_empty());
        let credits = manager.list_credits(alice).await.unwrap();
        assert_eq!(credits[0].status, OrderStatus::Processed);
        assert_eq!(credits[0].accrual, Some(500.0));
    }

    #[tokio::test]
    async fn test_invalid_verdict_settles_with_zero() {
        let client = Arc::new(MockAccrualClient::new());
        let (manager, worker, alice) = setup(client.clone()).await;
        manager.register_credit(alice, &number("12345678903")).await.unwrap();

        client.set_verdict("12345678903", AccrualStatus::Invalid, Some(99.0));
        assert_eq!(
            worker.process(&number("12345678903")).await,
            ProcessOutcome::Settled(OrderStatus::Invalid)
        );
        assert_eq!(manager.balance(alice).await.unwrap().current, 0.0);
        assert!(manager.store().orders_awaiting_verdict().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_final_and_failures_are_revisited() {
        let client = Arc::new(MockAccrualClient::new());
        let (manager, worker, alice) = setup(client.clone()).await;
        let n = number("79927398713");
        manager.register_credit(alice, &n).await.unwrap();

        // No verdict yet
        assert_eq!(worker.process(&n).await, ProcessOutcome::NoVerdict);
        // Known but undecided
        client.set_verdict("79927398713", AccrualStatus::Processing, None);
        assert_eq!(worker.process(&n).await, ProcessOutcome::Pending);
        client.set_verdict("79927398713", AccrualStatus::Registered, None);
        assert_eq!(worker.run_cycle().await.unwrap(), 0);
        // Lookup failure
        client.set_failure("79927398713", "connection reset");
        assert_eq!(worker.process(&n).await, ProcessOutcome::Failed);

        assert_eq!(manager.store().orders_awaiting_verdict().await.unwrap(), vec![n.clone()]);
        assert_eq!(manager.balance(alice).await.unwrap().current, 0.0);

        client.set_verdict("79927398713", AccrualStatus::Processed, Some(42.5));
        assert_eq!(worker.run_cycle().await.unwrap(), 1);
        assert_eq!(manager.balance(alice).await.unwrap().current, 42.5);
        assert_eq!(client.calls(), 5);
    }

    #[tokio::test]
    async fn test_repeated_verdict_credits_once() {
        let client = Arc::new(MockAccrualClient::new());
        let (manager, worker, alice) = setup(client.clone()).await;
        let n = number("79927398713");
        manager.register_credit(alice, &n).await.unwrap();
        client.set_verdict("79927398713", AccrualStatus::Processed, Some(10.0));

        assert_eq!(worker.process(&n).await, ProcessOutcome::Settled(OrderStatus::Processed));
        assert_eq!(worker.process(&n).await, ProcessOutcome::AlreadySettled);
        assert_eq!(manager.balance(alice).await.unwrap().current, 10.0);
    }

    #[tokio::test]
    async fn test_negative_accrual_rejected() {
        let client = Arc::new(MockAccrualClient::new());
        let (manager, worker, alice) = setup(client.clone()).await;
        let n = number("79927398713");
        manager.register_credit(alice, &n).await.unwrap();
        client.set_verdict("79927398713", AccrualStatus::Processed, Some(-1.0));

        assert_eq!(worker.process(&n).await, ProcessOutcome::Failed);
        assert_eq!(manager.balance(alice).await.unwrap().current, 0.0);
        assert_eq!(manager.store().orders_awaiting_verdict().await.unwrap().len(), 1);
    }

    struct EchoMismatch;

    #[async_trait]
    impl AccrualClient for EchoMismatch {
        async fn lookup(&self, _number: &OrderNumber) -> Result<Option<AccrualVerdict>> {
            Ok(Some(AccrualVerdict {
                order: "0".into(),
                status: AccrualStatus::Processed,
                accrual: Some(7.0),
            }))
        }
    }

    #[tokio::test]
    async fn test_settles_requested_number_not_echoed() {
        let manager = create_in_memory();
        let alice = manager.register_account("alice", "pw").await.unwrap();
        let n = number("79927398713");
        manager.register_credit(alice, &n).await.unwrap();

        let worker = ReconciliationWorker::new(manager.store(), Arc::new(EchoMismatch), WorkerSettings::default());
        assert_eq!(worker.process(&n).await, ProcessOutcome::Settled(OrderStatus::Processed));
        assert_eq!(manager.balance(alice).await.unwrap().current, 7.0);
    }

    #[tokio::test]
    async fn test_in_flight_numbers_are_not_requeued() {
        let client = Arc::new(MockAccrualClient::new());
        let (manager, worker, alice) = setup(client).await;
        manager.register_credit(alice, &number("79927398713")).await.unwrap();
        manager.register_credit(alice, &number("12345678903")).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(worker.enqueue_awaiting(&tx).await, Ok(2));
        assert_eq!(worker.enqueue_awaiting(&tx).await, Ok(0));

        assert_eq!(rx.recv().await.unwrap().as_str(), "79927398713");
        assert_eq!(rx.recv().await.unwrap().as_str(), "12345678903");
        assert!(rx.try_recv().is_err());

        drop(rx);
        worker.in_flight.lock().clear();
        assert_eq!(worker.enqueue_awaiting(&tx).await, Err(()));
    }

    struct SlowClient {
        delay: Duration,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl AccrualClient for SlowClient {
        async fn lookup(&self, number: &OrderNumber) -> Result<Option<AccrualVerdict>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Some(AccrualVerdict {
                order: number.to_string(),
                status: AccrualStatus::Processed,
                accrual: Some(50.0),
            }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_lets_in_flight_lookup_finish() {
        let manager = create_in_memory();
        let alice = manager.register_account("alice", "pw").await.unwrap();
        manager.register_credit(alice, &number("79927398713")).await.unwrap();
        manager.register_credit(alice, &number("12345678903")).await.unwrap();

        let client = Arc::new(SlowClient {
            delay: Duration::from_secs(2),
            calls: Default::default(),
        });
        let worker = Arc::new(ReconciliationWorker::new(
            manager.store(),
            client.clone(),
            WorkerSettings::default(),
        ));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        // First lookup is now sleeping inside the client
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker should stop after the lookup completes")
            .unwrap();

        assert_eq!(manager.balance(alice).await.unwrap().current, 50.0);
        // The second queued number is not looked up after cancellation
        assert_eq!(client.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(manager.store().orders_awaiting_verdict().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_until_cancelled() {
        let client = Arc::new(MockAccrualClient::new());
        let manager = create_in_memory();
        let alice = manager.register_account("alice", "pw").await.unwrap();
        manager.register_credit(alice, &number("79927398713")).await.unwrap();
        manager.register_credit(alice, &number("12345678903")).await.unwrap();
        client.set_verdict("79927398713", AccrualStatus::Processed, Some(500.0));

        let settings = WorkerSettings {
            poll_interval: Duration::from_secs(10),
        };
        let worker = Arc::new(ReconciliationWorker::new(manager.store(), client.clone(), settings));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.balance(alice).await.unwrap().current, 500.0);

        client.set_verdict("12345678903", AccrualStatus::Processed, Some(25.0));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(manager.balance(alice).await.unwrap().current, 525.0);
        assert!(manager.store().orders_awaiting_verdict().await.unwrap().is_empty());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should stop promptly")
            .unwrap();
    }

    #[test]
    fn test_settings_from_config() {
        let settings = WorkerSettings::from_config(&config::WorkerConfig {
            enabled: true,
            poll_interval_seconds: 3,
        });
        assert_eq!(settings.poll_interval, Duration::from_secs(3));
    }
}
