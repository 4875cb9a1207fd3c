use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{info, warn};

use invoicer_events::{ChangeBatch, ChangeFeed, Subscription};
use invoicer_invoicing::DocumentRenderer;

use crate::artifact_store::ArtifactStore;
use crate::change_dispatcher::ChangeDispatcher;
use crate::pointer_index::PointerIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub max_batch_size: usize,
    /// How long to keep filling a batch once its first event arrived.
    pub batch_window: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            batch_window: Duration::from_millis(250),
        }
    }
}

/// Running totals since the worker started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub batches: u64,
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    batches: AtomicU64,
    processed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            batches: self.batches.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Handle to control and join the background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl WorkerHandle {
    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot()
    }

    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// A batch already being dispatched is finished first.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Pulls change events off the feed, groups them into batches and drives
/// the dispatcher on the given runtime.
///
/// Runs on its own OS thread because the feed subscription is a blocking
/// receiver.
#[derive(Debug)]
pub struct ChangeFeedWorker;

impl ChangeFeedWorker {
    /// Subscribe to `feed` and start the worker thread.
    ///
    /// The subscription is taken before this returns, so every event published
    /// afterwards is seen by the worker.
    pub fn spawn<F, R, A, P>(
        name: &'static str,
        feed: &F,
        dispatcher: ChangeDispatcher<R, A, P>,
        runtime: Handle,
        config: WorkerConfig,
    ) -> std::io::Result<WorkerHandle>
    where
        F: ChangeFeed + ?Sized,
        R: DocumentRenderer + 'static,
        A: ArtifactStore + 'static,
        P: PointerIndex + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = feed.subscribe();
        let counters = Arc::new(Counters::default());

        let worker_counters = Arc::clone(&counters);
        let join = thread::Builder::new().name(name.to_string()).spawn(move || {
            worker_loop(
                name,
                sub,
                shutdown_rx,
                &dispatcher,
                &runtime,
                config,
                &worker_counters,
            )
        })?;

        info!(worker = name, "change feed worker started");
        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            counters,
        })
    }
}

fn worker_loop<R, A, P>(
    name: &'static str,
    sub: Subscription,
    shutdown_rx: mpsc::Receiver<()>,
    dispatcher: &ChangeDispatcher<R, A, P>,
    runtime: &Handle,
    config: WorkerConfig,
    counters: &Counters,
) where
    R: DocumentRenderer + 'static,
    A: ArtifactStore + 'static,
    P: PointerIndex + 'static,
{
    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let events = match sub.recv_batch(config.max_batch_size, config.batch_window) {
            Ok(events) => events,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let report = runtime.block_on(dispatcher.dispatch_batch(ChangeBatch::new(events)));

        counters.batches.fetch_add(1, Ordering::Relaxed);
        counters.processed.fetch_add(report.processed() as u64, Ordering::Relaxed);
        counters.skipped.fetch_add(report.skipped() as u64, Ordering::Relaxed);
        counters.failed.fetch_add(report.failed() as u64, Ordering::Relaxed);

        let failed = report.failed_event_ids();
        if !failed.is_empty() {
            warn!(worker = name, failed = ?failed, "batch finished with failed records");
        }
    }

    info!(worker = name, "change feed worker stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use invoicer_core::{Amount, CustomerId, InvoiceId};
    use invoicer_events::{ChangeEvent, InMemoryChangeFeed};
    use invoicer_invoicing::{Invoice, PdfRenderer};

    use super::*;
    use crate::artifact_store::{InMemoryArtifactStore, UrlSigner};
    use crate::change_dispatcher::DispatcherConfig;
    use crate::pointer_index::InMemoryPointerIndex;

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn worker_processes_published_inserts() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let feed = Arc::new(InMemoryChangeFeed::new());
        let store = Arc::new(InMemoryArtifactStore::new(UrlSigner::new(b"w", "http://localhost")));
        let index = Arc::new(InMemoryPointerIndex::new());
        let dispatcher = ChangeDispatcher::new(
            PdfRenderer::new(),
            store.clone(),
            index.clone(),
            DispatcherConfig::default(),
        );

        let handle = ChangeFeedWorker::spawn(
            "test-worker",
            feed.as_ref(),
            dispatcher,
            runtime.handle().clone(),
            WorkerConfig {
                max_batch_size: 10,
                batch_window: Duration::from_millis(20),
            },
        )
        .unwrap();

        for i in 1..=3 {
            let invoice = Invoice {
                invoice_id: InvoiceId::new(format!("INV{i}")).unwrap(),
                customer_id: CustomerId::new("CUST1").unwrap(),
                invoice_date: String::new(),
                product_list: vec![],
                total_amount: Amount::from_minor_units(i),
            };
            feed.publish(ChangeEvent::insert(invoice.to_image())).unwrap();
        }
        feed.publish(ChangeEvent::remove()).unwrap();

        assert!(wait_until(|| handle.stats().processed == 3 && handle.stats().skipped == 1));
        assert_eq!(store.len(), 3);

        let lookup = runtime.block_on(index.get(&InvoiceId::new("INV2").unwrap())).unwrap();
        assert!(lookup.is_found());

        handle.shutdown();
    }

    #[test]
    fn shutdown_stops_an_idle_worker() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let feed = InMemoryChangeFeed::new();
        let dispatcher = ChangeDispatcher::new(
            PdfRenderer::new(),
            InMemoryArtifactStore::new(UrlSigner::new(b"w", "http://localhost")),
            InMemoryPointerIndex::new(),
            DispatcherConfig::default(),
        );

        let handle = ChangeFeedWorker::spawn(
            "idle-worker",
            &feed,
            dispatcher,
            runtime.handle().clone(),
            WorkerConfig::default(),
        )
        .unwrap();
        assert_eq!(feed.subscriber_count(), 1);

        handle.shutdown();
    }
}
