//! Download orchestrator: owns the per-pack download state and drives pack
//! workers through the progress channel.
//!
//! # Design
//! - One tagged [`DownloadState`] per pack behind a single `RwLock`.
//! - The progress subscription is opened before the worker is spawned, and a
//!   single pump task per subscription applies events in arrival order.
//! - Reconciliation drops bookkeeping for packs that left the visible page but
//!   leaves their workers running. Each worker invocation carries a ticket, so
//!   its completion only lands on the entry that started it.
//! - A pack whose forgotten worker is still running is re-attached on the next
//!   start instead of spawning a second worker.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use packdeck_core::{
    CatalogPage, DownloadError, DownloadResult, DownloadStartError, DownloadState, Pack,
    PackDownload, PackId, PackWorker, PageObserver, ProgressEvent, error_chain,
};
use packdeck_events::{Event, EventBus, ProgressChannel, SubscriptionId};
use packdeck_telemetry::{DownloadOutcome, Metrics};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Final result of one worker invocation as seen by handle holders.
pub type WorkerOutcome = Result<PathBuf, Arc<DownloadError>>;

type OutcomeSlot = watch::Receiver<Option<WorkerOutcome>>;

/// Coordinates pack downloads and tracks their state.
pub struct DownloadOrchestrator {
    worker: Arc<dyn PackWorker>,
    channel: ProgressChannel,
    events: EventBus,
    metrics: Metrics,
    book: RwLock<Ledger>,
    next_ticket: AtomicU64,
}

#[derive(Default)]
struct Ledger {
    entries: HashMap<PackId, Entry>,
    detached: HashMap<PackId, Detached>,
}

struct Entry {
    state: DownloadState,
    attachment: Option<Attachment>,
}

struct Attachment {
    ticket: u64,
    subscription: SubscriptionId,
    pump: Option<JoinHandle<()>>,
    outcome: OutcomeSlot,
}

// Worker still running after its entry was forgotten.
struct Detached {
    ticket: u64,
    outcome: OutcomeSlot,
}

impl DownloadOrchestrator {
    /// Orchestrator running `worker` and reporting through `channel` and `events`.
    #[must_use]
    pub fn new(
        worker: Arc<dyn PackWorker>,
        channel: ProgressChannel,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        Self {
            worker,
            channel,
            events,
            metrics,
            book: RwLock::new(Ledger::default()),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Start downloading `pack_id` from `source_url`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadStartError`] when the pack is already downloading or
    /// was downloaded earlier in this session.
    pub async fn start_download(
        self: &Arc<Self>,
        pack_id: PackId,
        source_url: impl Into<String>,
    ) -> Result<DownloadHandle, DownloadStartError> {
        self.start(PackDownload {
            pack_id,
            name: String::new(),
            source_url: source_url.into(),
        })
        .await
    }

    /// Start downloading a catalog pack.
    ///
    /// # Errors
    ///
    /// See [`Self::start_download`].
    pub async fn start_pack(
        self: &Arc<Self>,
        pack: &Pack,
    ) -> Result<DownloadHandle, DownloadStartError> {
        self.start(PackDownload {
            pack_id: pack.id,
            name: pack.name.clone(),
            source_url: pack.download.clone(),
        })
        .await
    }

    async fn start(
        self: &Arc<Self>,
        request: PackDownload,
    ) -> Result<DownloadHandle, DownloadStartError> {
        let pack_id = request.pack_id;
        let mut book = self.book.write().await;
        if let Some(entry) = book.entries.get(&pack_id) {
            match entry.state {
                DownloadState::Active { .. } => {
                    return Err(DownloadStartError::AlreadyInProgress { pack_id });
                }
                DownloadState::Completed => {
                    return Err(DownloadStartError::AlreadyCompleted { pack_id });
                }
                DownloadState::Idle | DownloadState::Failed { .. } => {}
            }
        }

        // Subscribe before any worker can emit.
        let subscription = self.channel.subscribe(pack_id);
        let subscription_id = subscription.id();
        let pump = self.spawn_pump(subscription);

        let (ticket, outcome, resumed) = if let Some(detached) = book.detached.remove(&pack_id) {
            (detached.ticket, detached.outcome, true)
        } else {
            let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
            let (sender, receiver) = watch::channel(None);
            self.spawn_worker(request.clone(), ticket, sender);
            (ticket, receiver, false)
        };

        book.entries.insert(
            pack_id,
            Entry {
                state: DownloadState::started(),
                attachment: Some(Attachment {
                    ticket,
                    subscription: subscription_id,
                    pump: Some(pump),
                    outcome: outcome.clone(),
                }),
            },
        );
        // Published under the lock so no progress event can precede it.
        self.metrics.inc_download_started();
        self.publish(Event::DownloadStarted {
            pack_id,
            source_url: request.source_url.clone(),
        });
        drop(book);

        if resumed {
            info!(pack_id, ticket, "re-attached to running pack download");
        } else {
            info!(pack_id, ticket, url = %request.source_url, "pack download started");
        }

        Ok(DownloadHandle { pack_id, outcome })
    }

    /// Overwrite the stage and byte counts of an active download.
    ///
    /// Returns whether the event was applied; events for packs that are not
    /// active are ignored.
    pub async fn apply_progress(&self, pack_id: PackId, event: ProgressEvent) -> bool {
        self.apply(pack_id, None, event).await
    }

    async fn apply(
        &self,
        pack_id: PackId,
        from: Option<SubscriptionId>,
        event: ProgressEvent,
    ) -> bool {
        let mut book = self.book.write().await;
        let Some(entry) = book.entries.get_mut(&pack_id) else {
            return false;
        };
        if let Some(subscription) = from
            && entry.attachment.as_ref().map(|a| a.subscription) != Some(subscription)
        {
            return false;
        }
        if !entry.state.is_active() {
            return false;
        }
        entry.state = DownloadState::Active {
            stage: event.stage,
            bytes_downloaded: event.bytes_downloaded,
            bytes_total: event.bytes_total,
        };
        self.publish(Event::DownloadProgress {
            pack_id,
            stage: event.stage,
            bytes_downloaded: event.bytes_downloaded,
            bytes_total: event.bytes_total,
        });
        drop(book);
        true
    }

    /// Drop bookkeeping for active downloads whose pack is not in `visible`.
    ///
    /// Workers keep running; their completion no longer touches the state
    /// map. Returns the ids that were forgotten, in ascending order.
    pub async fn reconcile(&self, visible: &HashSet<PackId>) -> Vec<PackId> {
        let mut forgotten = Vec::new();
        {
            let mut book = self.book.write().await;
            let stale: Vec<PackId> = book
                .entries
                .iter()
                .filter(|(id, entry)| entry.state.is_active() && !visible.contains(id))
                .map(|(id, _)| *id)
                .collect();
            for pack_id in stale {
                let Some(entry) = book.entries.remove(&pack_id) else {
                    continue;
                };
                if let Some(attachment) = entry.attachment {
                    self.channel.unsubscribe(attachment.subscription);
                    book.detached.insert(
                        pack_id,
                        Detached {
                            ticket: attachment.ticket,
                            outcome: attachment.outcome,
                        },
                    );
                }
                forgotten.push(pack_id);
            }
        }
        forgotten.sort_unstable();

        for pack_id in &forgotten {
            self.metrics.inc_download_finished(DownloadOutcome::Forgotten);
            self.publish(Event::DownloadForgotten { pack_id: *pack_id });
            debug!(pack_id, "forgot off-page download");
        }
        forgotten
    }

    /// Current state of `pack_id`; [`DownloadState::Idle`] when unknown.
    pub async fn state(&self, pack_id: PackId) -> DownloadState {
        self.book
            .read()
            .await
            .entries
            .get(&pack_id)
            .map(|entry| entry.state.clone())
            .unwrap_or_default()
    }

    /// States of every tracked pack, ordered by id.
    pub async fn snapshot(&self) -> BTreeMap<PackId, DownloadState> {
        self.book
            .read()
            .await
            .entries
            .iter()
            .map(|(id, entry)| (*id, entry.state.clone()))
            .collect()
    }

    /// Forget a finished download so it can be started again.
    ///
    /// Active downloads are left untouched; returns whether an entry was
    /// removed.
    pub async fn clear(&self, pack_id: PackId) -> bool {
        let mut book = self.book.write().await;
        match book.entries.get(&pack_id) {
            Some(entry) if !entry.state.is_active() => {
                book.entries.remove(&pack_id);
                true
            }
            _ => false,
        }
    }

    fn spawn_pump(
        self: &Arc<Self>,
        mut subscription: packdeck_events::ProgressSubscription,
    ) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let id = subscription.id();
            let pack_id = subscription.pack_id();
            while let Some(event) = subscription.next().await {
                orchestrator.apply(pack_id, Some(id), event).await;
            }
        })
    }

    fn spawn_worker(
        self: &Arc<Self>,
        request: PackDownload,
        ticket: u64,
        outcome: watch::Sender<Option<WorkerOutcome>>,
    ) {
        let orchestrator = Arc::clone(self);
        let worker = Arc::clone(&self.worker);
        let publisher = self.channel.publisher(request.pack_id);
        tokio::spawn(async move {
            let pack_id = request.pack_id;
            let run = tokio::spawn(async move { worker.download_pack(request, publisher).await });
            let result = match run.await {
                Ok(result) => result,
                Err(err) => Err(DownloadError::Worker {
                    pack_id,
                    operation: "join",
                    source: Box::new(err),
                }),
            };
            let result = orchestrator.finish(pack_id, ticket, result).await;
            outcome.send_replace(Some(result));
        });
    }

    async fn finish(
        &self,
        pack_id: PackId,
        ticket: u64,
        result: DownloadResult<PathBuf>,
    ) -> WorkerOutcome {
        // Close the subscription and let the pump drain what was already
        // published so progress lands before the terminal state.
        let pump = {
            let mut book = self.book.write().await;
            book.entries
                .get_mut(&pack_id)
                .and_then(|entry| entry.attachment.as_mut())
                .filter(|attachment| attachment.ticket == ticket)
                .and_then(|attachment| {
                    self.channel.unsubscribe(attachment.subscription);
                    attachment.pump.take()
                })
        };
        if let Some(pump) = pump
            && let Err(err) = pump.await
        {
            warn!(pack_id, error = %err, "progress pump ended abnormally");
        }

        let live = {
            let mut book = self.book.write().await;
            let owned = book
                .entries
                .get(&pack_id)
                .and_then(|entry| entry.attachment.as_ref())
                .is_some_and(|attachment| attachment.ticket == ticket);
            if owned {
                if let Some(attachment) = book
                    .entries
                    .get_mut(&pack_id)
                    .and_then(|entry| entry.attachment.take())
                {
                    self.channel.unsubscribe(attachment.subscription);
                }
                if result.is_ok() {
                    if let Some(entry) = book.entries.get_mut(&pack_id) {
                        entry.state = DownloadState::Completed;
                    }
                } else {
                    book.entries.remove(&pack_id);
                }
            } else if book
                .detached
                .get(&pack_id)
                .is_some_and(|detached| detached.ticket == ticket)
            {
                book.detached.remove(&pack_id);
            }
            owned
        };

        match &result {
            Ok(path) if live => {
                self.metrics.inc_download_finished(DownloadOutcome::Completed);
                self.publish(Event::DownloadCompleted {
                    pack_id,
                    archive_path: path.display().to_string(),
                });
                info!(pack_id, path = %path.display(), "pack download completed");
            }
            Err(err) if live => {
                let message = error_chain(err);
                self.metrics.inc_download_finished(DownloadOutcome::Failed);
                self.publish(Event::DownloadFailed {
                    pack_id,
                    message: message.clone(),
                });
                warn!(pack_id, error = %message, "pack download failed");
            }
            _ => debug!(pack_id, ticket, "forgotten download finished"),
        }

        result.map_err(Arc::new)
    }

    fn publish(&self, event: Event) {
        self.metrics.inc_event(event.kind());
        self.events.publish(event);
    }
}

#[async_trait]
impl PageObserver for DownloadOrchestrator {
    async fn page_loaded(&self, page: &CatalogPage) {
        self.reconcile(&page.visible_ids()).await;
    }
}

/// Waitable handle on one worker invocation.
#[derive(Debug, Clone)]
pub struct DownloadHandle {
    pack_id: PackId,
    outcome: OutcomeSlot,
}

impl DownloadHandle {
    /// Pack the handle refers to.
    #[must_use]
    pub const fn pack_id(&self) -> PackId {
        self.pack_id
    }

    /// Outcome, if the worker already finished.
    #[must_use]
    pub fn try_outcome(&self) -> Option<WorkerOutcome> {
        self.outcome.borrow().clone()
    }

    /// Wait for the worker to finish.
    ///
    /// # Errors
    ///
    /// Returns the worker's error, or [`DownloadError::Aborted`] when the
    /// worker task went away without reporting.
    pub async fn wait(mut self) -> WorkerOutcome {
        let pack_id = self.pack_id;
        match self.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome)
                .clone()
                .unwrap_or_else(|| Err(Arc::new(DownloadError::Aborted { pack_id }))),
            Err(_) => Err(Arc::new(DownloadError::Aborted { pack_id })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packdeck_core::DownloadStage;
    use packdeck_events::ProgressPublisher;
    use std::collections::HashMap as Map;
    use std::io;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::{mpsc, oneshot};
    use tokio::time::{Duration, timeout};

    /// Worker that blocks until the test releases it, reporting each call.
    #[derive(Default)]
    struct ScriptedWorker {
        calls: AtomicUsize,
        gates: Mutex<Map<PackId, oneshot::Receiver<Result<(), String>>>>,
        publishers: Mutex<Map<PackId, ProgressPublisher>>,
        entered: Mutex<Option<mpsc::UnboundedSender<PackId>>>,
    }

    impl ScriptedWorker {
        fn gate(&self, pack_id: PackId) -> oneshot::Sender<Result<(), String>> {
            let (sender, receiver) = oneshot::channel();
            self.gates
                .lock()
                .expect("gates")
                .insert(pack_id, receiver);
            sender
        }

        fn notify(&self) -> mpsc::UnboundedReceiver<PackId> {
            let (sender, receiver) = mpsc::unbounded_channel();
            *self.entered.lock().expect("entered") = Some(sender);
            receiver
        }

        fn publisher(&self, pack_id: PackId) -> ProgressPublisher {
            self.publishers
                .lock()
                .expect("publishers")
                .get(&pack_id)
                .cloned()
                .expect("worker entered")
        }
    }

    #[async_trait]
    impl PackWorker for ScriptedWorker {
        async fn download_pack(
            &self,
            request: PackDownload,
            progress: ProgressPublisher,
        ) -> DownloadResult<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gates.lock().expect("gates").remove(&request.pack_id);
            self.publishers
                .lock()
                .expect("publishers")
                .insert(request.pack_id, progress);
            if let Some(sender) = self.entered.lock().expect("entered").as_ref() {
                let _ = sender.send(request.pack_id);
            }
            let verdict = match gate {
                Some(gate) => gate.await.unwrap_or(Ok(())),
                None => Ok(()),
            };
            match verdict {
                Ok(()) => Ok(PathBuf::from(format!("/tmp/{}.zip", request.pack_id))),
                Err(message) => Err(DownloadError::Worker {
                    pack_id: request.pack_id,
                    operation: "extract",
                    source: Box::new(io::Error::other(message)),
                }),
            }
        }
    }

    fn orchestrator(worker: &Arc<ScriptedWorker>) -> (Arc<DownloadOrchestrator>, EventBus) {
        let events = EventBus::new();
        let metrics = Metrics::new().expect("metrics");
        let worker: Arc<dyn PackWorker> = worker.clone();
        let orchestrator = Arc::new(DownloadOrchestrator::new(
            worker,
            ProgressChannel::new(),
            events.clone(),
            metrics,
        ));
        (orchestrator, events)
    }

    async fn wait_until<F>(orchestrator: &DownloadOrchestrator, pack_id: PackId, check: F)
    where
        F: Fn(&DownloadState) -> bool,
    {
        timeout(Duration::from_secs(5), async {
            loop {
                if check(&orchestrator.state(pack_id).await) {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("state reached");
    }

    #[tokio::test]
    async fn second_start_is_rejected_with_single_worker_call() -> anyhow::Result<()> {
        let worker = Arc::new(ScriptedWorker::default());
        let release = worker.gate(42);
        let mut entered = worker.notify();
        let (orchestrator, _) = orchestrator(&worker);

        let handle = orchestrator.start_download(42, "https://files/42.zip").await?;
        assert_eq!(orchestrator.state(42).await, DownloadState::started());
        let second = orchestrator.start_download(42, "https://files/42.zip").await;
        assert_eq!(
            second.err(),
            Some(DownloadStartError::AlreadyInProgress { pack_id: 42 })
        );

        assert_eq!(entered.recv().await, Some(42));
        assert!(handle.try_outcome().is_none());
        release.send(Ok(())).expect("release");
        assert_eq!(handle.wait().await?, PathBuf::from("/tmp/42.zip"));
        assert_eq!(worker.calls.load(Ordering::SeqCst), 1);
        assert!(orchestrator.state(42).await.is_completed());

        let third = orchestrator.start_download(42, "https://files/42.zip").await;
        assert_eq!(
            third.err(),
            Some(DownloadStartError::AlreadyCompleted { pack_id: 42 })
        );
        assert!(orchestrator.clear(42).await);
        assert_eq!(orchestrator.state(42).await, DownloadState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn progress_is_applied_in_order() -> anyhow::Result<()> {
        let worker = Arc::new(ScriptedWorker::default());
        let release = worker.gate(7);
        let mut entered = worker.notify();
        let (orchestrator, _) = orchestrator(&worker);

        let handle = orchestrator.start_download(7, "https://files/7.zip").await?;
        assert_eq!(entered.recv().await, Some(7));
        let publisher = worker.publisher(7);
        publisher.emit(DownloadStage::Downloading, 10, 200);
        publisher.emit(DownloadStage::Downloading, 50, 200);

        wait_until(&orchestrator, 7, |state| state.percent() == 25).await;
        assert!(!orchestrator.clear(7).await);

        publisher.emit(DownloadStage::Extracting, 100, 100);
        release.send(Ok(())).expect("release");
        handle.wait().await?;
        assert_eq!(orchestrator.state(7).await, DownloadState::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn failure_returns_pack_to_idle() -> anyhow::Result<()> {
        let worker = Arc::new(ScriptedWorker::default());
        let release = worker.gate(9);
        let (orchestrator, events) = orchestrator(&worker);
        let mut stream = events.subscribe(None);

        let handle = orchestrator.start_download(9, "https://files/9.zip").await?;
        release.send(Err("corrupt archive".into())).expect("release");
        let err = handle.wait().await.expect_err("worker failed");
        assert_eq!(error_chain(err.as_ref()), "pack worker failed: corrupt archive");
        assert_eq!(orchestrator.state(9).await, DownloadState::Idle);
        assert!(orchestrator.snapshot().await.is_empty());

        let mut kinds = Vec::new();
        while let Ok(Some(envelope)) =
            timeout(Duration::from_millis(200), stream.next()).await
        {
            kinds.push(envelope.event.kind());
            if kinds.last() == Some(&"download_failed") {
                break;
            }
        }
        assert_eq!(kinds, vec!["download_started", "download_failed"]);

        let retry_gate = worker.gate(9);
        let retry = orchestrator.start_download(9, "https://files/9.zip").await?;
        retry_gate.send(Ok(())).expect("release retry");
        retry.wait().await?;
        assert_eq!(worker.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn reconcile_keeps_only_visible_active_downloads() -> anyhow::Result<()> {
        let worker = Arc::new(ScriptedWorker::default());
        let releases: Vec<_> = [1, 2, 3].into_iter().map(|id| worker.gate(id)).collect();
        let (orchestrator, _) = orchestrator(&worker);

        let mut handles = Vec::new();
        for id in [1, 2, 3] {
            handles.push(orchestrator.start_download(id, format!("https://files/{id}.zip")).await?);
        }

        let visible: HashSet<PackId> = [2, 4].into_iter().collect();
        assert_eq!(orchestrator.reconcile(&visible).await, vec![1, 3]);
        let snapshot = orchestrator.snapshot().await;
        assert_eq!(snapshot.keys().copied().collect::<Vec<_>>(), vec![2]);

        // Workers were not cancelled, and their completion leaves the map alone.
        for release in releases {
            release.send(Ok(())).expect("release");
        }
        for handle in handles {
            handle.wait().await?;
        }
        assert_eq!(orchestrator.state(1).await, DownloadState::Idle);
        assert_eq!(orchestrator.state(3).await, DownloadState::Idle);
        assert_eq!(orchestrator.state(2).await, DownloadState::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn restarting_a_forgotten_download_reattaches() -> anyhow::Result<()> {
        let worker = Arc::new(ScriptedWorker::default());
        let release = worker.gate(5);
        let mut entered = worker.notify();
        let (orchestrator, _) = orchestrator(&worker);

        let first = orchestrator.start_download(5, "https://files/5.zip").await?;
        assert_eq!(entered.recv().await, Some(5));
        orchestrator.reconcile(&HashSet::new()).await;
        assert_eq!(orchestrator.state(5).await, DownloadState::Idle);

        let second = orchestrator.start_download(5, "https://files/5.zip").await?;
        worker.publisher(5).emit(DownloadStage::Downloading, 3, 4);
        wait_until(&orchestrator, 5, |state| state.percent() == 75).await;

        release.send(Ok(())).expect("release");
        assert_eq!(second.wait().await?, PathBuf::from("/tmp/5.zip"));
        assert_eq!(first.wait().await?, PathBuf::from("/tmp/5.zip"));
        assert_eq!(worker.calls.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.state(5).await, DownloadState::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn page_observer_reconciles_against_page_ids() -> anyhow::Result<()> {
        let worker = Arc::new(ScriptedWorker::default());
        let _release = worker.gate(11);
        let (orchestrator, _) = orchestrator(&worker);
        orchestrator.start_download(11, "https://files/11.zip").await?;

        let page: CatalogPage = serde_json::from_value(serde_json::json!({
            "data": [],
            "meta": { "current_page": 2, "last_page": 2, "per_page": 12, "total": 12 }
        }))?;
        orchestrator.page_loaded(&page).await;
        assert_eq!(orchestrator.state(11).await, DownloadState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn direct_progress_only_touches_active_entries() {
        let worker = Arc::new(ScriptedWorker::default());
        let (orchestrator, _) = orchestrator(&worker);
        let applied = orchestrator
            .apply_progress(8, ProgressEvent::new(8, DownloadStage::Downloading, 1, 2))
            .await;
        assert!(!applied);
        assert_eq!(orchestrator.state(8).await, DownloadState::Idle);
    }
}
