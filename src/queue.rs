use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::backend::{failure_event, DownloadBackend, DownloadEvent, EventReceiver, EventSender};
use crate::completed::CompletedSet;
use crate::package::Catalog;
use crate::progress::{self, QueueSnapshot, RateEstimator};
use crate::staleness;
use crate::store::{self, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PackageState {
    NotQueued,
    Queued,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient banner for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NoticeLevel,
    pub message: String,
}

/// Session-owned download state: the queue, byte progress and the persisted
/// completed set.
///
/// Backend events come in through one channel ([`DownloadQueue::event_sender`])
/// and are applied one at a time by [`DownloadQueue::handle_event`]; nothing
/// else mutates this state.
pub struct DownloadQueue {
    catalog: Arc<Catalog>,
    backend: Arc<dyn DownloadBackend>,

    completed: CompletedSet,
    completed_store: Box<dyn Store<CompletedSet>>,
    stale: BTreeSet<String>,

    queue: Vec<String>,
    progress: BTreeMap<String, u64>,
    // Own sizes of everything queued since the queue was last empty; a
    // retried id is only counted once.
    total_size: u64,
    counted: HashSet<String>,
    estimator: RateEstimator,

    notifications: VecDeque<Notification>,
    events_tx: EventSender,
    events_rx: EventReceiver,
    snapshot_tx: watch::Sender<QueueSnapshot>,
}

impl DownloadQueue {
    pub fn new(
        catalog: Arc<Catalog>,
        backend: Arc<dyn DownloadBackend>,
        completed_store: Box<dyn Store<CompletedSet>>,
    ) -> Self {
        let completed = store::load_or_default(&*completed_store, "completed packages");
        let stale = staleness::stale_packages(&completed, &catalog);
        if !stale.is_empty() {
            log::info!("{} package(s) need updating: {:?}", stale.len(), stale);
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(QueueSnapshot::default());

        let mut queue = Self {
            catalog,
            backend,
            completed,
            completed_store,
            stale,
            queue: Vec::new(),
            progress: BTreeMap::new(),
            total_size: 0,
            counted: HashSet::new(),
            estimator: RateEstimator::default(),
            notifications: VecDeque::new(),
            events_tx,
            events_rx,
            snapshot_tx,
        };
        queue.publish();
        queue
    }

    /// Sender the backend pushes progress/completion events into.
    pub fn event_sender(&self) -> EventSender {
        self.events_tx.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn completed(&self) -> &CompletedSet {
        &self.completed
    }

    pub fn stale(&self) -> &BTreeSet<String> {
        &self.stale
    }

    pub fn queue(&self) -> &[String] {
        &self.queue
    }

    pub fn is_queued(&self, id: &str) -> bool {
        self.queue.iter().any(|q| q == id)
    }

    pub fn state_of(&self, id: &str) -> PackageState {
        if self.is_queued(id) {
            PackageState::Queued
        } else if self.completed.contains(id) {
            PackageState::Completed
        } else {
            PackageState::NotQueued
        }
    }

    /// Completed at the catalog's current hash, dependencies included.
    pub fn is_up_to_date(&self, id: &str) -> bool {
        staleness::is_up_to_date(id, &self.completed, &self.catalog)
    }

    pub fn progress_of(&self, id: &str) -> Option<u64> {
        self.progress.get(id).copied()
    }

    pub fn overall_progress(&self) -> u64 {
        self.progress.values().sum()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn percent(&self) -> f64 {
        progress::percent(self.overall_progress(), self.total_size)
    }

    pub fn eta(&self) -> Option<Duration> {
        self.eta_at(Instant::now())
    }

    pub fn eta_at(&self, now: Instant) -> Option<Duration> {
        if self.queue.is_empty() {
            return None;
        }
        self.estimator
            .eta(now, self.overall_progress(), self.total_size)
    }

    /// Queue one package and ask the backend for it.
    ///
    /// Returns `false` if it is already queued or the catalog doesn't know it.
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&mut self, id: &str) -> bool {
        if self.is_queued(id) {
            return false;
        }
        let Some(pkg) = self.catalog.get(id) else {
            log::warn!("enqueue: unknown package {id}");
            return false;
        };
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("enqueue {id}: no async runtime: {e}");
                return false;
            }
        };

        let request = self
            .backend
            .request_download(&pkg.id, &pkg.object_key, &pkg.hash);
        let size = pkg.size;

        if self.queue.is_empty() {
            self.estimator.reset();
            self.estimator.observe(Instant::now(), 0);
        }
        self.queue.push(id.to_string());
        if self.counted.insert(id.to_string()) {
            self.total_size += size;
        }
        log::info!("queued {id} ({size} bytes), {} in queue", self.queue.len());

        let tx = self.events_tx.clone();
        let package_id = id.to_string();
        runtime.spawn(async move {
            if let Err(e) = request.await {
                log::error!("download request for {package_id} failed: {e}");
                let _ = tx.send(failure_event(&package_id, &e));
            }
        });

        self.publish();
        true
    }

    pub fn enqueue_all<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter()
            .filter(|id| self.enqueue(id.as_ref()))
            .count()
    }

    /// Remove from the queue. Emptying the queue resets all byte counters.
    pub fn dequeue(&mut self, id: &str) -> bool {
        let Some(pos) = self.queue.iter().position(|q| q == id) else {
            return false;
        };
        self.queue.remove(pos);
        if self.queue.is_empty() {
            self.total_size = 0;
            self.counted.clear();
            self.progress.clear();
            self.estimator.reset();
            log::info!("download queue drained");
        }
        self.publish();
        true
    }

    /// Swap in a freshly fetched catalog. Refused while downloads are queued.
    pub fn set_catalog(&mut self, catalog: Arc<Catalog>) -> bool {
        if !self.queue.is_empty() {
            log::warn!("catalog refresh skipped, {} download(s) queued", self.queue.len());
            return false;
        }
        self.catalog = catalog;
        self.stale = staleness::stale_packages(&self.completed, &self.catalog);
        self.publish();
        true
    }

    /// Re-download every package whose hash (or a dependency's) has changed.
    pub fn update_stale(&mut self) -> usize {
        let stale: Vec<String> = self.stale.iter().cloned().collect();
        self.enqueue_all(stale)
    }

    pub fn handle_event(&mut self, event: DownloadEvent) {
        match event {
            DownloadEvent::Progress {
                package_id,
                transferred,
            } => self.on_progress(package_id, transferred),
            DownloadEvent::Completed { package_id, hash } => self.on_completed(&package_id, hash),
            DownloadEvent::Failed {
                package_id,
                message,
            } => self.on_failed(&package_id, &message),
        }
    }

    fn on_progress(&mut self, package_id: String, transferred: u64) {
        if !self.is_queued(&package_id) {
            log::debug!("progress for {package_id} ignored, not queued");
            return;
        }
        self.progress.insert(package_id, transferred);
        self.estimator.observe(Instant::now(), self.overall_progress());
        self.publish();
    }

    fn on_completed(&mut self, package_id: &str, hash: String) {
        self.completed.record(package_id, hash);
        if let Err(e) = self.completed_store.save(&self.completed) {
            log::error!("failed to save completed packages: {e}");
            self.notify(
                NoticeLevel::Error,
                format!("Could not save install state for {package_id}: {e}"),
            );
        }
        self.stale = staleness::stale_packages(&self.completed, &self.catalog);

        if self.is_queued(package_id) {
            let name = match self.catalog.get(package_id) {
                Some(pkg) => {
                    // Count the whole archive even if the last progress event was throttled.
                    self.progress.insert(package_id.to_string(), pkg.size);
                    pkg.display_name.clone()
                }
                None => package_id.to_string(),
            };
            log::info!("download completed: {package_id}");
            self.notify(NoticeLevel::Info, format!("Installed {name}"));
        }
        if !self.dequeue(package_id) {
            self.publish();
        }
    }

    fn on_failed(&mut self, package_id: &str, message: &str) {
        log::error!("download of {package_id} failed: {message}");
        self.notify(
            NoticeLevel::Error,
            format!("Download of {package_id} failed: {message}"),
        );
        self.dequeue(package_id);
    }

    /// Apply every event already waiting in the channel.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait for the next backend event and apply it.
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        let event = self.events_rx.recv().await?;
        self.handle_event(event.clone());
        Some(event)
    }

    /// Apply events until nothing is queued.
    pub async fn run_until_idle(&mut self) {
        while !self.queue.is_empty() {
            if self.next_event().await.is_none() {
                break;
            }
        }
    }

    /// Periodic resample for the rate estimate (every few seconds from a UI timer).
    pub fn tick(&mut self, now: Instant) {
        if self.queue.is_empty() {
            return;
        }
        self.estimator.observe(now, self.overall_progress());
        self.publish();
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    fn notify(&mut self, level: NoticeLevel, message: String) {
        self.notifications.push_back(Notification { level, message });
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let transferred = self.overall_progress();
        QueueSnapshot {
            queue: self.queue.clone(),
            progress: self.progress.clone(),
            transferred_bytes: transferred,
            total_bytes: self.total_size,
            overall_percent: progress::percent(transferred, self.total_size),
            eta_seconds: self.eta().map(|d| d.as_secs()),
            stale: self.stale.iter().cloned().collect(),
        }
    }

    fn publish(&mut self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}
