// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use url::Url;

use crate::error::{DownloadError, QueueError};
use crate::feed::default_user_agent;
use crate::http::{HttpClient, HttpError, ReqwestClient};
use crate::progress::{NoopReporter, ProgressEvent, SharedProgressReporter};

use super::filename::filename_for_url;
use super::item::{DownloadItem, DownloadStatus};

const DEFAULT_MAX_CONCURRENT: usize = 3;
const MAX_CONCURRENT_CEILING: usize = 10;

/// Suffix for in-flight transfer staging files
const PARTIAL_SUFFIX: &str = ".partial";

/// Options for the download queue
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Directory downloads are written into
    pub download_dir: PathBuf,
    /// Simultaneous transfer ceiling, clamped to 1-10
    pub max_concurrent: usize,
    /// Overall timeout per transfer
    pub timeout: Duration,
    /// User-Agent header for requests
    pub user_agent: String,
}

impl DownloadOptions {
    /// Options with defaults: 3 concurrent transfers, 5 minute timeout
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout: Duration::from_secs(300),
            user_agent: default_user_agent(),
        }
    }
}

/// Manages concurrent downloads of episode media files.
///
/// Each queue instance is independent; construct one per application
/// (or per test) and share it by cloning the handle. Enqueue, cancel,
/// and query operations return immediately; transfers run on spawned
/// tasks, so a Tokio runtime must be active when items are added.
///
/// At most `max_concurrent` transfers run at once. Worker slots are
/// handed to pending items in enqueue order.
pub struct DownloadQueue<C: HttpClient = ReqwestClient> {
    inner: Arc<Inner<C>>,
}

impl<C: HttpClient> Clone for DownloadQueue<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl DownloadQueue<ReqwestClient> {
    /// Create a queue backed by a reqwest client configured from the options
    pub fn new(options: DownloadOptions) -> Self {
        let client = ReqwestClient::new(&options.user_agent, options.timeout);
        Self::with_client(client, options)
    }
}

impl<C: HttpClient + 'static> DownloadQueue<C> {
    /// Create a queue with a custom HTTP client
    pub fn with_client(client: C, options: DownloadOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                download_dir: options.download_dir,
                max_concurrent: options.max_concurrent.clamp(1, MAX_CONCURRENT_CEILING),
                state: Mutex::new(QueueState {
                    slots: Vec::new(),
                    next_seq: 0,
                }),
                reporter: Mutex::new(NoopReporter::shared()),
                done: Notify::new(),
            }),
        }
    }

    /// Register a handler for progress updates and terminal transitions.
    ///
    /// The reporter runs on the queue's transfer tasks; a handler that
    /// blocks stalls progress reporting for items sharing that context.
    pub fn set_progress_reporter(&self, reporter: SharedProgressReporter) {
        *self.inner.reporter.lock().unwrap() = reporter;
    }

    /// Enqueue a download.
    ///
    /// Returns the new item's snapshot immediately; the transfer runs
    /// in the background. The destination is `download_dir/<filename>`,
    /// derived from the URL's last path segment when no filename is
    /// given. Rejected when the URL already has a non-terminal item.
    pub fn add(&self, url: Url, filename: Option<&str>) -> Result<DownloadItem, QueueError> {
        let item = {
            let mut state = self.inner.state.lock().unwrap();
            if state.live(&url).is_some() {
                return Err(QueueError::AlreadyQueued { url });
            }

            let seq = state.next_seq;
            state.next_seq += 1;

            let name = match filename {
                Some(name) => name.to_string(),
                None => {
                    filename_for_url(&url).unwrap_or_else(|| format!("download-{seq}"))
                }
            };

            let item = DownloadItem::new(url, self.inner.download_dir.join(name));
            state.slots.push(Slot {
                seq,
                cancel: Arc::new(CancelSignal::default()),
                item: item.clone(),
            });
            item
        };

        self.inner.report(ProgressEvent::Queued { item: item.clone() });
        self.inner.dispatch();
        Ok(item)
    }

    /// Enqueue several downloads with per-item `add` semantics.
    ///
    /// One rejected URL does not block the others.
    pub fn add_batch<I>(&self, requests: I) -> Vec<Result<DownloadItem, QueueError>>
    where
        I: IntoIterator<Item = (Url, Option<String>)>,
    {
        requests
            .into_iter()
            .map(|(url, filename)| self.add(url, filename.as_deref()))
            .collect()
    }

    /// Cancel the live download for a URL.
    ///
    /// A pending item transitions directly to `Cancelled`; an active
    /// transfer is signalled and stops at its next suspension point,
    /// discarding its partial file. Returns whether a non-terminal
    /// item was found.
    pub fn cancel(&self, url: &Url) -> bool {
        let snapshot = {
            let mut state = self.inner.state.lock().unwrap();
            let Some(slot) = state
                .slots
                .iter_mut()
                .find(|s| s.item.url == *url && !s.item.status.is_terminal())
            else {
                return false;
            };

            slot.cancel.cancel();
            slot.item.status = DownloadStatus::Cancelled;
            slot.item.updated_at = Utc::now();
            slot.item.clone()
        };

        self.inner.done.notify_waiters();
        self.inner.report(ProgressEvent::Cancelled { item: snapshot });
        true
    }

    /// Cancel every non-terminal item. Returns the number cancelled.
    pub fn cancel_all(&self) -> usize {
        let snapshots: Vec<DownloadItem> = {
            let mut state = self.inner.state.lock().unwrap();
            state
                .slots
                .iter_mut()
                .filter(|s| !s.item.status.is_terminal())
                .map(|slot| {
                    slot.cancel.cancel();
                    slot.item.status = DownloadStatus::Cancelled;
                    slot.item.updated_at = Utc::now();
                    slot.item.clone()
                })
                .collect()
        };

        self.inner.done.notify_waiters();
        for item in &snapshots {
            self.inner.report(ProgressEvent::Cancelled { item: item.clone() });
        }
        snapshots.len()
    }

    /// Remove completed, failed, and cancelled items from the table.
    /// Returns the number removed.
    pub fn clear_completed(&self) -> usize {
        let mut state = self.inner.state.lock().unwrap();
        let before = state.slots.len();
        state.slots.retain(|s| !s.item.status.is_terminal());
        before - state.slots.len()
    }

    /// Snapshot of all tracked items, in enqueue order
    pub fn get_items(&self) -> Vec<DownloadItem> {
        let state = self.inner.state.lock().unwrap();
        state.slots.iter().map(|s| s.item.clone()).collect()
    }

    /// Snapshot of the most recently enqueued item for a URL
    pub fn get_item(&self, url: &Url) -> Option<DownloadItem> {
        let state = self.inner.state.lock().unwrap();
        state
            .slots
            .iter()
            .rev()
            .find(|s| s.item.url == *url)
            .map(|s| s.item.clone())
    }

    /// Number of items waiting for a worker slot
    pub fn pending_count(&self) -> usize {
        self.count_status(DownloadStatus::Pending)
    }

    /// Number of transfers currently running
    pub fn active_count(&self) -> usize {
        self.count_status(DownloadStatus::Active)
    }

    /// Number of completed downloads
    pub fn completed_count(&self) -> usize {
        self.count_status(DownloadStatus::Completed)
    }

    /// Number of failed downloads
    pub fn failed_count(&self) -> usize {
        self.count_status(DownloadStatus::Failed)
    }

    fn count_status(&self, status: DownloadStatus) -> usize {
        let state = self.inner.state.lock().unwrap();
        state
            .slots
            .iter()
            .filter(|s| s.item.status == status)
            .count()
    }

    /// Wait until every item enqueued before this call reaches a
    /// terminal state.
    ///
    /// Snapshot semantics: items added while the wait is in progress
    /// are not included; call again to wait for them.
    pub async fn wait_all(&self) {
        let tracked: Vec<u64> = {
            let state = self.inner.state.lock().unwrap();
            state
                .slots
                .iter()
                .filter(|s| !s.item.status.is_terminal())
                .map(|s| s.seq)
                .collect()
        };

        if tracked.is_empty() {
            return;
        }

        loop {
            let notified = self.inner.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.inner.state.lock().unwrap();
                let unfinished = state.slots.iter().any(|s| {
                    tracked.contains(&s.seq) && !s.item.status.is_terminal()
                });
                if !unfinished {
                    return;
                }
            }

            notified.await;
        }
    }
}

/// Cooperative cancellation signal observed at transfer suspension points
#[derive(Default)]
struct CancelSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

struct Slot {
    seq: u64,
    cancel: Arc<CancelSignal>,
    item: DownloadItem,
}

struct QueueState {
    slots: Vec<Slot>,
    next_seq: u64,
}

impl QueueState {
    fn live(&self, url: &Url) -> Option<&Slot> {
        self.slots
            .iter()
            .find(|s| s.item.url == *url && !s.item.status.is_terminal())
    }

    fn slot_mut(&mut self, seq: u64) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.seq == seq)
    }
}

/// Shared queue internals; the state mutex is the single serialization
/// boundary for status transitions. I/O happens outside of it.
struct Inner<C> {
    client: C,
    download_dir: PathBuf,
    max_concurrent: usize,
    state: Mutex<QueueState>,
    reporter: Mutex<SharedProgressReporter>,
    done: Notify,
}

enum TransferOutcome {
    Completed { bytes: u64, checksum: String },
    Cancelled,
}

impl<C: HttpClient + 'static> Inner<C> {
    /// Hand free worker slots to pending items in enqueue order
    fn dispatch(self: &Arc<Self>) {
        let to_start = {
            let mut state = self.state.lock().unwrap();
            let mut active = state
                .slots
                .iter()
                .filter(|s| s.item.status == DownloadStatus::Active)
                .count();

            let mut started = Vec::new();
            for slot in state.slots.iter_mut() {
                if active >= self.max_concurrent {
                    break;
                }
                if slot.item.status == DownloadStatus::Pending {
                    slot.item.status = DownloadStatus::Active;
                    slot.item.updated_at = Utc::now();
                    started.push((slot.seq, slot.item.clone(), Arc::clone(&slot.cancel)));
                    active += 1;
                }
            }
            started
        };

        for (seq, item, cancel) in to_start {
            self.report(ProgressEvent::TransferStarted { item: item.clone() });
            self.spawn_transfer(seq, item, cancel);
        }
    }

    fn spawn_transfer(self: &Arc<Self>, seq: u64, item: DownloadItem, cancel: Arc<CancelSignal>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let partial = partial_path(&item.destination);
            let outcome = inner
                .run_transfer(seq, &item.url, &item.destination, &partial, &cancel)
                .await;

            match outcome {
                Ok(TransferOutcome::Completed { bytes, checksum }) => {
                    match inner.complete(seq, bytes, checksum) {
                        Some(item) => inner.report(ProgressEvent::Completed { item }),
                        // Cancelled between the final write and the status
                        // transition; the finalized file is discarded so a
                        // cancelled item never reports completed output.
                        None => {
                            let _ = tokio::fs::remove_file(&item.destination).await;
                        }
                    }
                }
                Ok(TransferOutcome::Cancelled) => {
                    let _ = tokio::fs::remove_file(&partial).await;
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&partial).await;
                    if let Some(item) = inner.fail(seq, e.to_string()) {
                        inner.report(ProgressEvent::Failed { item });
                    }
                }
            }

            inner.done.notify_waiters();
            inner.dispatch();
        });
    }

    /// Stream one transfer to its staging file and finalize it.
    ///
    /// Bytes go to `<destination>.partial` and are hashed on the way;
    /// the staging file is renamed onto the destination only after a
    /// complete, uncancelled transfer.
    async fn run_transfer(
        &self,
        seq: u64,
        url: &Url,
        destination: &Path,
        partial: &Path,
        cancel: &CancelSignal,
    ) -> Result<TransferOutcome, DownloadError> {
        if cancel.is_cancelled() {
            return Ok(TransferOutcome::Cancelled);
        }

        let response = tokio::select! {
            response = self.client.get_stream(url.as_str()) => {
                response.map_err(|e| match e {
                    HttpError::TimedOut => DownloadError::TimedOut { url: url.clone() },
                    HttpError::Transport(source) => DownloadError::RequestFailed {
                        url: url.clone(),
                        source,
                    },
                })?
            }
            _ = cancel.cancelled() => return Ok(TransferOutcome::Cancelled),
        };

        if response.status >= 400 {
            return Err(DownloadError::HttpStatus {
                url: url.clone(),
                status: response.status,
            });
        }

        if let Some(item) = self.set_total_bytes(seq, response.content_length) {
            self.report(ProgressEvent::TransferProgress { item });
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DownloadError::FileCreateFailed {
                    path: parent.to_path_buf(),
                    source: e,
                }
            })?;
        }

        let mut file = File::create(partial)
            .await
            .map_err(|e| DownloadError::FileCreateFailed {
                path: partial.to_path_buf(),
                source: e,
            })?;

        let mut hasher = Sha256::new();
        let mut bytes_downloaded: u64 = 0;
        let mut stream = response.body;

        loop {
            let next_chunk = tokio::select! {
                chunk = stream.next() => chunk,
                _ = cancel.cancelled() => return Ok(TransferOutcome::Cancelled),
            };

            let Some(chunk_result) = next_chunk else {
                break;
            };
            let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
                url: url.clone(),
                message: e.to_string(),
            })?;

            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::FileWriteFailed {
                    path: partial.to_path_buf(),
                    source: e,
                })?;

            hasher.update(&chunk);
            bytes_downloaded += chunk.len() as u64;

            if let Some(item) = self.record_progress(seq, bytes_downloaded) {
                self.report(ProgressEvent::TransferProgress { item });
            }
        }

        if cancel.is_cancelled() {
            return Ok(TransferOutcome::Cancelled);
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: partial.to_path_buf(),
                source: e,
            })?;
        drop(file);

        tokio::fs::rename(partial, destination).await.map_err(|e| {
            DownloadError::FinalizeFailed {
                path: destination.to_path_buf(),
                source: e,
            }
        })?;

        Ok(TransferOutcome::Completed {
            bytes: bytes_downloaded,
            checksum: format!("{:x}", hasher.finalize()),
        })
    }

    fn complete(&self, seq: u64, bytes: u64, checksum: String) -> Option<DownloadItem> {
        let mut state = self.state.lock().unwrap();
        let slot = state.slot_mut(seq)?;
        if slot.item.status.is_terminal() {
            return None;
        }

        slot.item.status = DownloadStatus::Completed;
        slot.item.bytes_downloaded = bytes;
        slot.item.checksum = Some(checksum);
        slot.item.updated_at = Utc::now();
        Some(slot.item.clone())
    }

    fn fail(&self, seq: u64, message: String) -> Option<DownloadItem> {
        let mut state = self.state.lock().unwrap();
        let slot = state.slot_mut(seq)?;
        if slot.item.status.is_terminal() {
            return None;
        }

        slot.item.status = DownloadStatus::Failed;
        slot.item.error = Some(message);
        slot.item.updated_at = Utc::now();
        Some(slot.item.clone())
    }

    fn set_total_bytes(&self, seq: u64, total: Option<u64>) -> Option<DownloadItem> {
        let mut state = self.state.lock().unwrap();
        let slot = state.slot_mut(seq)?;
        if slot.item.status.is_terminal() {
            return None;
        }

        slot.item.total_bytes = total;
        slot.item.updated_at = Utc::now();
        Some(slot.item.clone())
    }

    fn record_progress(&self, seq: u64, bytes: u64) -> Option<DownloadItem> {
        let mut state = self.state.lock().unwrap();
        let slot = state.slot_mut(seq)?;
        if slot.item.status.is_terminal() {
            return None;
        }

        slot.item.bytes_downloaded = bytes;
        slot.item.updated_at = Utc::now();
        Some(slot.item.clone())
    }

    /// Invoke the reporter outside of the state lock
    fn report(&self, event: ProgressEvent) {
        let reporter = self.reporter.lock().unwrap().clone();
        reporter.report(event);
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}
