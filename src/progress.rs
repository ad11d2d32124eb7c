use std::sync::Arc;

use crate::queue::DownloadItem;

/// Events emitted by the download queue for progress reporting.
///
/// Every event carries a point-in-time snapshot of the affected item.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// An item entered the queue in pending state
    Queued { item: DownloadItem },

    /// A transfer acquired a worker slot and is about to start
    TransferStarted { item: DownloadItem },

    /// Bytes arrived for an active transfer
    TransferProgress { item: DownloadItem },

    /// A transfer finished and its file was finalized
    Completed { item: DownloadItem },

    /// A transfer failed; the cause is in `item.error`
    Failed { item: DownloadItem },

    /// An item was cancelled, either before or during its transfer
    Cancelled { item: DownloadItem },
}

impl ProgressEvent {
    /// The item snapshot this event refers to
    pub fn item(&self) -> &DownloadItem {
        match self {
            ProgressEvent::Queued { item }
            | ProgressEvent::TransferStarted { item }
            | ProgressEvent::TransferProgress { item }
            | ProgressEvent::Completed { item }
            | ProgressEvent::Failed { item }
            | ProgressEvent::Cancelled { item } => item,
        }
    }
}

/// Trait for observing download queue activity.
///
/// Implementations can display progress bars, log messages, or collect
/// statistics. Reporters are invoked from the queue's transfer tasks,
/// so a handler that blocks stalls progress reporting for every item
/// sharing that task context.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::DownloadItem;
    use url::Url;

    #[test]
    fn noop_reporter_handles_all_events() {
        let reporter = NoopReporter;
        let item = DownloadItem::new(
            Url::parse("https://example.com/ep.mp3").unwrap(),
            "/tmp/ep.mp3".into(),
        );

        reporter.report(ProgressEvent::Queued { item: item.clone() });
        reporter.report(ProgressEvent::TransferStarted { item: item.clone() });
        reporter.report(ProgressEvent::TransferProgress { item: item.clone() });
        reporter.report(ProgressEvent::Completed { item: item.clone() });
        reporter.report(ProgressEvent::Failed { item: item.clone() });
        reporter.report(ProgressEvent::Cancelled { item });
    }

    #[test]
    fn event_exposes_item_snapshot() {
        let item = DownloadItem::new(
            Url::parse("https://example.com/ep.mp3").unwrap(),
            "/tmp/ep.mp3".into(),
        );
        let event = ProgressEvent::Queued { item };

        assert_eq!(event.item().url.as_str(), "https://example.com/ep.mp3");
    }
}
