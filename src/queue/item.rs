use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

/// Status of a tracked download.
///
/// Transitions are monotonic: `Pending -> Active -> {Completed |
/// Failed}`, `Pending -> Cancelled`, `Active -> Cancelled`. No
/// transition leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    /// Whether no further transition can occur from this status
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::Cancelled
        )
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Active => "active",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Snapshot of one tracked download.
///
/// `get_items` hands out clones of the queue's internal records;
/// mutating a snapshot never affects live queue state.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadItem {
    pub url: Url,
    pub destination: PathBuf,
    pub status: DownloadStatus,
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
    pub error: Option<String>,
    /// SHA-256 of the written file, recorded on completion
    pub checksum: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl DownloadItem {
    pub(crate) fn new(url: Url, destination: PathBuf) -> Self {
        Self {
            url,
            destination,
            status: DownloadStatus::Pending,
            bytes_downloaded: 0,
            total_bytes: None,
            error: None,
            checksum: None,
            updated_at: Utc::now(),
        }
    }

    /// Transfer progress in the range 0.0 to 1.0.
    ///
    /// Unknown totals report 0.0 until the transfer completes.
    pub fn progress(&self) -> f64 {
        match self.total_bytes {
            Some(total) if total > 0 => {
                (self.bytes_downloaded as f64 / total as f64).min(1.0)
            }
            _ => {
                if self.status == DownloadStatus::Completed {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Transfer progress as a percentage (0-100)
    pub fn progress_percent(&self) -> u8 {
        (self.progress() * 100.0) as u8
    }
}
