pub mod error;
pub mod feed;
pub mod http;
pub mod progress;
pub mod queue;

// Re-export main types for convenience
pub use error::{DownloadError, FeedError, FetchError, ParseError, QueueError};
pub use feed::{Enclosure, Episode, Feed, FeedFetcher, FetchOptions, FetchResult, parse_feed};
pub use http::{HttpClient, HttpError, ReqwestClient};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use queue::{DownloadItem, DownloadOptions, DownloadQueue, DownloadStatus};
