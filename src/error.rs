use std::path::PathBuf;
use thiserror::Error;
use url::Url;

/// Network-level failures while retrieving a feed document
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid feed URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Request to {url} timed out")]
    TimedOut { url: String },

    #[error("Failed to fetch {url}: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },
}

impl FetchError {
    /// The URL the failed request was issued against
    pub fn url(&self) -> &str {
        match self {
            FetchError::InvalidUrl { url, .. }
            | FetchError::TimedOut { url }
            | FetchError::RequestFailed { url, .. }
            | FetchError::HttpStatus { url, .. } => url,
        }
    }
}

/// Failures while interpreting a retrieved feed document
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid XML from {url}: {message}")]
    InvalidXml { url: String, message: String },

    #[error("Unrecognized feed format from {url}: expected <rss> or <feed>")]
    UnrecognizedFormat { url: String },
}

impl ParseError {
    /// The URL the unparseable document came from
    pub fn url(&self) -> &str {
        match self {
            ParseError::InvalidXml { url, .. } | ParseError::UnrecognizedFormat { url } => url,
        }
    }
}

/// Per-URL outcome classification for feed retrieval.
///
/// Network-class and document-class failures stay distinguishable so a
/// caller can decide between retrying and reporting a broken feed.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl FeedError {
    /// The offending URL, regardless of failure class
    pub fn url(&self) -> &str {
        match self {
            FeedError::Fetch(e) => e.url(),
            FeedError::Parse(e) => e.url(),
        }
    }
}

/// Errors signalled at enqueue time by the download queue
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Download already queued for {url}")]
    AlreadyQueued { url: Url },
}

/// Errors that terminate an individual transfer.
///
/// These surface through the item's `Failed` status and error message,
/// not at the `add` call site; transfers are asynchronous.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Request to {url} timed out")]
    TimedOut { url: Url },

    #[error("Request failed for {url}: {source}")]
    RequestFailed {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: Url, status: u16 },

    #[error("Stream interrupted for {url}: {message}")]
    StreamFailed { url: Url, message: String },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to finalize {path}: {source}")]
    FinalizeFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
