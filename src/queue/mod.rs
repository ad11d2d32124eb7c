mod download;
mod filename;
mod item;

pub use download::{DownloadOptions, DownloadQueue};
pub use item::{DownloadItem, DownloadStatus};
