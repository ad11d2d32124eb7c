mod fetch;
mod model;
mod parse;

pub use fetch::{FeedFetcher, FetchOptions, FetchResult, default_user_agent};
pub use model::{Enclosure, Episode, Feed};
pub use parse::parse_feed;
