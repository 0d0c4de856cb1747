//! Feed acquisition: download, decompression and scratch-file lifetime.

pub mod decompress;
pub mod error;
pub mod feed;
pub mod scratch;

pub use error::DataError;
pub use feed::{Compression, FeedFetcher, FeedLocation, FeedSource, FetchedFeed};
pub use scratch::ScratchDir;
