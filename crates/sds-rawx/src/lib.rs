//! Replicated chunk uploads to rawx storage services.
//!
//! An object is written position by position. For each position the caller's
//! source stream is read once and teed through bounded feeds to one upload
//! task per replica, run on a shared [`WorkerPool`].
//!
//! # Key Types
//!
//! - [`RawxClient`] — Uploads the chunks of an [`sds_types::ObjectInfo`] and reads them back
//! - [`ObjectReader`] — Sequential download of an object, position by position
//! - [`FeedGroup`] / [`FeedReader`] — Bounded fan-out of one byte stream
//! - [`WorkerPool`] — Synchronous hand-off thread pool
//! - [`ClientSettings`] — TOML-loadable client configuration

pub mod client;
pub mod feed;
pub mod pool;
pub mod settings;

pub use client::{ObjectReader, RawxClient};
pub use feed::{FeedGroup, FeedReader, FeedWriter, FEED_CAPACITY};
pub use pool::{PoolConfig, TaskHandle, WorkerPool};
pub use settings::{ClientSettings, RawxSettings};
