//! On-demand virtual Usenet filesystem streaming engine.
//!
//! This crate wires together segment fetching ([`nzb_net`]), yEnc decoding
//! ([`nzb_yenc`]), and container indexing ([`nzb_container`]) into the
//! composable byte-stream stack a WebDAV/SABnzbd-compatible front end reads
//! from, plus the background repair scheduler that keeps indexed files
//! fetchable over time.

pub mod aes_stream;
pub mod concat_stream;
pub mod config;
pub mod container_bridge;
pub mod container_file;
pub mod error;
pub mod repair;
pub mod segment_stream;
pub mod store;
pub mod stream;

pub use aes_stream::AesCbcStream;
pub use concat_stream::{ConcatenatedStream, LengthLimitedStream, WindowedStreams};
pub use config::ConfigSnapshot;
pub use container_file::ContainerVirtualFile;
pub use error::{Error, Result};
pub use repair::{RepairContext, RepairOutcome};
pub use segment_stream::SegmentStream;
pub use store::{ArrClient, HealthCheckQueueItem, NotificationSink, PersistenceStore, RetryPolicy, StoredFile};
pub use stream::ByteStream;
