//! Shared data model (spec §3) and byte-range arithmetic (spec §4.1, C1) for
//! the virtual Usenet filesystem streaming engine.
//!
//! This crate has no I/O of its own: every type here is either plain data or
//! pure arithmetic over plain data. Network- and disk-facing components build
//! on top of it.

pub mod byte_range;
pub mod container;
pub mod health;
pub mod segment;
pub mod server;

pub use byte_range::{interpolation_search, ByteRange, ProbeFuture, SeekError};
pub use container::{ContainerEntry, ContainerKind};
pub use health::{next_check_after, FileId, HealthCheckRecord, MAX_RECHECK_INTERVAL};
pub use segment::{
    AesParams, ArticleId, FilePart, ModelError, MultipartVirtualFile, SegmentDescriptor,
    VirtualFile,
};
pub use server::{PoolState, ServerConfig, ServerHealth};
