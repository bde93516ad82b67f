//! Unified error taxonomy for the streaming engine (spec §7), assembled from
//! the per-crate errors of `nzb-types`, `nzb-net`, and `nzb-container`.

use nzb_types::{ModelError, SeekError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Seek(#[from] SeekError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Net(#[from] nzb_net::NetError),
    #[error(transparent)]
    Container(#[from] nzb_container::ContainerError),
    #[error(transparent)]
    Yenc(#[from] nzb_yenc::YencError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("operation cancelled")]
    Cancelled,
    #[error("read requested past end of stream")]
    OutOfBounds,
    #[error("storage error: {0}")]
    StorageTransient(String),
    #[error("repair could not complete and needs manual attention: {0}")]
    ActionNeeded(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the repair loop should treat this as a transient storage fault
    /// worth retrying (spec §6 "supports retries... for transient errors").
    pub fn is_storage_transient(&self) -> bool {
        matches!(self, Error::StorageTransient(_))
    }
}
