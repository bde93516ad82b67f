//! Error taxonomy for container index extraction (spec §4.8, §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("truncated or malformed {format} header: {detail}")]
    Malformed { format: &'static str, detail: String },
    #[error("entry `{path}` uses an unsupported coder chain (only store/copy is indexable)")]
    UnsupportedCompression { path: String },
    #[error("archive is solid and encrypted; entries cannot be random-accessed")]
    SolidEncryptedArchive,
    #[error("password required to open encrypted entry `{0}`")]
    PasswordRequired(String),
    #[error("password check failed for RAR5 archive")]
    InvalidPassword,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Binrw(#[from] binrw::Error),
}
