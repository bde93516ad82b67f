//! Error taxonomy for the connection pool (C3) and multi-server client (C4).

use nzb_types::ArticleId;
use thiserror::Error;

/// Errors raised while establishing or using one NNTP connection. These never
/// cross the C4 boundary directly — C4 translates them into [`NetError`]
/// after exhausting the server list (spec §4.4, §7).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error talking to {server}: {source}")]
    Io {
        server: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unexpected NNTP reply from {server}: {reply}")]
    Protocol { server: String, reply: String },
    #[error("authentication to {server} failed: {reply}")]
    AuthFailed { server: String, reply: String },
    #[error("article {0} not found on this server")]
    ArticleMissing(ArticleId),
    #[error("operation timed out")]
    Timeout,
}

impl TransportError {
    /// Transient soft failures (article missing) leave the connection
    /// healthy and don't count against server health (spec §4.3).
    pub fn is_article_missing(&self) -> bool {
        matches!(self, TransportError::ArticleMissing(_))
    }
}

/// Errors surfaced to callers of the multi-server client (spec §7).
#[derive(Debug, Error)]
pub enum NetError {
    #[error("article {0} not found on any enabled server")]
    ArticleNotFound(ArticleId),
    #[error("all enabled servers are unavailable")]
    ServerUnavailable,
    #[error("operation cancelled")]
    Cancelled,
    #[error("no enabled servers are configured")]
    NoServersConfigured,
}
