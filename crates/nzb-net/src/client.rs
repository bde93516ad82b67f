//! Priority-ordered, failover multi-server NNTP client (spec §4.4, C4).

use std::sync::{Arc, Mutex, RwLock};

use nzb_types::{ArticleId, ServerConfig, ServerHealth};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::cache::TtlCache;
use crate::error::{NetError, TransportError};
use crate::pool::{Pool, PooledConnection, ReservationGuard};
use crate::transport::Connection;

struct ServerEntry {
    config: ServerConfig,
    pool: Arc<Pool>,
    health: Mutex<ServerHealth>,
}

/// Default cache sizes (spec §4.11: "thousands-tens of thousands").
const DEFAULT_CACHE_SIZE: usize = 20_000;

/// Maintains a priority-sorted snapshot of enabled servers, their pools, and
/// their rolling health, and fans every article operation out across them
/// with failover (spec §4.4).
pub struct UsenetClient {
    servers: RwLock<Vec<Arc<ServerEntry>>>,
    healthy_cache: Arc<TtlCache>,
    missing_cache: Arc<TtlCache>,
    tls_connector: Option<Arc<tokio_rustls::TlsConnector>>,
}

/// Outcome of exhausting every enabled server for one article operation.
enum Exhausted {
    /// Every attempted server gave a definitive "not here" reply.
    AllMissing,
    /// At least one attempted server failed at the transport level, or no
    /// server was attempted at all (all marked unavailable) — we cannot be
    /// sure the article is really gone, so this is not cached as missing
    /// (spec is silent on the mixed case; this crate resolves it
    /// conservatively, see DESIGN.md).
    SomeUnavailable,
}

impl UsenetClient {
    pub fn new(configs: Vec<ServerConfig>, tls_connector: Option<Arc<tokio_rustls::TlsConnector>>) -> Self {
        let client = Self {
            servers: RwLock::new(Vec::new()),
            healthy_cache: Arc::new(TtlCache::with_default_ttl(DEFAULT_CACHE_SIZE)),
            missing_cache: Arc::new(TtlCache::with_default_ttl(DEFAULT_CACHE_SIZE)),
            tls_connector,
        };
        client.reconfigure(configs);
        client
    }

    /// Rebuilds the server snapshot: disposes pools for removed/changed
    /// servers, creates pools for newly-added ones, and clears both caches
    /// (spec §4.4 "Config-change"; per spec §9's stricter open-question
    /// resolution, the missing-article cache is cleared on *any* change, not
    /// only host changes).
    pub fn reconfigure(&self, configs: Vec<ServerConfig>) {
        let mut enabled: Vec<ServerConfig> = configs.into_iter().filter(|c| c.enabled).collect();
        enabled.sort_by_key(|c| c.priority);

        let old = {
            let mut guard = self.servers.write().unwrap();
            std::mem::take(&mut *guard)
        };
        for entry in &old {
            entry.pool.dispose();
        }

        let new_entries = enabled
            .into_iter()
            .map(|config| {
                let pool = Pool::new(config.clone(), self.tls_connector.clone());
                Arc::new(ServerEntry {
                    config,
                    pool,
                    health: Mutex::new(ServerHealth::default()),
                })
            })
            .collect();

        *self.servers.write().unwrap() = new_entries;
        self.healthy_cache.clear();
        self.missing_cache.clear();
    }

    fn snapshot(&self) -> Vec<Arc<ServerEntry>> {
        self.servers.read().unwrap().clone()
    }

    /// Scoped reservation against every server's pool, used by the repair
    /// scheduler (C12, spec §4.12 step 2).
    pub fn reserve_all(&self, n: u32) -> Vec<ReservationGuard> {
        self.snapshot()
            .iter()
            .map(|e| e.pool.reserve(n))
            .collect()
    }

    pub fn healthy_cache(&self) -> &TtlCache {
        &self.healthy_cache
    }

    pub fn missing_cache(&self) -> &TtlCache {
        &self.missing_cache
    }

    /// Fetches a decoded article body, following the failover algorithm of
    /// spec §4.4.
    pub async fn fetch_body(
        &self,
        id: &ArticleId,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, NetError> {
        self.run(id, cancel, |conn, id| {
            Box::pin(async move { conn.body(id).await })
        })
        .await
    }

    /// Existence probe (`STAT`). Consults the healthy cache first unless
    /// `skip_healthy_cache` is set (the repair scheduler bypasses it so it
    /// always re-verifies, spec §4.12).
    pub async fn probe_exists(
        &self,
        id: &ArticleId,
        skip_healthy_cache: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, NetError> {
        if !skip_healthy_cache && self.healthy_cache.contains(id) {
            return Ok(true);
        }
        let present = self
            .run(id, cancel, |conn, id| Box::pin(async move { conn.stat(id).await }))
            .await;
        match present {
            Ok(true) => {
                self.healthy_cache.insert(id.clone());
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(NetError::ArticleNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn run<T, F>(&self, id: &ArticleId, cancel: &CancellationToken, op: F) -> Result<T, NetError>
    where
        F: for<'c> Fn(
            &'c mut PooledConnection,
            &'c ArticleId,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<T, TransportError>> + Send + 'c>>,
    {
        if self.missing_cache.contains(id) {
            return Err(NetError::ArticleNotFound(id.clone()));
        }

        let servers = self.snapshot();
        if servers.is_empty() {
            return Err(NetError::NoServersConfigured);
        }

        let mut attempted = 0usize;
        let mut saw_missing = false;
        let mut saw_fatal = false;

        for entry in &servers {
            if cancel.is_cancelled() {
                return Err(NetError::Cancelled);
            }
            if entry.health.lock().unwrap().unavailable {
                continue;
            }

            let mut conn = match entry.pool.acquire(cancel).await {
                Ok(c) => c,
                Err(_) => {
                    attempted += 1;
                    saw_fatal = true;
                    self.record_failure(entry);
                    continue;
                }
            };

            attempted += 1;
            match op(&mut conn, id).await {
                Ok(value) => {
                    let mut health = entry.health.lock().unwrap();
                    health.record_success(OffsetDateTime::now_utc());
                    return Ok(value);
                }
                Err(e) if e.is_article_missing() => {
                    saw_missing = true;
                    entry.health.lock().unwrap().record_article_missing();
                }
                Err(_) => {
                    saw_fatal = true;
                    conn.discard();
                    self.record_failure(entry);
                }
            }
        }

        let _ = attempted;
        let outcome = if saw_fatal {
            Exhausted::SomeUnavailable
        } else if saw_missing {
            Exhausted::AllMissing
        } else {
            Exhausted::SomeUnavailable
        };

        match outcome {
            Exhausted::AllMissing => {
                self.missing_cache.insert(id.clone());
                Err(NetError::ArticleNotFound(id.clone()))
            }
            Exhausted::SomeUnavailable => Err(NetError::ServerUnavailable),
        }
    }

    fn record_failure(&self, entry: &Arc<ServerEntry>) {
        let became_unavailable = {
            let mut health = entry.health.lock().unwrap();
            health.record_failure(OffsetDateTime::now_utc())
        };
        if became_unavailable {
            log::warn!(
                "server {} marked unavailable after repeated failures",
                entry.config.name
            );
            // A different server may now be serving requests that this one
            // previously judged "healthy"; its verdicts no longer apply.
            self.healthy_cache.clear();
        }
    }
}

/// Establishes one ad-hoc connection bypassing the pool, used only for the
/// repair scheduler's first-article read-header bootstrap when a file's
/// `release_date` is not yet known (spec §4.12). Exposed for `nzb-core`.
pub async fn connect_adhoc(
    config: &ServerConfig,
    tls_connector: Option<Arc<tokio_rustls::TlsConnector>>,
) -> Result<Connection, TransportError> {
    Connection::connect(config, tls_connector).await
}
