//! Bounded per-server NNTP connection pool with idle reuse, reserved-budget
//! gating, and graceful teardown (spec §4.3, C3).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use nzb_types::{PoolState, ServerConfig};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::transport::Connection;

struct Inner {
    idle: Vec<Connection>,
    live: u32,
    reserved: u32,
    permitted_max: u32,
    /// FIFO queue of parked acquirers; each is woken (in order) whenever a
    /// connection is returned or a slot frees up (spec §5, "connection-pool
    /// acquires are FIFO-fair").
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// A bounded pool of NNTP connections to one server.
pub struct Pool {
    config: ServerConfig,
    tls_connector: Option<Arc<tokio_rustls::TlsConnector>>,
    inner: Mutex<Inner>,
    disposed: AtomicBool,
}

impl Pool {
    pub fn new(config: ServerConfig, tls_connector: Option<Arc<tokio_rustls::TlsConnector>>) -> Arc<Self> {
        let permitted_max = config.max_connections.max(1);
        Arc::new(Self {
            config,
            tls_connector,
            inner: Mutex::new(Inner {
                idle: Vec::new(),
                live: 0,
                reserved: 0,
                permitted_max,
                waiters: VecDeque::new(),
            }),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn server_name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> PoolState {
        let inner = self.inner.lock().unwrap();
        PoolState {
            live: inner.live,
            idle: inner.idle.len() as u32,
            reserved: inner.reserved,
            permitted_max: inner.permitted_max,
        }
    }

    /// Reserves `n` connections against this pool's effective capacity until
    /// the returned guard is dropped (spec §4.3 "reserved-connections
    /// context"; used by the repair scheduler, C12, to avoid starving
    /// foreground reads and vice versa).
    pub fn reserve(self: &Arc<Self>, n: u32) -> ReservationGuard {
        if n > 0 {
            let mut inner = self.inner.lock().unwrap();
            inner.reserved += n;
        }
        ReservationGuard {
            pool: self.clone(),
            n,
        }
    }

    fn release_reservation(&self, n: u32) {
        if n == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.reserved = inner.reserved.saturating_sub(n);
        self.wake_one(&mut inner);
    }

    /// Acquires a connection, suspending until one is available or `cancel`
    /// fires. If a reservation is active (see [`Pool::reserve`]), the pool is
    /// treated as if its max were `permitted_max - reserved` (spec §4.3).
    pub async fn acquire(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Result<PooledConnection, TransportError> {
        loop {
            if self.disposed.load(Ordering::SeqCst) {
                return Err(TransportError::Protocol {
                    server: self.config.name.clone(),
                    reply: "pool disposed".into(),
                });
            }

            let wait_for = {
                let mut inner = self.inner.lock().unwrap();
                if let Some(conn) = inner.idle.pop() {
                    return Ok(PooledConnection::new(self.clone(), conn));
                }
                let effective_max = inner.permitted_max.saturating_sub(inner.reserved);
                if inner.live < effective_max {
                    inner.live += 1;
                    None
                } else {
                    let (tx, rx) = oneshot::channel();
                    inner.waiters.push_back(tx);
                    Some(rx)
                }
            };

            let Some(rx) = wait_for else {
                // We incremented `live` above; connect outside the lock.
                match Connection::connect(&self.config, self.tls_connector.clone()).await {
                    Ok(conn) => return Ok(PooledConnection::new(self.clone(), conn)),
                    Err(e) => {
                        let mut inner = self.inner.lock().unwrap();
                        inner.live = inner.live.saturating_sub(1);
                        self.wake_one(&mut inner);
                        return Err(e);
                    }
                }
            };

            tokio::select! {
                _ = rx => continue,
                _ = cancel.cancelled() => {
                    return Err(TransportError::Protocol {
                        server: self.config.name.clone(),
                        reply: "cancelled while waiting for a connection".into(),
                    });
                }
            }
        }
    }

    fn wake_one(&self, inner: &mut Inner) {
        if let Some(tx) = inner.waiters.pop_front() {
            let _ = tx.send(());
        }
    }

    /// Returns a connection to idle, or closes it if the pool has been
    /// disposed (spec §4.3).
    fn return_connection(&self, conn: Connection) {
        let mut inner = self.inner.lock().unwrap();
        if self.disposed.load(Ordering::SeqCst) {
            inner.live = inner.live.saturating_sub(1);
            drop(conn);
        } else {
            inner.idle.push(conn);
        }
        self.wake_one(&mut inner);
    }

    /// A connection died with a fatal error: discard it instead of
    /// returning it, and decrement `live` (spec §4.3 "Failure model").
    fn discard_connection(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.live = inner.live.saturating_sub(1);
        self.wake_one(&mut inner);
    }

    /// Drains idle connections and marks the pool disposed; in-flight
    /// acquires observe `disposed` on their next loop iteration, and any
    /// subsequent `return` closes the connection instead of reusing it
    /// (spec §4.3 "Teardown").
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        let mut inner = self.inner.lock().unwrap();
        let drained: Vec<_> = inner.idle.drain(..).collect();
        inner.live = inner.live.saturating_sub(drained.len() as u32);
        drop(drained);
        while let Some(tx) = inner.waiters.pop_front() {
            let _ = tx.send(());
        }
    }
}

/// RAII guard returned by [`Pool::reserve`]; releases the reservation on
/// drop.
pub struct ReservationGuard {
    pool: Arc<Pool>,
    n: u32,
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        self.pool.release_reservation(self.n);
    }
}

/// A connection checked out of a [`Pool`]. Every acquire path must eventually
/// drop or explicitly discard this; [`Drop`] returns the connection to idle
/// (spec §4.3 "Operations using a connection MUST call `return` on every exit
/// path").
pub struct PooledConnection {
    pool: Arc<Pool>,
    conn: Option<Connection>,
}

impl PooledConnection {
    fn new(pool: Arc<Pool>, conn: Connection) -> Self {
        Self {
            pool,
            conn: Some(conn),
        }
    }

    /// Marks this connection as fatally broken: it will be discarded
    /// (not returned to idle) when dropped.
    pub fn discard(mut self) {
        self.conn.take();
        self.pool.discard_connection();
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken")
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.return_connection(conn);
        }
    }
}
