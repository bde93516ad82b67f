//! Multi-server NNTP connection pool (C3), failover client (C4), and the
//! healthy/missing article caches (C11) — spec §4.3, §4.4, §4.11.

pub mod cache;
pub mod client;
pub mod error;
pub mod pool;
pub mod transport;

pub use cache::TtlCache;
pub use client::{connect_adhoc, UsenetClient};
pub use error::{NetError, TransportError};
pub use pool::{Pool, PooledConnection, ReservationGuard};
pub use transport::Connection;
