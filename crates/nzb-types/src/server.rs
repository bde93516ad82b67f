//! Server configuration, pool-state, and health-tracking types shared by the
//! connection pool (C3) and multi-server client (C4).

use time::OffsetDateTime;

/// Static configuration for one NNTP server (spec §3, `ServerConfig`). Lower
/// `priority` is tried first (spec §4.4).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub id: u32,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub use_ssl: bool,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub max_connections: u32,
    pub priority: u32,
    pub enabled: bool,
    pub retention_days: Option<u32>,
}

/// Per-server pool occupancy (spec §3, `PoolState`).
///
/// Invariants: `live <= permitted_max`; while a reservation context of `R` is
/// active, `live - idle <= permitted_max - R`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolState {
    pub live: u32,
    pub idle: u32,
    pub reserved: u32,
    pub permitted_max: u32,
}

/// Rolling health counters for one server (spec §3, `ServerHealth`).
#[derive(Debug, Clone, Default)]
pub struct ServerHealth {
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    /// Count of "article not found on this server" replies — a soft failure
    /// that does not affect `consecutive_failures`/`unavailable` (spec §4.4
    /// scenario 3: a server missing one article is not unhealthy).
    pub total_article_missing: u64,
    pub last_success_at: Option<OffsetDateTime>,
    pub last_failure_at: Option<OffsetDateTime>,
    pub unavailable: bool,
}

impl ServerHealth {
    /// Consecutive transport failures after which a server is marked
    /// unavailable (spec §4.4 step 2d).
    pub const UNAVAILABLE_THRESHOLD: u32 = 5;

    pub fn record_success(&mut self, now: OffsetDateTime) {
        self.consecutive_failures = 0;
        self.total_successes += 1;
        self.last_success_at = Some(now);
        self.unavailable = false;
    }

    pub fn record_article_missing(&mut self) {
        self.total_article_missing += 1;
    }

    /// Returns `true` if this failure just crossed the unavailable threshold
    /// (i.e. the caller should emit a `server-unavailable` event).
    pub fn record_failure(&mut self, now: OffsetDateTime) -> bool {
        self.consecutive_failures += 1;
        self.total_failures += 1;
        self.last_failure_at = Some(now);
        if self.consecutive_failures >= Self::UNAVAILABLE_THRESHOLD && !self.unavailable {
            self.unavailable = true;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn becomes_unavailable_after_threshold() {
        let mut h = ServerHealth::default();
        let now = OffsetDateTime::UNIX_EPOCH;
        for _ in 0..ServerHealth::UNAVAILABLE_THRESHOLD - 1 {
            assert!(!h.record_failure(now));
        }
        assert!(h.record_failure(now));
        assert!(h.unavailable);
        h.record_success(now);
        assert!(!h.unavailable);
        assert_eq!(h.consecutive_failures, 0);
    }
}
