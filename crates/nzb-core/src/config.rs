//! Per-operation configuration snapshot (spec §6) and the environment
//! variables the core itself consults (`CONNECTIONS_PER_STREAM`, `MOUNT_DIR`,
//! `MIN_WORKER_THREADS`, `MIN_IO_THREADS`, `MAX_IO_THREADS`).
//!
//! A `ConfigSnapshot` is a plain struct built once per operation from
//! whatever the embedding application's config layer provides; this module
//! owns no file watcher or live-reload machinery.

use std::path::PathBuf;

use nzb_types::ServerConfig;

/// A single point-in-time view of the options listed in spec §6's table.
/// Readers take a snapshot per operation rather than observing a live,
/// mutable config object (spec §5, "Server-config snapshot: single writer;
/// readers take an immutable snapshot per operation").
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub servers: Vec<ServerConfig>,
    pub connections_per_stream: usize,
    pub repair_enable: bool,
    pub repair_connections: u32,
    pub repair_sampling_rate: f64,
    pub repair_min_segments: u32,
    pub repair_adaptive_sampling: bool,
    pub repair_cache_enabled: bool,
    pub repair_cache_ttl_hours: u64,
    pub repair_parallel_files: u32,
    pub download_extension_blacklist: Vec<String>,
    pub mount_dir: Option<PathBuf>,
    pub min_worker_threads: Option<usize>,
    pub min_io_threads: Option<usize>,
    pub max_io_threads: Option<usize>,
}

impl ConfigSnapshot {
    /// Builds a snapshot from `servers` plus whatever the process
    /// environment says, applying the same clamps the application's config
    /// layer would (spec §6: sampling rate `[0.05, 1.0]`, min-segments
    /// `[1, 100]`, parallel-files `[1, 10]`).
    pub fn from_env(servers: Vec<ServerConfig>) -> Self {
        Self {
            servers,
            connections_per_stream: env_usize("CONNECTIONS_PER_STREAM").unwrap_or(5),
            repair_enable: false,
            repair_connections: 4,
            repair_sampling_rate: 0.1_f64.clamp(0.05, 1.0),
            repair_min_segments: 5u32.clamp(1, 100),
            repair_adaptive_sampling: true,
            repair_cache_enabled: true,
            repair_cache_ttl_hours: 24,
            repair_parallel_files: 3u32.clamp(1, 10),
            download_extension_blacklist: Vec::new(),
            mount_dir: std::env::var_os("MOUNT_DIR").map(PathBuf::from),
            min_worker_threads: env_usize("MIN_WORKER_THREADS"),
            min_io_threads: env_usize("MIN_IO_THREADS"),
            max_io_threads: env_usize("MAX_IO_THREADS"),
        }
    }

    pub fn sampling_rate(&self) -> f64 {
        self.repair_sampling_rate.clamp(0.05, 1.0)
    }

    pub fn min_segments(&self) -> u32 {
        self.repair_min_segments.clamp(1, 100)
    }

    pub fn parallel_files(&self) -> u32 {
        self.repair_parallel_files.clamp(1, 10)
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_within_clamp_ranges() {
        let cfg = ConfigSnapshot::from_env(Vec::new());
        assert!(cfg.sampling_rate() >= 0.05 && cfg.sampling_rate() <= 1.0);
        assert!(cfg.min_segments() >= 1 && cfg.min_segments() <= 100);
        assert!(cfg.parallel_files() >= 1 && cfg.parallel_files() <= 10);
    }
}
