//! External collaborator trait boundaries (spec §6): the core only defines
//! the narrow interfaces it consumes; persistence, the arr-clients, and the
//! notification sink are implemented by the embedding application.

use std::time::Duration;

use async_trait::async_trait;
use nzb_types::{ContainerEntry, FileId, HealthCheckRecord, MultipartVirtualFile, VirtualFile};
use time::OffsetDateTime;

use crate::error::Result;

/// One of the three shapes a stored file can take (spec §3): a plain NZB
/// file, a multipart file, or a single entry inside a container.
#[derive(Debug, Clone)]
pub enum StoredFile {
    Nzb(VirtualFile),
    Multipart(MultipartVirtualFile),
    ContainerEntry(ContainerEntry),
}

/// One row the repair scheduler (C12) pulls off the health-check queue
/// (spec §4.12): everything `performHealthCheck` needs about one file
/// without a second round-trip to persistence.
#[derive(Debug, Clone)]
pub struct HealthCheckQueueItem {
    pub file_id: FileId,
    pub segments: VirtualFile,
    pub extension: String,
    pub library_link: Option<String>,
    pub owning_arr_client: Option<String>,
    pub release_date: Option<OffsetDateTime>,
}

/// The narrow persistence contract the core consumes (spec §6). Treated as
/// synchronous-friendly (short transactions); the core wraps calls in
/// [`with_retry`] to get the "3 attempts, 100 ms / 500 ms / 1 s backoff"
/// policy spec §6 asks for.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn get_nzb_file(&self, id: FileId) -> Result<VirtualFile>;
    async fn get_multipart_file(&self, id: FileId) -> Result<MultipartVirtualFile>;
    async fn get_container_entry(&self, id: FileId) -> Result<ContainerEntry>;
    async fn get_health_check_queue_items(&self, limit: usize) -> Result<Vec<HealthCheckQueueItem>>;
    async fn update_health_check(&self, id: FileId, record: HealthCheckRecord) -> Result<()>;
    async fn delete_file(&self, id: FileId) -> Result<()>;
}

/// The surface of an external media-manager client the repair loop uses
/// (spec §6, "External media-manager clients").
#[async_trait]
pub trait ArrClient: Send + Sync {
    fn name(&self) -> &str;
    async fn list_root_folders(&self) -> Result<Vec<String>>;
    /// Returning `Ok(false)` means "I could not find that item"; the repair
    /// loop then falls through to delete (spec §6).
    async fn remove_and_search(&self, link_path: &str) -> Result<bool>;
}

/// Receives short status messages `(topic, payload)` (spec §6,
/// "Notification sink"). The core itself only ever emits the topics named in
/// the spec (`qs`, `qp`, `qa`, `qr`, `ha`, `hr`, `hs`, `hp`, `queue-error`);
/// payload formatting is an application concern.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, topic: &str, payload: &str);
}

/// Retry policy: attempt count plus the delay before each retry (spec §9
/// "Retries with fixed backoff tables": "expose as a small retry policy
/// value `{ attempts, delays[] }`").
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub delays: Vec<Duration>,
}

impl RetryPolicy {
    /// The policy spec §6 names for persistence calls: 3 attempts with
    /// 100 ms / 500 ms / 1 s backoff between them.
    pub fn persistence_default() -> Self {
        Self {
            attempts: 3,
            delays: vec![
                Duration::from_millis(100),
                Duration::from_millis(500),
                Duration::from_secs(1),
            ],
        }
    }
}

/// Runs `op` under `policy`, retrying only [`Error::StorageTransient`]
/// failures (spec §7 "`StorageTransient`... if it persists past the retry
/// budget, promoted to fatal for the operation").
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_storage_transient() && attempt < policy.attempts.saturating_sub(1) => {
                if let Some(delay) = policy.delays.get(attempt) {
                    tokio::time::sleep(*delay).await;
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
