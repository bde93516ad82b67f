//! Background repair scheduler (spec §4.12, C12): periodically re-verifies
//! that previously-indexed files are still fetchable, and repairs or removes
//! the ones that aren't.

use std::sync::Arc;
use std::time::Duration;

use nzb_net::UsenetClient;
use nzb_types::{next_check_after, ArticleId, FileId, HealthCheckRecord};
use rand::seq::SliceRandom;
use time::OffsetDateTime;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigSnapshot;
use crate::error::{Error, Result};
use crate::store::{
    with_retry, ArrClient, HealthCheckQueueItem, NotificationSink, PersistenceStore, RetryPolicy,
};

/// Disabled-loop poll interval (spec §4.12 step 1).
const DISABLED_POLL: Duration = Duration::from_secs(5);

/// Loop-restart backoff ladder after an unexpected panic/error escapes one
/// iteration (spec §9 "the loop itself must never die silently; restart with
/// exponential backoff").
const RESTART_BACKOFF: &[Duration] = &[
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(20),
    Duration::from_secs(40),
    Duration::from_secs(80),
    Duration::from_secs(160),
    Duration::from_secs(300),
];

/// Caps restarts to 10/hour (spec §9); beyond that the ladder just holds at
/// its last step instead of spinning tighter.
const MAX_RESTARTS_PER_HOUR: u32 = 10;

/// Outcome of one file's health check, used only for logging/notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    Healthy,
    Repaired,
    Deleted,
    ActionNeeded,
}

/// Everything the repair loop needs that isn't already captured by
/// [`ConfigSnapshot`]: the persistence store, the client, the arr-clients,
/// and the notification sink.
pub struct RepairContext {
    pub store: Arc<dyn PersistenceStore>,
    pub client: Arc<UsenetClient>,
    pub arr_clients: Vec<Arc<dyn ArrClient>>,
    pub notifications: Arc<dyn NotificationSink>,
}

/// Runs the repair loop forever, restarting on error with exponential
/// backoff (spec §4.12, §9). Intended to be spawned as its own background
/// task; honors `cancel` for shutdown.
pub async fn run(ctx: RepairContext, config_fn: impl Fn() -> ConfigSnapshot, cancel: CancellationToken) {
    let mut restart_count = 0u32;
    let mut window_start = OffsetDateTime::now_utc();

    loop {
        if cancel.is_cancelled() {
            return;
        }
        match run_loop(&ctx, &config_fn, &cancel).await {
            Ok(()) => return,
            Err(e) => {
                log::error!("repair loop exited unexpectedly: {e}; restarting");
                ctx.notifications.notify("queue-error", &e.to_string());

                let now = OffsetDateTime::now_utc();
                if now - window_start > time::Duration::hours(1) {
                    window_start = now;
                    restart_count = 0;
                }
                let step = (restart_count as usize).min(RESTART_BACKOFF.len() - 1);
                if restart_count >= MAX_RESTARTS_PER_HOUR {
                    log::error!("repair loop exceeded {MAX_RESTARTS_PER_HOUR} restarts in the last hour");
                }
                restart_count += 1;
                tokio::time::sleep(RESTART_BACKOFF[step]).await;
            }
        }
    }
}

/// One pass of the loop body (spec §4.12 steps 1-4), returning only on
/// cancellation; any other failure propagates to [`run`] for restart.
async fn run_loop(
    ctx: &RepairContext,
    config_fn: &impl Fn() -> ConfigSnapshot,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let config = config_fn();
        if !config.repair_enable {
            tokio::time::sleep(DISABLED_POLL).await;
            continue;
        }

        let k = config.parallel_files().max(1);
        let _reservations = ctx.client.reserve_all(config.repair_connections);

        let queue = ctx
            .store
            .get_health_check_queue_items(k as usize)
            .await?;
        if queue.is_empty() {
            tokio::time::sleep(DISABLED_POLL).await;
            continue;
        }

        let per_file_connections = (config.repair_connections / k).max(1);

        let mut handles = Vec::with_capacity(queue.len());
        for item in queue {
            let client = ctx.client.clone();
            let store = ctx.store.clone();
            let arr_clients = ctx.arr_clients.clone();
            let notifications = ctx.notifications.clone();
            let config = config.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                perform_health_check(
                    item,
                    &config,
                    client,
                    store,
                    &arr_clients,
                    notifications,
                    per_file_connections,
                    &cancel,
                )
                .await
            }));
        }
        for handle in handles {
            if let Ok(Err(e)) = handle.await {
                log::warn!("health check failed for a file: {e}");
            }
        }
    }
}

/// Checks one file's articles and repairs/deletes it if unhealthy (spec
/// §4.12 `performHealthCheck`).
#[allow(clippy::too_many_arguments)]
async fn perform_health_check(
    item: HealthCheckQueueItem,
    config: &ConfigSnapshot,
    client: Arc<UsenetClient>,
    store: Arc<dyn PersistenceStore>,
    arr_clients: &[Arc<dyn ArrClient>],
    notifications: Arc<dyn NotificationSink>,
    connections: u32,
    cancel: &CancellationToken,
) -> Result<()> {
    let segments = item.segments.segments();
    let n = segments.len();
    if n == 0 {
        return Ok(());
    }

    let release_date = match item.release_date {
        Some(rd) => Some(rd),
        None => bootstrap_release_date(config, &segments[0].article_id).await,
    };

    let rate = sampling_rate(config, release_date);
    let sample_count = ((rate * n as f64).ceil() as u32)
        .max(config.min_segments())
        .min(n as u32) as usize;

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rand::thread_rng());
    let sample = &indices[..sample_count];

    // Probe this file's sample at up to `connections` in flight at once
    // (spec §4.12 step 4's per-file share of `maxRepairConnections`).
    let width = (connections as usize).max(1);
    let mut missing: Option<ArticleId> = None;
    'outer: for chunk in sample.chunks(width) {
        let mut set = JoinSet::new();
        for &idx in chunk {
            let id = segments[idx].article_id.clone();
            let client = client.clone();
            let cancel = cancel.clone();
            set.spawn(async move {
                let result = client.probe_exists(&id, true, &cancel).await;
                (id, result)
            });
        }
        while let Some(joined) = set.join_next().await {
            let (id, result) = joined
                .map_err(|e| Error::ActionNeeded(format!("health check task panicked: {e}")))?;
            match result {
                Ok(true) => {}
                Ok(false) => missing = Some(id),
                Err(e) => return Err(Error::Net(e)),
            }
        }
        if missing.is_some() {
            break 'outer;
        }
    }

    match missing {
        None => {
            let now = OffsetDateTime::now_utc();
            let next = next_check_after(now, release_date);
            let record = HealthCheckRecord {
                file_id: item.file_id,
                last_check: Some(now),
                next_check: Some(next),
                release_date,
            };
            with_retry(&RetryPolicy::persistence_default(), || {
                store.update_health_check(item.file_id, record.clone())
            })
            .await?;
            notifications.notify("ha", &format!("{:?}", item.file_id));
            Ok(())
        }
        Some(_missing_id) => {
            handle_unhealthy(item, config, store, arr_clients, notifications).await
        }
    }
}

/// Computes the age-adaptive sampling rate (spec §4.12): below the base rate
/// for old files, above it for very new ones.
fn sampling_rate(config: &ConfigSnapshot, release_date: Option<OffsetDateTime>) -> f64 {
    let base = config.sampling_rate();
    if !config.repair_adaptive_sampling {
        return base;
    }
    let Some(rd) = release_date else {
        return base;
    };
    let age = OffsetDateTime::now_utc() - rd;
    if age < time::Duration::days(30) {
        (2.0 * base).min(1.0)
    } else if age < time::Duration::days(180) {
        base
    } else if age < time::Duration::days(365) {
        (0.67 * base).max(0.05)
    } else {
        (0.33 * base).max(0.05)
    }
}

/// Reads the first article's header to recover a release date when none is
/// on file yet (spec §4.12 "if `releaseDate` unknown, read header of first
/// article to populate it"). Best-effort: returns `None` rather than failing
/// the whole health check if the bootstrap itself fails.
async fn bootstrap_release_date(config: &ConfigSnapshot, id: &ArticleId) -> Option<OffsetDateTime> {
    let server = config.servers.first()?;
    let mut conn = nzb_net::connect_adhoc(server, None).await.ok()?;
    let raw = conn.head(id).await.ok()?;
    let text = String::from_utf8_lossy(&raw);
    let date_line = text.lines().find(|line| line.to_ascii_lowercase().starts_with("date:"))?;
    let value = date_line.splitn(2, ':').nth(1)?.trim();
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc2822).ok()
}

/// Handles an article confirmed missing (spec §4.12 `UsenetArticleNotFound`
/// branch): blacklist check, library-link check, arr-client repair, or
/// delete, in that order.
async fn handle_unhealthy(
    item: HealthCheckQueueItem,
    config: &ConfigSnapshot,
    store: Arc<dyn PersistenceStore>,
    arr_clients: &[Arc<dyn ArrClient>],
    notifications: Arc<dyn NotificationSink>,
) -> Result<()> {
    let blacklisted = config
        .download_extension_blacklist
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(&item.extension));

    if blacklisted {
        return delete_and_record(item.file_id, store, notifications).await;
    }

    let Some(link_path) = item.library_link.as_deref() else {
        return delete_and_record(item.file_id, store, notifications).await;
    };

    let owning = item
        .owning_arr_client
        .as_deref()
        .and_then(|name| arr_clients.iter().find(|c| c.name() == name));

    let Some(client) = owning else {
        return delete_and_record(item.file_id, store, notifications).await;
    };

    match client.remove_and_search(link_path).await {
        Ok(true) => {
            with_retry(&RetryPolicy::persistence_default(), || store.delete_file(item.file_id))
                .await?;
            notifications.notify("hr", &format!("{:?}", item.file_id));
            Ok(())
        }
        Ok(false) => delete_and_record(item.file_id, store, notifications).await,
        Err(e) => {
            let record = HealthCheckRecord {
                file_id: item.file_id,
                last_check: Some(OffsetDateTime::now_utc()),
                next_check: None,
                release_date: item.release_date,
            };
            with_retry(&RetryPolicy::persistence_default(), || {
                store.update_health_check(item.file_id, record.clone())
            })
            .await?;
            notifications.notify("queue-error", &format!("{:?}: {e}", item.file_id));
            Err(Error::ActionNeeded(format!("{:?}: {e}", item.file_id)))
        }
    }
}

async fn delete_and_record(
    file_id: FileId,
    store: Arc<dyn PersistenceStore>,
    notifications: Arc<dyn NotificationSink>,
) -> Result<()> {
    with_retry(&RetryPolicy::persistence_default(), || store.delete_file(file_id)).await?;
    notifications.notify("hs", &format!("{file_id:?}"));
    Ok(())
}
