//! Persistent per-file health-check bookkeeping (spec §3, `HealthCheckRecord`)
//! and the `nextCheck` scheduling arithmetic used by the repair scheduler (C12,
//! spec §4.12).

use time::{Date, Duration, OffsetDateTime, Time};

/// Adds `dur` to `dt`, saturating at the representable range instead of
/// panicking — release dates and check timestamps are attacker/corruption
/// adjacent inputs (an NZB can claim any release date), so arithmetic on them
/// must never panic (spec §8).
fn saturating_add(dt: OffsetDateTime, dur: Duration) -> OffsetDateTime {
    dt.checked_add(dur)
        .unwrap_or_else(|| Date::MAX.with_time(Time::MIDNIGHT).assume_utc())
}

/// A 128-bit stable file identifier used to key segment descriptors and
/// health-check records (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u128);

/// Persistent health-check bookkeeping for one stored file (spec §3,
/// `HealthCheckRecord`).
///
/// Invariant: if `release_date` and `last_check` are both set, `next_check` is
/// at most `last_check + min(2*(last_check - release_date), 365d)`, and at
/// most `now + 365d` — always computed via [`next_check_after`], which
/// saturates rather than overflowing/wrapping (spec §8).
#[derive(Debug, Clone)]
pub struct HealthCheckRecord {
    pub file_id: FileId,
    pub last_check: Option<OffsetDateTime>,
    pub next_check: Option<OffsetDateTime>,
    pub release_date: Option<OffsetDateTime>,
}

/// One year, used both as the cap on the age-based backoff and as the
/// absolute cap relative to `now` (spec §4.12, §8).
pub const MAX_RECHECK_INTERVAL: Duration = Duration::days(365);

/// Computes the next health-check time for a file that just passed a check at
/// `now`, given its `release_date` (spec §4.12):
///
/// `next_check = now + clamp(2 * (now - release_date), 0, 365d)`, and the
/// result is never later than `now + 365d` (redundant with the clamp above,
/// but kept explicit per spec §9's directive that implementers MUST cap —
/// one observed source variant omitted this and could overflow for very old
/// release dates).
pub fn next_check_after(now: OffsetDateTime, release_date: Option<OffsetDateTime>) -> OffsetDateTime {
    let age = match release_date {
        Some(rd) if rd <= now => now - rd,
        _ => Duration::ZERO,
    };
    let doubled = age.saturating_mul(2);
    let backoff = doubled.clamp(Duration::ZERO, MAX_RECHECK_INTERVAL);
    let candidate = saturating_add(now, backoff);
    candidate.min(saturating_add(now, MAX_RECHECK_INTERVAL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_at_one_year_for_old_releases() {
        let now = OffsetDateTime::UNIX_EPOCH + Duration::days(365 * 40);
        let release = OffsetDateTime::UNIX_EPOCH;
        let next = next_check_after(now, Some(release));
        assert_eq!(next, now + MAX_RECHECK_INTERVAL);
    }

    #[test]
    fn recent_release_scales_with_age() {
        let release = OffsetDateTime::UNIX_EPOCH;
        let now = release + Duration::days(10);
        let next = next_check_after(now, Some(release));
        assert_eq!(next, now + Duration::days(20));
    }

    #[test]
    fn missing_release_date_means_no_backoff() {
        let now = OffsetDateTime::UNIX_EPOCH + Duration::days(100);
        let next = next_check_after(now, None);
        assert_eq!(next, now);
    }

    #[test]
    fn never_exceeds_one_year_from_now() {
        // Even a pre-2000 release date, decades before `now`, must not push
        // `next_check` beyond `now + 365d`.
        let release = OffsetDateTime::UNIX_EPOCH - Duration::days(365 * 60);
        let now = OffsetDateTime::UNIX_EPOCH;
        let next = next_check_after(now, Some(release));
        assert!(next <= now + MAX_RECHECK_INTERVAL);
    }
}
