use crate::domain::model::Timestamp;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Current time in milliseconds, truncated to whole seconds.
pub fn now() -> Timestamp {
    truncate_to_seconds(Utc::now().timestamp_millis())
}

pub fn truncate_to_seconds(millis: Timestamp) -> Timestamp {
    millis.div_euclid(1000) * 1000
}

/// Whether a run at `last` is still valid at `now` given a re-fetch
/// interval in seconds. `last <= 0` means the job never ran.
pub fn is_up_to_date(now: Timestamp, last: Timestamp, interval_seconds: u64) -> bool {
    if last <= 0 {
        tracing::info!("Never run: run now");
        return false;
    }

    let interval_millis = i64::try_from(interval_seconds)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000);
    let boundary = last.saturating_add(interval_millis);
    let up_to_date = now <= boundary;

    tracing::info!(now, boundary, up_to_date, "Run now?");
    up_to_date
}

/// Modification time of the stored artifact, which is the marker of the
/// last successful run. A missing or unreadable file counts as never run.
pub fn last_run<P: AsRef<Path>>(path: P) -> Timestamp {
    std::fs::metadata(path.as_ref())
        .and_then(|meta| meta.modified())
        .map(|modified| truncate_to_seconds(DateTime::<Utc>::from(modified).timestamp_millis()))
        .unwrap_or(0)
}
