use std::ops::RangeInclusive;

use chrono::{DateTime, Duration, Utc};

use crate::db::MonitoringTask;

pub(crate) const MAX_TASK_NAME_CHARS: usize = 64;
pub(crate) const PAGE_LIMIT_RANGE: RangeInclusive<i64> = 1..=1000;
pub(crate) const SOURCE_LIMIT_RANGE: RangeInclusive<i64> = 1..=10_000;
pub(crate) const RECENT_HOURS_RANGE: RangeInclusive<i64> = 1..=168;
pub(crate) const CLEANUP_DAYS_RANGE: RangeInclusive<i64> = 1..=36_500;

/// A task is due when at least `frequency_minutes` have passed since it was
/// last checked. A task that was never checked is always due.
pub(crate) fn is_due(
    now: DateTime<Utc>,
    last_checked: Option<DateTime<Utc>>,
    frequency_minutes: i64,
) -> bool {
    match last_checked {
        None => true,
        Some(last) => now - last >= Duration::minutes(frequency_minutes),
    }
}

pub(crate) fn select_due_tasks(tasks: Vec<MonitoringTask>, now: DateTime<Utc>) -> Vec<MonitoringTask> {
    tasks
        .into_iter()
        .filter(|task| is_due(now, task.last_got_item, i64::from(task.frequency_minutes)))
        .collect()
}

/// Exclusive lower bound on `first_seen` for the items a task should receive.
pub(crate) fn items_window_start(
    last_got_item: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    default_lookback_minutes: i64,
) -> DateTime<Utc> {
    last_got_item.unwrap_or_else(|| now - Duration::minutes(default_lookback_minutes))
}

pub(crate) fn cleanup_cutoff(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}

pub(crate) fn recent_window_start(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    now - Duration::hours(hours)
}

/// Provider name derived from the listing host, used when the scraper sends none.
pub(crate) fn detect_source(item_url: &str) -> Option<&'static str> {
    let host = url::Url::parse(item_url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))?;

    if host_matches(&host, "olx.pl") {
        Some("OLX")
    } else if host_matches(&host, "otodom.pl") {
        Some("Otodom")
    } else {
        None
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

pub(crate) fn check_range(
    name: &str,
    value: i64,
    range: &RangeInclusive<i64>,
) -> Result<i64, String> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(format!(
            "{name} must be between {} and {}, got {value}",
            range.start(),
            range.end()
        ))
    }
}

pub(crate) fn check_not_blank(name: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{name} cannot be empty"))
    } else {
        Ok(())
    }
}

pub(crate) fn check_task_name(value: &str) -> Result<(), String> {
    check_not_blank("name", value)?;
    if value.chars().count() > MAX_TASK_NAME_CHARS {
        return Err(format!(
            "name cannot be longer than {MAX_TASK_NAME_CHARS} characters"
        ));
    }
    Ok(())
}

pub(crate) fn check_http_url(name: &str, value: &str) -> Result<(), String> {
    check_not_blank(name, value)?;
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        Ok(parsed) => Err(format!(
            "{name} must use http or https, got {}",
            parsed.scheme()
        )),
        Err(err) => Err(format!("{name} is not a valid URL: {err}")),
    }
}

pub(crate) fn check_frequency(value: i32) -> Result<(), String> {
    if value < 1 {
        Err(format!("frequency_minutes must be at least 1, got {value}"))
    } else {
        Ok(())
    }
}
