use std::sync::atomic::{AtomicU64, Ordering};

use salvo::http::header::{CONTENT_TYPE, HeaderValue};
use salvo::prelude::*;

use crate::web::WebState;

static TASKS_CREATED: AtomicU64 = AtomicU64::new(0);
static TASKS_DELETED: AtomicU64 = AtomicU64::new(0);
static TASKS_SERVED: AtomicU64 = AtomicU64::new(0);
static ITEMS_CREATED: AtomicU64 = AtomicU64::new(0);
static ITEMS_DUPLICATE: AtomicU64 = AtomicU64::new(0);
static ITEMS_SENT: AtomicU64 = AtomicU64::new(0);
static ITEMS_CLEANED_UP: AtomicU64 = AtomicU64::new(0);
static REQUEST_ERRORS: AtomicU64 = AtomicU64::new(0);

pub struct Metrics;

impl Metrics {
    pub fn task_created() {
        TASKS_CREATED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tasks_deleted(count: u64) {
        TASKS_DELETED.fetch_add(count, Ordering::Relaxed);
    }

    pub fn task_served() {
        TASKS_SERVED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn item_created() {
        ITEMS_CREATED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn item_duplicate() {
        ITEMS_DUPLICATE.fetch_add(1, Ordering::Relaxed);
    }

    pub fn items_sent(count: u64) {
        ITEMS_SENT.fetch_add(count, Ordering::Relaxed);
    }

    pub fn items_cleaned_up(count: u64) {
        ITEMS_CLEANED_UP.fetch_add(count, Ordering::Relaxed);
    }

    pub fn request_error() {
        REQUEST_ERRORS.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn format_prometheus(uptime_seconds: u64) -> String {
    let counters = [
        (
            "olx_tasks_created_total",
            "Number of monitoring tasks created",
            &TASKS_CREATED,
        ),
        (
            "olx_tasks_deleted_total",
            "Number of monitoring tasks deleted",
            &TASKS_DELETED,
        ),
        (
            "olx_tasks_served_total",
            "Number of times a task was marked as served",
            &TASKS_SERVED,
        ),
        (
            "olx_items_created_total",
            "Number of item records stored",
            &ITEMS_CREATED,
        ),
        (
            "olx_items_duplicate_total",
            "Number of item records rejected because the URL was already stored",
            &ITEMS_DUPLICATE,
        ),
        (
            "olx_items_sent_total",
            "Number of items returned by items-to-send",
            &ITEMS_SENT,
        ),
        (
            "olx_items_cleaned_up_total",
            "Number of item records removed by cleanup",
            &ITEMS_CLEANED_UP,
        ),
        (
            "olx_request_errors_total",
            "Number of requests answered with a server error",
            &REQUEST_ERRORS,
        ),
    ];

    let mut output = format!(
        "# HELP olx_uptime_seconds Number of seconds the service has been running\n\
         # TYPE olx_uptime_seconds gauge\n\
         olx_uptime_seconds {uptime_seconds}\n"
    );
    for (name, help, counter) in counters {
        output.push_str(&format!(
            "\n# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n",
            counter.load(Ordering::Relaxed)
        ));
    }
    output
}

#[handler]
pub async fn metrics_endpoint(depot: &mut Depot, res: &mut Response) {
    let uptime = depot
        .obtain::<WebState>()
        .map(|state| state.started_at.elapsed().as_secs())
        .unwrap_or_default();

    res.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    res.body(format_prometheus(uptime));
}
