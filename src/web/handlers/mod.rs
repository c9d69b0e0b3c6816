use std::str::FromStr;
use std::sync::Arc;

use salvo::prelude::*;
use serde_json::json;
use tracing::error;

use crate::monitor::{MonitorError, MonitorService};
use crate::web::WebState;
use crate::web::metrics::Metrics;

pub mod health;
pub mod items;
pub mod tasks;

pub(crate) fn render_error(res: &mut Response, status: StatusCode, message: &str) {
    res.status_code(status);
    res.render(Json(json!({ "detail": message })));
}

pub(crate) fn render_monitor_error(res: &mut Response, err: MonitorError) {
    match err {
        MonitorError::NotFound(message) => render_error(res, StatusCode::NOT_FOUND, &message),
        MonitorError::Validation(message) => render_error(res, StatusCode::BAD_REQUEST, &message),
        MonitorError::Conflict(message) => render_error(res, StatusCode::CONFLICT, &message),
        MonitorError::Database(err) => {
            error!("database error: {}", err);
            Metrics::request_error();
            render_error(
                res,
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("database error: {}", err),
            );
        }
    }
}

pub(crate) fn monitor(depot: &Depot) -> Result<Arc<MonitorService>, MonitorError> {
    depot
        .obtain::<WebState>()
        .map(|state| state.monitor.clone())
        .map_err(|_| {
            MonitorError::Database(crate::db::DatabaseError::Connection(
                "web state is not initialized".to_string(),
            ))
        })
}

/// Reads an optional query parameter, falling back to `default` when absent.
pub(crate) fn query_or<T: FromStr>(req: &Request, name: &str, default: T) -> Result<T, MonitorError> {
    match req.query::<String>(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            MonitorError::Validation(format!("query parameter {name} is invalid: {raw:?}"))
        }),
    }
}

pub(crate) fn path_id(req: &Request, name: &str) -> Result<i64, MonitorError> {
    let raw = req.param::<String>(name).unwrap_or_default();
    raw.parse::<i64>().map_err(|_| {
        MonitorError::Validation(format!("path parameter {name} must be an integer, got {raw:?}"))
    })
}

pub(crate) async fn parse_body<T>(req: &mut Request) -> Result<T, MonitorError>
where
    T: serde::de::DeserializeOwned + Send,
{
    req.parse_json::<T>()
        .await
        .map_err(|err| MonitorError::Validation(format!("invalid request body: {err}")))
}
