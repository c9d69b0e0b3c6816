use chrono::Utc;
use salvo::prelude::*;
use serde_json::json;

use crate::monitor::{ItemCreate, MonitorError};
use crate::web::handlers::{monitor, parse_body, path_id, query_or, render_monitor_error};
use crate::web::metrics::Metrics;

const DEFAULT_LIMIT: i64 = 100;
const DEFAULT_RECENT_HOURS: i64 = 24;

/// The router drops empty path segments, which turns `https://host` into
/// `https:/host` in a catch-all parameter. Put the second slash back.
fn restore_scheme_slashes(raw: &str) -> String {
    for scheme in ["https:/", "http:/"] {
        if let Some(rest) = raw.strip_prefix(scheme) {
            if !rest.starts_with('/') {
                return format!("{scheme}/{rest}");
            }
        }
    }
    raw.to_string()
}

#[handler]
pub async fn list_items(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let skip = query_or(req, "skip", 0i64)?;
        let limit = query_or(req, "limit", DEFAULT_LIMIT)?;
        monitor(depot)?.list_items(skip, limit).await
    }
    .await;

    match result {
        Ok((items, total)) => res.render(Json(json!({ "items": items, "total": total }))),
        Err(err) => render_monitor_error(res, err),
    }
}

#[handler]
pub async fn create_item(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let request = parse_body::<ItemCreate>(req).await?;
        monitor(depot)?.create_item(request, Utc::now()).await
    }
    .await;

    match result {
        Ok(item) => {
            Metrics::item_created();
            res.status_code(StatusCode::CREATED);
            res.render(Json(item));
        }
        Err(err) => {
            if matches!(err, MonitorError::Conflict(_)) {
                Metrics::item_duplicate();
            }
            render_monitor_error(res, err);
        }
    }
}

#[handler]
pub async fn list_items_by_source(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let source_url = req.query::<String>("source_url").ok_or_else(|| {
            MonitorError::Validation("missing source_url query parameter".to_string())
        })?;
        let limit = query_or(req, "limit", DEFAULT_LIMIT)?;
        monitor(depot)?
            .list_items_by_source_url(&source_url, limit)
            .await
    }
    .await;

    match result {
        Ok(items) => res.render(Json(json!({ "total": items.len(), "items": items }))),
        Err(err) => render_monitor_error(res, err),
    }
}

#[handler]
pub async fn recent_items(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let hours = query_or(req, "hours", DEFAULT_RECENT_HOURS)?;
        let limit = query_or(req, "limit", DEFAULT_LIMIT)?;
        monitor(depot)?.recent_items(hours, limit, Utc::now()).await
    }
    .await;

    match result {
        Ok(items) => res.render(Json(json!({ "total": items.len(), "items": items }))),
        Err(err) => render_monitor_error(res, err),
    }
}

#[handler]
pub async fn get_item_by_url(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let raw = req.param::<String>("item_url").unwrap_or_default();
        if raw.is_empty() {
            return Err(MonitorError::Validation("missing item_url".to_string()));
        }
        let item_url = restore_scheme_slashes(&raw);
        monitor(depot)?.get_item_by_url(&item_url).await
    }
    .await;

    match result {
        Ok(item) => res.render(Json(item)),
        Err(err) => render_monitor_error(res, err),
    }
}

#[handler]
pub async fn get_item(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let item_id = path_id(req, "item_id")?;
        monitor(depot)?.get_item(item_id).await
    }
    .await;

    match result {
        Ok(item) => res.render(Json(item)),
        Err(err) => render_monitor_error(res, err),
    }
}

#[handler]
pub async fn delete_item(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let item_id = path_id(req, "item_id")?;
        monitor(depot)?.delete_item(item_id).await
    }
    .await;

    match result {
        Ok(()) => {
            res.status_code(StatusCode::NO_CONTENT);
        }
        Err(err) => render_monitor_error(res, err),
    }
}

#[handler]
pub async fn cleanup_items(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let days = path_id(req, "days")?;
        monitor(depot)?
            .cleanup_items_older_than(days, Utc::now())
            .await
    }
    .await;

    match result {
        Ok(report) => {
            Metrics::items_cleaned_up(report.deleted.len() as u64);
            res.render(Json(json!({
                "message": format!(
                    "Deleted {} items older than {} days",
                    report.deleted.len(),
                    report.days
                ),
                "deleted_count": report.deleted.len(),
                "deleted_items": report.deleted,
            })));
        }
        Err(err) => render_monitor_error(res, err),
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::restore_scheme_slashes;

    #[test_case("https:/www.olx.pl/d/oferta/1" => "https://www.olx.pl/d/oferta/1")]
    #[test_case("http:/olx.pl/a" => "http://olx.pl/a")]
    #[test_case("https://www.olx.pl/d/oferta/1" => "https://www.olx.pl/d/oferta/1" ; "already intact")]
    #[test_case("www.olx.pl/a" => "www.olx.pl/a" ; "no scheme")]
    fn restore_scheme_slashes_repairs_collapsed_urls(raw: &str) -> String {
        restore_scheme_slashes(raw)
    }
}
