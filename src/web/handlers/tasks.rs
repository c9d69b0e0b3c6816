use chrono::Utc;
use salvo::prelude::*;
use serde_json::json;

use crate::monitor::{MonitorError, TaskCreate, TaskUpdate};
use crate::web::handlers::{monitor, parse_body, path_id, render_monitor_error};
use crate::web::metrics::Metrics;

fn chat_id_param(req: &Request) -> Result<String, MonitorError> {
    match req.param::<String>("chat_id") {
        Some(chat_id) if !chat_id.is_empty() => Ok(chat_id),
        _ => Err(MonitorError::Validation("missing chat_id".to_string())),
    }
}

#[handler]
pub async fn list_tasks(depot: &mut Depot, res: &mut Response) {
    let result = async { monitor(depot)?.list_tasks().await }.await;

    match result {
        Ok(tasks) => res.render(Json(json!({ "total": tasks.len(), "tasks": tasks }))),
        Err(err) => render_monitor_error(res, err),
    }
}

#[handler]
pub async fn create_task(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let request = parse_body::<TaskCreate>(req).await?;
        monitor(depot)?.create_task(request, Utc::now()).await
    }
    .await;

    match result {
        Ok(task) => {
            Metrics::task_created();
            res.status_code(StatusCode::CREATED);
            res.render(Json(task));
        }
        Err(err) => render_monitor_error(res, err),
    }
}

#[handler]
pub async fn pending_tasks(depot: &mut Depot, res: &mut Response) {
    let result = async { monitor(depot)?.pending_tasks(Utc::now()).await }.await;

    match result {
        Ok(tasks) => res.render(Json(json!({ "total": tasks.len(), "tasks": tasks }))),
        Err(err) => render_monitor_error(res, err),
    }
}

#[handler]
pub async fn list_tasks_by_chat(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let chat_id = chat_id_param(req)?;
        monitor(depot)?.list_tasks_by_chat(&chat_id).await
    }
    .await;

    match result {
        Ok(tasks) => res.render(Json(json!({ "total": tasks.len(), "tasks": tasks }))),
        Err(err) => render_monitor_error(res, err),
    }
}

/// Deletes every task of a chat, or only the one given by `?name=`.
#[handler]
pub async fn delete_tasks_by_chat(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let chat_id = chat_id_param(req)?;
        let name = req.query::<String>("name");
        monitor(depot)?
            .delete_tasks_by_chat(&chat_id, name.as_deref())
            .await
    }
    .await;

    match result {
        Ok(removed) => {
            Metrics::tasks_deleted(removed as u64);
            res.status_code(StatusCode::NO_CONTENT);
        }
        Err(err) => render_monitor_error(res, err),
    }
}

#[handler]
pub async fn get_task(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let task_id = path_id(req, "task_id")?;
        monitor(depot)?.get_task(task_id).await
    }
    .await;

    match result {
        Ok(task) => res.render(Json(task)),
        Err(err) => render_monitor_error(res, err),
    }
}

#[handler]
pub async fn update_task(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let task_id = path_id(req, "task_id")?;
        let request = parse_body::<TaskUpdate>(req).await?;
        monitor(depot)?
            .update_task(task_id, request, Utc::now())
            .await
    }
    .await;

    match result {
        Ok(task) => res.render(Json(task)),
        Err(err) => render_monitor_error(res, err),
    }
}

#[handler]
pub async fn delete_task(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let task_id = path_id(req, "task_id")?;
        monitor(depot)?.delete_task(task_id).await
    }
    .await;

    match result {
        Ok(()) => {
            Metrics::tasks_deleted(1);
            res.status_code(StatusCode::NO_CONTENT);
        }
        Err(err) => render_monitor_error(res, err),
    }
}

#[handler]
pub async fn mark_task_served(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let task_id = path_id(req, "task_id")?;
        monitor(depot)?.mark_task_served(task_id, Utc::now()).await
    }
    .await;

    match result {
        Ok(_) => {
            Metrics::task_served();
            res.render(Json(json!({
                "message": "Last got item timestamp updated successfully"
            })));
        }
        Err(err) => render_monitor_error(res, err),
    }
}

#[handler]
pub async fn items_to_send(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let result = async {
        let task_id = path_id(req, "task_id")?;
        monitor(depot)?.items_to_send(task_id, Utc::now()).await
    }
    .await;

    match result {
        Ok(batch) => {
            Metrics::items_sent(batch.count as u64);
            res.render(Json(batch));
        }
        Err(err) => render_monitor_error(res, err),
    }
}
