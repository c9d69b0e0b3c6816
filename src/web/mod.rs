use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use salvo::affix_state;
use salvo::prelude::*;
use tracing::info;

use crate::config::Config;
use crate::monitor::MonitorService;

pub mod handlers;
pub mod metrics;
pub mod middleware;

use self::handlers::{health, items, tasks};
use self::metrics::metrics_endpoint;
use self::middleware::cors::cors_handler;

#[derive(Clone)]
pub struct WebState {
    pub monitor: Arc<MonitorService>,
    pub started_at: Instant,
}

impl WebState {
    pub fn new(monitor: Arc<MonitorService>) -> Self {
        Self {
            monitor,
            started_at: Instant::now(),
        }
    }
}

fn task_router() -> Router {
    Router::with_path("tasks")
        .get(tasks::list_tasks)
        .post(tasks::create_task)
        .push(Router::with_path("pending").get(tasks::pending_tasks))
        .push(
            Router::with_path("chat/{chat_id}")
                .get(tasks::list_tasks_by_chat)
                .delete(tasks::delete_tasks_by_chat),
        )
        .push(
            Router::with_path("{task_id}")
                .get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task)
                .push(Router::with_path("update-last-got-item").post(tasks::mark_task_served))
                .push(Router::with_path("items-to-send").get(tasks::items_to_send)),
        )
}

fn item_router() -> Router {
    Router::with_path("items")
        .get(items::list_items)
        .post(items::create_item)
        .push(Router::with_path("by-source").get(items::list_items_by_source))
        .push(Router::with_path("recent").get(items::recent_items))
        .push(Router::with_path("by-url/{**item_url}").get(items::get_item_by_url))
        .push(Router::with_path("cleanup/older-than/{days}").delete(items::cleanup_items))
        .push(
            Router::with_path("{item_id}")
                .get(items::get_item)
                .delete(items::delete_item),
        )
}

pub fn create_router(state: WebState) -> Router {
    Router::new()
        .hoop(affix_state::inject(state))
        .get(health::root)
        .push(Router::with_path("health").get(health::health_check))
        .push(Router::with_path("metrics").get(metrics_endpoint))
        .push(
            Router::with_path("api/v1")
                .push(task_router())
                .push(item_router()),
        )
}

pub fn create_service(state: WebState) -> Service {
    Service::new(create_router(state)).hoop(cors_handler())
}

pub struct WebServer {
    config: Arc<Config>,
    state: WebState,
}

impl WebServer {
    pub fn new(config: Arc<Config>, monitor: Arc<MonitorService>) -> Self {
        Self {
            config,
            state: WebState::new(monitor),
        }
    }

    pub async fn start(self) -> Result<()> {
        let bind_addr = self.config.server.bind_addr();
        info!("Starting web server on {}", bind_addr);

        let acceptor = TcpListener::new(bind_addr).bind().await;
        let server = Server::new(acceptor);
        let handle = server.handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received shutdown signal");
                handle.stop_graceful(None);
            }
        });

        server.serve(create_service(self.state)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use salvo::prelude::*;
    use salvo::test::{ResponseExt, TestClient};
    use serde_json::{Value, json};
    use tempfile::NamedTempFile;

    use super::{WebState, create_service};
    use crate::config::{DatabaseConfig, MonitorConfig};
    use crate::db::DatabaseManager;
    use crate::monitor::MonitorService;

    const BASE: &str = "http://127.0.0.1:8000";
    const SEARCH_URL: &str = "https://www.olx.pl/d/oferty/q-rower/";

    async fn test_service(file: &NamedTempFile) -> Service {
        let config = DatabaseConfig {
            url: Some(format!("sqlite://{}", file.path().to_string_lossy())),
            ..Default::default()
        };
        let manager = DatabaseManager::new(&config).await.unwrap();
        manager.migrate().await.unwrap();
        let monitor = Arc::new(MonitorService::new(&manager, MonitorConfig::default()));
        create_service(WebState::new(monitor))
    }

    async fn post_json(service: &Service, path: &str, body: Value) -> (StatusCode, Value) {
        let mut res = TestClient::post(format!("{BASE}{path}"))
            .json(&body)
            .send(service)
            .await;
        let status = res.status_code.unwrap_or(StatusCode::OK);
        (status, res.take_json::<Value>().await.unwrap_or(Value::Null))
    }

    async fn get_json(service: &Service, path: &str) -> (StatusCode, Value) {
        let mut res = TestClient::get(format!("{BASE}{path}")).send(service).await;
        let status = res.status_code.unwrap_or(StatusCode::OK);
        (status, res.take_json::<Value>().await.unwrap_or(Value::Null))
    }

    async fn delete(service: &Service, path: &str) -> StatusCode {
        let res = TestClient::delete(format!("{BASE}{path}")).send(service).await;
        res.status_code.unwrap_or(StatusCode::OK)
    }

    #[tokio::test]
    async fn root_and_health_respond() {
        let file = NamedTempFile::new().unwrap();
        let service = test_service(&file).await;

        let (status, body) = get_json(&service, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "OLX Database API is running");

        let (status, body) = get_json(&service, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "healthy", "service": "olx-database-api" }));
    }

    #[tokio::test]
    async fn metrics_are_prometheus_text() {
        let file = NamedTempFile::new().unwrap();
        let service = test_service(&file).await;

        let mut res = TestClient::get(format!("{BASE}/metrics")).send(&service).await;
        assert_eq!(res.status_code.unwrap_or(StatusCode::OK), StatusCode::OK);
        let text = res.take_string().await.unwrap();
        assert!(text.contains("olx_uptime_seconds"));
    }

    #[tokio::test]
    async fn task_lifecycle_over_http() {
        let file = NamedTempFile::new().unwrap();
        let service = test_service(&file).await;

        let (status, body) = get_json(&service, "/api/v1/tasks").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "tasks": [], "total": 0 }));

        let (status, task) = post_json(
            &service,
            "/api/v1/tasks",
            json!({ "chat_id": "c1", "name": "n1", "url": SEARCH_URL }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{task}");
        let id = task["id"].as_i64().unwrap();
        assert_eq!(task["frequency_minutes"], 1);
        assert!(task["last_got_item"].is_null());

        let (status, fetched) = get_json(&service, &format!("/api/v1/tasks/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["name"], "n1");

        let mut res = TestClient::put(format!("{BASE}/api/v1/tasks/{id}"))
            .json(&json!({ "name": "renamed" }))
            .send(&service)
            .await;
        assert_eq!(res.status_code.unwrap_or(StatusCode::OK), StatusCode::OK);
        let renamed = res.take_json::<Value>().await.unwrap();
        assert_eq!(renamed["name"], "renamed");
        assert_eq!(renamed["url"], SEARCH_URL);

        assert_eq!(
            delete(&service, &format!("/api/v1/tasks/{id}")).await,
            StatusCode::NO_CONTENT
        );
        let (status, body) = get_json(&service, &format!("/api/v1/tasks/{id}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn task_errors_map_to_status_codes() {
        let file = NamedTempFile::new().unwrap();
        let service = test_service(&file).await;
        let payload = json!({ "chat_id": "c4", "name": "n1", "url": SEARCH_URL });

        let (status, _) = post_json(&service, "/api/v1/tasks", payload.clone()).await;
        assert_eq!(status, StatusCode::CREATED);

        // same url in the same chat
        let (status, _) = post_json(&service, "/api/v1/tasks", payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // same name, different url
        let (status, _) = post_json(
            &service,
            "/api/v1/tasks",
            json!({ "chat_id": "c4", "name": "n1", "url": "https://www.olx.pl/d/oferty/q-inne/" }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = post_json(&service, "/api/v1/tasks", json!({ "chat_id": "c4" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(&service, "/api/v1/tasks/not-a-number").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut res = TestClient::put(format!("{BASE}/api/v1/tasks/999"))
            .json(&json!({ "name": "new_name" }))
            .send(&service)
            .await;
        assert_eq!(res.status_code.unwrap_or(StatusCode::OK), StatusCode::NOT_FOUND);
        assert!(res.take_json::<Value>().await.unwrap()["detail"].is_string());

        assert_eq!(delete(&service, "/api/v1/tasks/999").await, StatusCode::NOT_FOUND);
        let (status, _) =
            post_json(&service, "/api/v1/tasks/999/update-last-got-item", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get_json(&service, "/api/v1/tasks/999/items-to-send").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_listing_pending_and_delete_by_chat() {
        let file = NamedTempFile::new().unwrap();
        let service = test_service(&file).await;

        for i in 0..2 {
            let (status, _) = post_json(
                &service,
                "/api/v1/tasks",
                json!({
                    "chat_id": "c2",
                    "name": format!("n{i}"),
                    "url": format!("https://www.olx.pl/d/oferty/q-{i}/"),
                }),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = get_json(&service, "/api/v1/tasks/chat/c2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);

        let (status, body) = get_json(&service, "/api/v1/tasks/pending").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tasks"].as_array().unwrap().len(), 2);

        assert_eq!(
            delete(&service, "/api/v1/tasks/chat/c2?name=missing").await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            delete(&service, "/api/v1/tasks/chat/c2?name=n0").await,
            StatusCode::NO_CONTENT
        );
        assert_eq!(delete(&service, "/api/v1/tasks/chat/c2").await, StatusCode::NO_CONTENT);
        assert_eq!(delete(&service, "/api/v1/tasks/chat/c2").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn served_task_only_receives_newer_items() {
        let file = NamedTempFile::new().unwrap();
        let service = test_service(&file).await;

        let (_, task) = post_json(
            &service,
            "/api/v1/tasks",
            json!({ "chat_id": "c3", "name": "n", "url": SEARCH_URL }),
        )
        .await;
        let id = task["id"].as_i64().unwrap();

        let (status, _) = post_json(
            &service,
            "/api/v1/items",
            json!({ "item_url": "https://www.olx.pl/item/a", "source_url": SEARCH_URL }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        // never served: the default lookback still covers item a
        let (status, batch) = get_json(&service, &format!("/api/v1/tasks/{id}/items-to-send")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(batch["count"], 1);
        assert_eq!(batch["task_name"], "n");
        assert_eq!(batch["chat_id"], "c3");

        let (status, body) =
            post_json(&service, &format!("/api/v1/tasks/{id}/update-last-got-item"), json!({}))
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Last got item timestamp updated successfully");

        post_json(
            &service,
            "/api/v1/items",
            json!({ "item_url": "https://www.olx.pl/item/b", "source_url": SEARCH_URL }),
        )
        .await;

        let (_, batch) = get_json(&service, &format!("/api/v1/tasks/{id}/items-to-send")).await;
        let urls: Vec<&str> = batch["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["item_url"].as_str().unwrap())
            .collect();
        assert_eq!(urls, vec!["https://www.olx.pl/item/b"]);

        // served just now, so no longer pending with the default frequency
        let (_, pending) = get_json(&service, "/api/v1/tasks/pending").await;
        assert_eq!(pending["total"], 0);
    }

    #[tokio::test]
    async fn item_endpoints() {
        let file = NamedTempFile::new().unwrap();
        let service = test_service(&file).await;
        let payload = json!({
            "item_url": "https://www.olx.pl/item/1",
            "source_url": "https://www.olx.pl/d/oferty/q-foo/",
            "title": "Item 1",
            "price": "100 PLN",
            "location": "Warsaw",
            "created_at": "2025-01-10T09:30:00",
            "created_at_pretty": "today",
            "description": "desc",
        });

        let (status, item) = post_json(&service, "/api/v1/items", payload.clone()).await;
        assert_eq!(status, StatusCode::CREATED, "{item}");
        assert_eq!(item["source"], "OLX");
        assert_eq!(item["created_at"], "2025-01-10T09:30:00Z");
        let id = item["id"].as_i64().unwrap();

        let (status, body) = post_json(&service, "/api/v1/items", payload).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["detail"].as_str().unwrap().contains("already exists"));

        let (status, body) = get_json(&service, "/api/v1/items?skip=0&limit=10").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["items"][0]["title"], "Item 1");

        let (status, fetched) = get_json(&service, &format!("/api/v1/items/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, item);

        let (status, fetched) =
            get_json(&service, "/api/v1/items/by-url/https%3A%2F%2Fwww.olx.pl%2Fitem%2F1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["id"], id);

        let (status, body) = get_json(
            &service,
            "/api/v1/items/by-source?source_url=https%3A%2F%2Fwww.olx.pl%2Fd%2Foferty%2Fq-foo%2F&limit=5",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);

        let (status, body) = get_json(&service, "/api/v1/items/recent?hours=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);

        let mut res = TestClient::delete(format!("{BASE}/api/v1/items/cleanup/older-than/1"))
            .send(&service)
            .await;
        assert_eq!(res.status_code.unwrap_or(StatusCode::OK), StatusCode::OK);
        let report = res.take_json::<Value>().await.unwrap();
        assert_eq!(report["deleted_count"], 0);
        assert_eq!(report["message"], "Deleted 0 items older than 1 days");

        assert_eq!(
            delete(&service, &format!("/api/v1/items/{id}")).await,
            StatusCode::NO_CONTENT
        );
        assert_eq!(
            delete(&service, &format!("/api/v1/items/{id}")).await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn item_query_parameters_are_validated() {
        let file = NamedTempFile::new().unwrap();
        let service = test_service(&file).await;

        for path in [
            "/api/v1/items?limit=0",
            "/api/v1/items?limit=1001",
            "/api/v1/items?skip=-1",
            "/api/v1/items?limit=abc",
            "/api/v1/items/recent?hours=169",
            "/api/v1/items/by-source",
            "/api/v1/items/by-source?source_url=x&limit=10001",
        ] {
            let (status, body) = get_json(&service, path).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{path}: {body}");
            assert!(body["detail"].is_string());
        }

        let mut res = TestClient::delete(format!("{BASE}/api/v1/items/cleanup/older-than/0"))
            .send(&service)
            .await;
        assert_eq!(res.status_code.unwrap_or(StatusCode::OK), StatusCode::BAD_REQUEST);
        assert!(res.take_json::<Value>().await.unwrap()["detail"].is_string());

        let (status, _) = post_json(&service, "/api/v1/items", json!({ "item_url": "x" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
