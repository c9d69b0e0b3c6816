use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::MonitorConfig;
use crate::db::{
    DatabaseError, DatabaseManager, DeletedItem, ItemRecord, ItemStore, MonitoringTask,
    MonitoringTaskChanges, NewItemRecord, NewMonitoringTask, TaskStore,
};
use crate::utils::time::deserialize_optional_timestamp;

pub(crate) mod logic;

use self::logic::{
    CLEANUP_DAYS_RANGE, PAGE_LIMIT_RANGE, RECENT_HOURS_RANGE, SOURCE_LIMIT_RANGE, check_frequency,
    check_http_url, check_not_blank, check_range, check_task_name,
};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(DatabaseError),
}

impl From<DatabaseError> for MonitorError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Conflict(message) => MonitorError::Conflict(message),
            other => MonitorError::Database(other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskCreate {
    pub chat_id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub frequency_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub frequency_minutes: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemCreate {
    pub item_url: String,
    pub source_url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at_pretty: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemsToSend {
    pub task_id: i64,
    pub task_name: String,
    pub chat_id: String,
    pub items: Vec<ItemRecord>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub days: i64,
    pub cutoff: DateTime<Utc>,
    pub deleted: Vec<DeletedItem>,
}

pub struct MonitorService {
    tasks: Arc<dyn TaskStore>,
    items: Arc<dyn ItemStore>,
    config: MonitorConfig,
}

impl MonitorService {
    pub fn new(db: &DatabaseManager, config: MonitorConfig) -> Self {
        Self {
            tasks: db.task_store(),
            items: db.item_store(),
            config,
        }
    }

    pub async fn list_tasks(&self) -> Result<Vec<MonitoringTask>, MonitorError> {
        Ok(self.tasks.list_tasks().await?)
    }

    pub async fn list_tasks_by_chat(
        &self,
        chat_id: &str,
    ) -> Result<Vec<MonitoringTask>, MonitorError> {
        Ok(self.tasks.list_tasks_by_chat(chat_id).await?)
    }

    pub async fn get_task(&self, id: i64) -> Result<MonitoringTask, MonitorError> {
        self.tasks
            .get_task_by_id(id)
            .await?
            .ok_or_else(|| task_not_found(id))
    }

    pub async fn create_task(
        &self,
        request: TaskCreate,
        now: DateTime<Utc>,
    ) -> Result<MonitoringTask, MonitorError> {
        check_not_blank("chat_id", &request.chat_id).map_err(MonitorError::Validation)?;
        check_task_name(&request.name).map_err(MonitorError::Validation)?;
        check_http_url("url", &request.url).map_err(MonitorError::Validation)?;
        let frequency_minutes = match request.frequency_minutes {
            Some(value) => value,
            None => self.default_frequency(),
        };
        check_frequency(frequency_minutes).map_err(MonitorError::Validation)?;

        if self
            .tasks
            .has_url_for_chat(&request.chat_id, &request.url, None)
            .await?
        {
            return Err(MonitorError::Validation(format!(
                "URL {} is already being monitored in chat {}",
                request.url, request.chat_id
            )));
        }

        if self
            .tasks
            .get_task_by_chat_and_name(&request.chat_id, &request.name)
            .await?
            .is_some()
        {
            return Err(MonitorError::Conflict(format!(
                "task named '{}' already exists in chat {}",
                request.name, request.chat_id
            )));
        }

        let task = self
            .tasks
            .create_task(&NewMonitoringTask {
                chat_id: request.chat_id,
                name: request.name,
                url: request.url,
                frequency_minutes,
                last_updated: now,
            })
            .await?;

        info!(
            "created monitoring task {} '{}' for chat {}",
            task.id, task.name, task.chat_id
        );
        Ok(task)
    }

    pub async fn update_task(
        &self,
        id: i64,
        request: TaskUpdate,
        now: DateTime<Utc>,
    ) -> Result<MonitoringTask, MonitorError> {
        let existing = self.get_task(id).await?;

        if let Some(name) = &request.name {
            check_task_name(name).map_err(MonitorError::Validation)?;
        }
        if let Some(frequency) = request.frequency_minutes {
            check_frequency(frequency).map_err(MonitorError::Validation)?;
        }
        if let Some(url) = &request.url {
            check_http_url("url", url).map_err(MonitorError::Validation)?;
            if url != &existing.url
                && self
                    .tasks
                    .has_url_for_chat(&existing.chat_id, url, Some(id))
                    .await?
            {
                return Err(MonitorError::Validation(format!(
                    "URL {} is already being monitored in chat {}",
                    url, existing.chat_id
                )));
            }
        }

        let changes = MonitoringTaskChanges {
            name: request.name,
            url: request.url,
            frequency_minutes: request.frequency_minutes,
            last_updated: now,
        };

        let task = self
            .tasks
            .update_task(id, &changes)
            .await?
            .ok_or_else(|| task_not_found(id))?;

        info!("updated monitoring task {}", task.id);
        Ok(task)
    }

    pub async fn delete_task(&self, id: i64) -> Result<(), MonitorError> {
        if !self.tasks.delete_task(id).await? {
            return Err(task_not_found(id));
        }
        info!("deleted monitoring task {}", id);
        Ok(())
    }

    /// Deletes all tasks of a chat, or only the one called `name`.
    pub async fn delete_tasks_by_chat(
        &self,
        chat_id: &str,
        name: Option<&str>,
    ) -> Result<usize, MonitorError> {
        let removed = self.tasks.delete_tasks_by_chat(chat_id, name).await?;
        if removed == 0 {
            return Err(MonitorError::NotFound(match name {
                Some(name) => format!("task '{name}' not found in chat {chat_id}"),
                None => format!("no tasks found for chat {chat_id}"),
            }));
        }
        info!("deleted {} monitoring task(s) of chat {}", removed, chat_id);
        Ok(removed)
    }

    pub async fn pending_tasks(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<MonitoringTask>, MonitorError> {
        let tasks = self.tasks.list_tasks().await?;
        let total = tasks.len();
        let due = logic::select_due_tasks(tasks, now);
        debug!("{} of {} tasks are due", due.len(), total);
        Ok(due)
    }

    pub async fn mark_task_served(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<MonitoringTask, MonitorError> {
        let task = self
            .tasks
            .mark_task_served(id, now)
            .await?
            .ok_or_else(|| task_not_found(id))?;
        debug!("task {} served at {}", id, now);
        Ok(task)
    }

    pub async fn items_to_send(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<ItemsToSend, MonitorError> {
        let task = self.get_task(id).await?;
        let since = logic::items_window_start(
            task.last_got_item,
            now,
            self.config.default_lookback_minutes(),
        );
        let items = self.items.list_items_seen_after(&task.url, since).await?;
        debug!("task {} has {} item(s) after {}", id, items.len(), since);

        Ok(ItemsToSend {
            task_id: task.id,
            task_name: task.name,
            chat_id: task.chat_id,
            count: items.len(),
            items,
        })
    }

    pub async fn list_items(
        &self,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<ItemRecord>, i64), MonitorError> {
        if skip < 0 {
            return Err(MonitorError::Validation(format!(
                "skip cannot be negative, got {skip}"
            )));
        }
        let limit = check_range("limit", limit, &PAGE_LIMIT_RANGE).map_err(MonitorError::Validation)?;

        let items = self.items.list_items(skip, limit).await?;
        let total = self.items.count_items().await?;
        Ok((items, total))
    }

    pub async fn list_items_by_source_url(
        &self,
        source_url: &str,
        limit: i64,
    ) -> Result<Vec<ItemRecord>, MonitorError> {
        check_not_blank("source_url", source_url).map_err(MonitorError::Validation)?;
        let limit =
            check_range("limit", limit, &SOURCE_LIMIT_RANGE).map_err(MonitorError::Validation)?;
        Ok(self.items.list_items_by_source_url(source_url, limit).await?)
    }

    pub async fn recent_items(
        &self,
        hours: i64,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ItemRecord>, MonitorError> {
        let hours =
            check_range("hours", hours, &RECENT_HOURS_RANGE).map_err(MonitorError::Validation)?;
        let limit = check_range("limit", limit, &PAGE_LIMIT_RANGE).map_err(MonitorError::Validation)?;
        let since = logic::recent_window_start(now, hours);
        Ok(self.items.list_items_seen_since(since, limit).await?)
    }

    pub async fn get_item(&self, id: i64) -> Result<ItemRecord, MonitorError> {
        self.items
            .get_item_by_id(id)
            .await?
            .ok_or_else(|| MonitorError::NotFound(format!("item with ID {id} not found")))
    }

    pub async fn get_item_by_url(&self, item_url: &str) -> Result<ItemRecord, MonitorError> {
        self.items
            .get_item_by_url(item_url)
            .await?
            .ok_or_else(|| MonitorError::NotFound(format!("item with URL {item_url} not found")))
    }

    /// Stores a scraped item. An already known `item_url` is rejected and the
    /// stored record is left as it was.
    pub async fn create_item(
        &self,
        request: ItemCreate,
        now: DateTime<Utc>,
    ) -> Result<ItemRecord, MonitorError> {
        check_http_url("item_url", &request.item_url).map_err(MonitorError::Validation)?;
        check_not_blank("source_url", &request.source_url).map_err(MonitorError::Validation)?;

        if self.items.get_item_by_url(&request.item_url).await?.is_some() {
            return Err(MonitorError::Conflict(format!(
                "item with URL {} already exists",
                request.item_url
            )));
        }

        let source = request
            .source
            .filter(|source| !source.trim().is_empty())
            .or_else(|| logic::detect_source(&request.item_url).map(str::to_string));

        let item = self
            .items
            .create_item(&NewItemRecord {
                item_url: request.item_url,
                source_url: request.source_url,
                title: request.title,
                price: request.price,
                location: request.location,
                created_at: request.created_at,
                created_at_pretty: request.created_at_pretty,
                image_url: request.image_url,
                description: request.description,
                source,
                first_seen: now,
            })
            .await?;

        debug!("stored item {} from {}", item.id, item.source_url);
        Ok(item)
    }

    pub async fn delete_item(&self, id: i64) -> Result<(), MonitorError> {
        if !self.items.delete_item(id).await? {
            return Err(MonitorError::NotFound(format!("item with ID {id} not found")));
        }
        info!("deleted item {}", id);
        Ok(())
    }

    pub async fn cleanup_items_older_than(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport, MonitorError> {
        let days =
            check_range("days", days, &CLEANUP_DAYS_RANGE).map_err(MonitorError::Validation)?;
        let cutoff = logic::cleanup_cutoff(now, days);
        let deleted = self.items.delete_items_seen_before(cutoff).await?;

        info!(
            "cleaned up {} item(s) first seen before {}",
            deleted.len(),
            cutoff
        );
        Ok(CleanupReport {
            days,
            cutoff,
            deleted,
        })
    }

    fn default_frequency(&self) -> i32 {
        i32::try_from(self.config.default_sending_frequency_minutes).unwrap_or(i32::MAX)
    }
}

fn task_not_found(id: i64) -> MonitorError {
    MonitorError::NotFound(format!("task with ID {id} not found"))
}
