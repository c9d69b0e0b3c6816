use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::DatabaseError;
use super::models::{
    DeletedItem, ItemRecord, MonitoringTask, MonitoringTaskChanges, NewItemRecord,
    NewMonitoringTask,
};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<MonitoringTask>, DatabaseError>;
    async fn list_tasks_by_chat(&self, chat_id: &str) -> Result<Vec<MonitoringTask>, DatabaseError>;
    async fn get_task_by_id(&self, id: i64) -> Result<Option<MonitoringTask>, DatabaseError>;
    async fn get_task_by_chat_and_name(
        &self,
        chat_id: &str,
        name: &str,
    ) -> Result<Option<MonitoringTask>, DatabaseError>;
    /// Whether `chat_id` already monitors `url`, ignoring the task `exclude_id`.
    async fn has_url_for_chat(
        &self,
        chat_id: &str,
        url: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, DatabaseError>;
    async fn create_task(&self, task: &NewMonitoringTask) -> Result<MonitoringTask, DatabaseError>;
    async fn update_task(
        &self,
        id: i64,
        changes: &MonitoringTaskChanges,
    ) -> Result<Option<MonitoringTask>, DatabaseError>;
    async fn delete_task(&self, id: i64) -> Result<bool, DatabaseError>;
    /// Deletes every task of a chat, or only the one called `name`. Returns the number removed.
    async fn delete_tasks_by_chat(
        &self,
        chat_id: &str,
        name: Option<&str>,
    ) -> Result<usize, DatabaseError>;
    /// Moves `last_got_item` forward to `at`; an existing later value is kept.
    async fn mark_task_served(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<MonitoringTask>, DatabaseError>;
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn create_item(&self, item: &NewItemRecord) -> Result<ItemRecord, DatabaseError>;
    async fn get_item_by_id(&self, id: i64) -> Result<Option<ItemRecord>, DatabaseError>;
    async fn get_item_by_url(&self, item_url: &str) -> Result<Option<ItemRecord>, DatabaseError>;
    async fn list_items(&self, offset: i64, limit: i64) -> Result<Vec<ItemRecord>, DatabaseError>;
    async fn count_items(&self) -> Result<i64, DatabaseError>;
    /// Newest first.
    async fn list_items_by_source_url(
        &self,
        source_url: &str,
        limit: i64,
    ) -> Result<Vec<ItemRecord>, DatabaseError>;
    /// Items of `source_url` first seen strictly after `after`, oldest first.
    async fn list_items_seen_after(
        &self,
        source_url: &str,
        after: DateTime<Utc>,
    ) -> Result<Vec<ItemRecord>, DatabaseError>;
    /// Items of any source first seen strictly after `since`, newest first.
    async fn list_items_seen_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ItemRecord>, DatabaseError>;
    async fn delete_item(&self, id: i64) -> Result<bool, DatabaseError>;
    /// Removes items first seen strictly before `cutoff`.
    async fn delete_items_seen_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DeletedItem>, DatabaseError>;
}
