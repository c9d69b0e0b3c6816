use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringTask {
    pub id: i64,
    pub chat_id: String,
    pub name: String,
    pub url: String,
    pub frequency_minutes: i32,
    pub last_updated: DateTime<Utc>,
    pub last_got_item: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewMonitoringTask {
    pub chat_id: String,
    pub name: String,
    pub url: String,
    pub frequency_minutes: i32,
    pub last_updated: DateTime<Utc>,
}

/// Partial update of a task; `None` fields are left untouched.
#[derive(Debug, Clone)]
pub struct MonitoringTaskChanges {
    pub name: Option<String>,
    pub url: Option<String>,
    pub frequency_minutes: Option<i32>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: i64,
    pub item_url: String,
    pub source_url: String,
    pub title: Option<String>,
    pub price: Option<String>,
    pub location: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_at_pretty: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub first_seen: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewItemRecord {
    pub item_url: String,
    pub source_url: String,
    pub title: Option<String>,
    pub price: Option<String>,
    pub location: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_at_pretty: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub first_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedItem {
    pub id: i64,
    pub item_url: String,
}
