use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::db::schema_sqlite::{item_records, monitoring_tasks};

use super::{
    DatabaseError,
    models::{
        DeletedItem, ItemRecord, MonitoringTask, MonitoringTaskChanges, NewItemRecord,
        NewMonitoringTask,
    },
};

// Fixed-width UTC text so that string comparison in SQL matches time order
pub(crate) fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("invalid datetime format: {}", e)))
}

fn optional_datetime(s: Option<&str>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    s.map(string_to_datetime).transpose()
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = monitoring_tasks)]
struct DbMonitoringTask {
    id: i64,
    chat_id: String,
    name: String,
    url: String,
    frequency_minutes: i32,
    last_updated: String,
    last_got_item: Option<String>,
}

impl DbMonitoringTask {
    fn to_task(&self) -> Result<MonitoringTask, DatabaseError> {
        Ok(MonitoringTask {
            id: self.id,
            chat_id: self.chat_id.clone(),
            name: self.name.clone(),
            url: self.url.clone(),
            frequency_minutes: self.frequency_minutes,
            last_updated: string_to_datetime(&self.last_updated)?,
            last_got_item: optional_datetime(self.last_got_item.as_deref())?,
        })
    }
}

fn rows_to_tasks(rows: Vec<DbMonitoringTask>) -> Result<Vec<MonitoringTask>, DatabaseError> {
    rows.iter().map(DbMonitoringTask::to_task).collect()
}

#[derive(Insertable)]
#[diesel(table_name = monitoring_tasks)]
struct NewTaskRow<'a> {
    chat_id: &'a str,
    name: &'a str,
    url: &'a str,
    frequency_minutes: i32,
    last_updated: String,
}

#[derive(AsChangeset)]
#[diesel(table_name = monitoring_tasks)]
struct TaskChangeset<'a> {
    name: Option<&'a str>,
    url: Option<&'a str>,
    frequency_minutes: Option<i32>,
    last_updated: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = item_records)]
struct DbItemRecord {
    id: i64,
    item_url: String,
    source_url: String,
    title: Option<String>,
    price: Option<String>,
    location: Option<String>,
    created_at: Option<String>,
    created_at_pretty: Option<String>,
    image_url: Option<String>,
    description: Option<String>,
    source: Option<String>,
    first_seen: String,
}

impl DbItemRecord {
    fn to_item(&self) -> Result<ItemRecord, DatabaseError> {
        Ok(ItemRecord {
            id: self.id,
            item_url: self.item_url.clone(),
            source_url: self.source_url.clone(),
            title: self.title.clone(),
            price: self.price.clone(),
            location: self.location.clone(),
            created_at: optional_datetime(self.created_at.as_deref())?,
            created_at_pretty: self.created_at_pretty.clone(),
            image_url: self.image_url.clone(),
            description: self.description.clone(),
            source: self.source.clone(),
            first_seen: string_to_datetime(&self.first_seen)?,
        })
    }
}

fn rows_to_items(rows: Vec<DbItemRecord>) -> Result<Vec<ItemRecord>, DatabaseError> {
    rows.iter().map(DbItemRecord::to_item).collect()
}

#[derive(Insertable)]
#[diesel(table_name = item_records)]
struct NewItemRow<'a> {
    item_url: &'a str,
    source_url: &'a str,
    title: Option<&'a str>,
    price: Option<&'a str>,
    location: Option<&'a str>,
    created_at: Option<String>,
    created_at_pretty: Option<&'a str>,
    image_url: Option<&'a str>,
    description: Option<&'a str>,
    source: Option<&'a str>,
    first_seen: String,
}

pub(crate) fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    let mut conn = SqliteConnection::establish(path)
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    // wait for the file lock instead of failing with SQLITE_BUSY
    diesel::sql_query("PRAGMA busy_timeout = 5000")
        .execute(&mut conn)
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    Ok(conn)
}

async fn with_connection<T, F>(db_path: Arc<String>, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = establish_connection(&db_path)?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

pub struct SqliteTaskStore {
    db_path: Arc<String>,
}

impl SqliteTaskStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::TaskStore for SqliteTaskStore {
    async fn list_tasks(&self) -> Result<Vec<MonitoringTask>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::monitoring_tasks::dsl::*;
            let rows = monitoring_tasks
                .order(id.asc())
                .select(DbMonitoringTask::as_select())
                .load::<DbMonitoringTask>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            rows_to_tasks(rows)
        })
        .await
    }

    async fn list_tasks_by_chat(&self, chat: &str) -> Result<Vec<MonitoringTask>, DatabaseError> {
        let chat = chat.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::monitoring_tasks::dsl::*;
            let rows = monitoring_tasks
                .filter(chat_id.eq(chat))
                .order(id.asc())
                .select(DbMonitoringTask::as_select())
                .load::<DbMonitoringTask>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            rows_to_tasks(rows)
        })
        .await
    }

    async fn get_task_by_id(&self, task_id: i64) -> Result<Option<MonitoringTask>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::monitoring_tasks::dsl::*;
            monitoring_tasks
                .filter(id.eq(task_id))
                .select(DbMonitoringTask::as_select())
                .first::<DbMonitoringTask>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|row| row.to_task())
                .transpose()
        })
        .await
    }

    async fn get_task_by_chat_and_name(
        &self,
        chat: &str,
        task_name: &str,
    ) -> Result<Option<MonitoringTask>, DatabaseError> {
        let chat = chat.to_string();
        let task_name = task_name.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::monitoring_tasks::dsl::*;
            monitoring_tasks
                .filter(chat_id.eq(chat))
                .filter(name.eq(task_name))
                .select(DbMonitoringTask::as_select())
                .first::<DbMonitoringTask>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|row| row.to_task())
                .transpose()
        })
        .await
    }

    async fn has_url_for_chat(
        &self,
        chat: &str,
        task_url: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, DatabaseError> {
        let chat = chat.to_string();
        let task_url = task_url.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::monitoring_tasks::dsl::*;
            let mut query = monitoring_tasks
                .filter(chat_id.eq(chat))
                .filter(url.eq(task_url))
                .select(id)
                .into_boxed();
            if let Some(excluded) = exclude_id {
                query = query.filter(id.ne(excluded));
            }
            query
                .first::<i64>(conn)
                .optional()
                .map(|found| found.is_some())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn create_task(&self, task: &NewMonitoringTask) -> Result<MonitoringTask, DatabaseError> {
        let task = task.clone();
        with_connection(self.db_path.clone(), move |conn| {
            let row = NewTaskRow {
                chat_id: &task.chat_id,
                name: &task.name,
                url: &task.url,
                frequency_minutes: task.frequency_minutes,
                last_updated: datetime_to_string(&task.last_updated),
            };

            let inserted = conn
                .transaction::<_, diesel::result::Error, _>(|conn| {
                    diesel::insert_into(monitoring_tasks::table)
                        .values(&row)
                        .execute(conn)?;

                    monitoring_tasks::table
                        .filter(monitoring_tasks::chat_id.eq(&task.chat_id))
                        .filter(monitoring_tasks::name.eq(&task.name))
                        .select(DbMonitoringTask::as_select())
                        .first::<DbMonitoringTask>(conn)
                })
                .map_err(DatabaseError::from)?;

            inserted.to_task()
        })
        .await
    }

    async fn update_task(
        &self,
        task_id: i64,
        changes: &MonitoringTaskChanges,
    ) -> Result<Option<MonitoringTask>, DatabaseError> {
        let changes = changes.clone();
        with_connection(self.db_path.clone(), move |conn| {
            let changeset = TaskChangeset {
                name: changes.name.as_deref(),
                url: changes.url.as_deref(),
                frequency_minutes: changes.frequency_minutes,
                last_updated: datetime_to_string(&changes.last_updated),
            };

            let updated = conn
                .transaction::<_, diesel::result::Error, _>(|conn| {
                    let count = diesel::update(
                        monitoring_tasks::table.filter(monitoring_tasks::id.eq(task_id)),
                    )
                    .set(changeset)
                    .execute(conn)?;

                    if count == 0 {
                        return Ok(None);
                    }

                    monitoring_tasks::table
                        .filter(monitoring_tasks::id.eq(task_id))
                        .select(DbMonitoringTask::as_select())
                        .first::<DbMonitoringTask>(conn)
                        .optional()
                })
                .map_err(DatabaseError::from)?;

            updated.map(|row| row.to_task()).transpose()
        })
        .await
    }

    async fn delete_task(&self, task_id: i64) -> Result<bool, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            diesel::delete(monitoring_tasks::table.filter(monitoring_tasks::id.eq(task_id)))
                .execute(conn)
                .map(|count| count > 0)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_tasks_by_chat(
        &self,
        chat: &str,
        task_name: Option<&str>,
    ) -> Result<usize, DatabaseError> {
        let chat = chat.to_string();
        let task_name = task_name.map(str::to_string);
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::monitoring_tasks::dsl::*;
            match task_name {
                Some(task_name) => diesel::delete(
                    monitoring_tasks
                        .filter(chat_id.eq(chat))
                        .filter(name.eq(task_name)),
                )
                .execute(conn),
                None => diesel::delete(monitoring_tasks.filter(chat_id.eq(chat))).execute(conn),
            }
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn mark_task_served(
        &self,
        task_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<MonitoringTask>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::monitoring_tasks::dsl::*;
            let at = datetime_to_string(&at);
            let row = conn
                .transaction::<_, diesel::result::Error, _>(|conn| {
                    diesel::update(
                        monitoring_tasks
                            .filter(id.eq(task_id))
                            .filter(last_got_item.is_null().or(last_got_item.lt(&at))),
                    )
                    .set(last_got_item.eq(&at))
                    .execute(conn)?;

                    monitoring_tasks
                        .filter(id.eq(task_id))
                        .select(DbMonitoringTask::as_select())
                        .first::<DbMonitoringTask>(conn)
                        .optional()
                })
                .map_err(DatabaseError::from)?;

            row.map(|row| row.to_task()).transpose()
        })
        .await
    }
}

pub struct SqliteItemStore {
    db_path: Arc<String>,
}

impl SqliteItemStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::ItemStore for SqliteItemStore {
    async fn create_item(&self, item: &NewItemRecord) -> Result<ItemRecord, DatabaseError> {
        let item = item.clone();
        with_connection(self.db_path.clone(), move |conn| {
            let row = NewItemRow {
                item_url: &item.item_url,
                source_url: &item.source_url,
                title: item.title.as_deref(),
                price: item.price.as_deref(),
                location: item.location.as_deref(),
                created_at: item.created_at.as_ref().map(datetime_to_string),
                created_at_pretty: item.created_at_pretty.as_deref(),
                image_url: item.image_url.as_deref(),
                description: item.description.as_deref(),
                source: item.source.as_deref(),
                first_seen: datetime_to_string(&item.first_seen),
            };

            let inserted = conn
                .transaction::<_, diesel::result::Error, _>(|conn| {
                    diesel::insert_into(item_records::table)
                        .values(&row)
                        .execute(conn)?;

                    item_records::table
                        .filter(item_records::item_url.eq(&item.item_url))
                        .select(DbItemRecord::as_select())
                        .first::<DbItemRecord>(conn)
                })
                .map_err(DatabaseError::from)?;

            inserted.to_item()
        })
        .await
    }

    async fn get_item_by_id(&self, item_id: i64) -> Result<Option<ItemRecord>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::item_records::dsl::*;
            item_records
                .filter(id.eq(item_id))
                .select(DbItemRecord::as_select())
                .first::<DbItemRecord>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|row| row.to_item())
                .transpose()
        })
        .await
    }

    async fn get_item_by_url(&self, wanted: &str) -> Result<Option<ItemRecord>, DatabaseError> {
        let wanted = wanted.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::item_records::dsl::*;
            item_records
                .filter(item_url.eq(wanted))
                .select(DbItemRecord::as_select())
                .first::<DbItemRecord>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|row| row.to_item())
                .transpose()
        })
        .await
    }

    async fn list_items(&self, skip: i64, max: i64) -> Result<Vec<ItemRecord>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::item_records::dsl::*;
            let rows = item_records
                .order(id.asc())
                .limit(max)
                .offset(skip)
                .select(DbItemRecord::as_select())
                .load::<DbItemRecord>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            rows_to_items(rows)
        })
        .await
    }

    async fn count_items(&self) -> Result<i64, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            item_records::table
                .count()
                .get_result::<i64>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn list_items_by_source_url(
        &self,
        wanted: &str,
        max: i64,
    ) -> Result<Vec<ItemRecord>, DatabaseError> {
        let wanted = wanted.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::item_records::dsl::*;
            let rows = item_records
                .filter(source_url.eq(wanted))
                .order((first_seen.desc(), id.desc()))
                .limit(max)
                .select(DbItemRecord::as_select())
                .load::<DbItemRecord>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            rows_to_items(rows)
        })
        .await
    }

    async fn list_items_seen_after(
        &self,
        wanted: &str,
        after: DateTime<Utc>,
    ) -> Result<Vec<ItemRecord>, DatabaseError> {
        let wanted = wanted.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::item_records::dsl::*;
            let rows = item_records
                .filter(source_url.eq(wanted))
                .filter(first_seen.gt(datetime_to_string(&after)))
                .order((first_seen.asc(), id.asc()))
                .select(DbItemRecord::as_select())
                .load::<DbItemRecord>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            rows_to_items(rows)
        })
        .await
    }

    async fn list_items_seen_since(
        &self,
        since: DateTime<Utc>,
        max: i64,
    ) -> Result<Vec<ItemRecord>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::item_records::dsl::*;
            let rows = item_records
                .filter(first_seen.gt(datetime_to_string(&since)))
                .order((first_seen.desc(), id.desc()))
                .limit(max)
                .select(DbItemRecord::as_select())
                .load::<DbItemRecord>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            rows_to_items(rows)
        })
        .await
    }

    async fn delete_item(&self, item_id: i64) -> Result<bool, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            diesel::delete(item_records::table.filter(item_records::id.eq(item_id)))
                .execute(conn)
                .map(|count| count > 0)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_items_seen_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DeletedItem>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::item_records::dsl::*;
            let cutoff = datetime_to_string(&cutoff);
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                let doomed = item_records
                    .filter(first_seen.lt(&cutoff))
                    .order(id.asc())
                    .select((id, item_url))
                    .load::<(i64, String)>(conn)?;

                diesel::delete(item_records.filter(first_seen.lt(&cutoff))).execute(conn)?;

                Ok(doomed
                    .into_iter()
                    .map(|(deleted_id, deleted_url)| DeletedItem {
                        id: deleted_id,
                        item_url: deleted_url,
                    })
                    .collect())
            })
            .map_err(DatabaseError::from)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::NamedTempFile;

    use super::datetime_to_string;
    use crate::config::DatabaseConfig;
    use crate::db::{DatabaseError, DatabaseManager, MonitoringTaskChanges, NewItemRecord, NewMonitoringTask};

    async fn manager(file: &NamedTempFile) -> DatabaseManager {
        let config = DatabaseConfig {
            url: Some(format!("sqlite://{}", file.path().to_string_lossy())),
            max_connections: None,
            min_connections: None,
        };
        let manager = DatabaseManager::new(&config).await.expect("db manager");
        manager.migrate().await.expect("migrate");
        manager
    }

    fn new_task(chat_id: &str, name: &str, url: &str) -> NewMonitoringTask {
        NewMonitoringTask {
            chat_id: chat_id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            frequency_minutes: 5,
            last_updated: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    fn new_item(item_url: &str, source_url: &str, first_seen: chrono::DateTime<Utc>) -> NewItemRecord {
        NewItemRecord {
            item_url: item_url.to_string(),
            source_url: source_url.to_string(),
            title: Some("Flat".to_string()),
            price: Some("1 000 zł".to_string()),
            location: None,
            created_at: None,
            created_at_pretty: None,
            image_url: None,
            description: None,
            source: Some("OLX".to_string()),
            first_seen,
        }
    }

    #[test]
    fn datetime_strings_are_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let fractional = whole + Duration::milliseconds(5);

        let a = datetime_to_string(&whole);
        let b = datetime_to_string(&fractional);

        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }

    #[tokio::test]
    async fn task_lifecycle_roundtrip() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = manager(&file).await;
        let tasks = manager.task_store();

        let created = tasks
            .create_task(&new_task("chat-1", "flats", "https://www.olx.pl/flats"))
            .await
            .expect("create task");
        assert!(created.id > 0);
        assert_eq!(created.last_got_item, None);

        assert!(tasks
            .has_url_for_chat("chat-1", "https://www.olx.pl/flats", None)
            .await
            .expect("lookup"));
        assert!(!tasks
            .has_url_for_chat("chat-1", "https://www.olx.pl/flats", Some(created.id))
            .await
            .expect("lookup excluding self"));

        let changes = MonitoringTaskChanges {
            name: Some("cheap flats".to_string()),
            url: None,
            frequency_minutes: Some(15),
            last_updated: Utc.with_ymd_and_hms(2025, 3, 2, 8, 0, 0).unwrap(),
        };
        let updated = tasks
            .update_task(created.id, &changes)
            .await
            .expect("update")
            .expect("task exists");
        assert_eq!(updated.name, "cheap flats");
        assert_eq!(updated.url, "https://www.olx.pl/flats");
        assert_eq!(updated.frequency_minutes, 15);
        assert_eq!(updated.last_updated, changes.last_updated);

        let missing = tasks.update_task(created.id + 100, &changes).await.expect("update");
        assert!(missing.is_none());

        assert!(tasks.delete_task(created.id).await.expect("delete"));
        assert!(!tasks.delete_task(created.id).await.expect("delete again"));
    }

    #[tokio::test]
    async fn duplicate_task_name_in_chat_is_a_conflict() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = manager(&file).await;
        let tasks = manager.task_store();

        tasks
            .create_task(&new_task("chat-1", "flats", "https://www.olx.pl/a"))
            .await
            .expect("first insert");
        let err = tasks
            .create_task(&new_task("chat-1", "flats", "https://www.olx.pl/b"))
            .await
            .expect_err("second insert must fail");
        assert!(matches!(err, DatabaseError::Conflict(_)));

        tasks
            .create_task(&new_task("chat-2", "flats", "https://www.olx.pl/a"))
            .await
            .expect("same name in another chat is allowed");
    }

    #[tokio::test]
    async fn mark_task_served_never_moves_backwards() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = manager(&file).await;
        let tasks = manager.task_store();
        let task = tasks
            .create_task(&new_task("chat-1", "flats", "https://www.olx.pl/flats"))
            .await
            .expect("create task");

        let later = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();
        let earlier = later - Duration::hours(2);

        let served = tasks
            .mark_task_served(task.id, later)
            .await
            .expect("mark")
            .expect("task exists");
        assert_eq!(served.last_got_item, Some(later));

        let again = tasks
            .mark_task_served(task.id, earlier)
            .await
            .expect("mark")
            .expect("task exists");
        assert_eq!(again.last_got_item, Some(later));

        let missing = tasks.mark_task_served(task.id + 1, later).await.expect("mark");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn delete_tasks_by_chat_honours_name_filter() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = manager(&file).await;
        let tasks = manager.task_store();
        for (name, url) in [("a", "https://www.olx.pl/a"), ("b", "https://www.olx.pl/b")] {
            tasks
                .create_task(&new_task("chat-1", name, url))
                .await
                .expect("create");
        }
        tasks
            .create_task(&new_task("chat-2", "a", "https://www.olx.pl/a"))
            .await
            .expect("create");

        let removed = tasks
            .delete_tasks_by_chat("chat-1", Some("a"))
            .await
            .expect("delete one");
        assert_eq!(removed, 1);

        let removed = tasks.delete_tasks_by_chat("chat-1", None).await.expect("delete rest");
        assert_eq!(removed, 1);

        let remaining = tasks.list_tasks().await.expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].chat_id, "chat-2");
    }

    #[tokio::test]
    async fn item_queries_respect_time_bounds_and_order() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = manager(&file).await;
        let items = manager.item_store();
        let source = "https://www.olx.pl/flats";
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        for (n, minutes) in [(1, 0), (2, 10), (3, 20)] {
            items
                .create_item(&new_item(
                    &format!("https://www.olx.pl/d/oferta/{n}"),
                    source,
                    base + Duration::minutes(minutes),
                ))
                .await
                .expect("create item");
        }
        items
            .create_item(&new_item(
                "https://www.otodom.pl/oferta/9",
                "https://www.otodom.pl/search",
                base + Duration::minutes(30),
            ))
            .await
            .expect("create item");

        let after = items
            .list_items_seen_after(source, base)
            .await
            .expect("seen after");
        let urls: Vec<_> = after.iter().map(|item| item.item_url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://www.olx.pl/d/oferta/2", "https://www.olx.pl/d/oferta/3"]
        );

        let recent = items
            .list_items_seen_since(base + Duration::minutes(5), 10)
            .await
            .expect("recent");
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].item_url, "https://www.otodom.pl/oferta/9");

        let by_source = items.list_items_by_source_url(source, 2).await.expect("by source");
        assert_eq!(by_source.len(), 2);
        assert_eq!(by_source[0].item_url, "https://www.olx.pl/d/oferta/3");

        assert_eq!(items.count_items().await.expect("count"), 4);
        let page = items.list_items(1, 2).await.expect("page");
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].item_url, "https://www.olx.pl/d/oferta/2");
    }

    #[tokio::test]
    async fn duplicate_item_url_is_a_conflict_and_keeps_original() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = manager(&file).await;
        let items = manager.item_store();
        let seen = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        let original = items
            .create_item(&new_item("https://www.olx.pl/d/oferta/1", "https://www.olx.pl/s", seen))
            .await
            .expect("create");

        let mut duplicate = new_item("https://www.olx.pl/d/oferta/1", "https://www.olx.pl/s", seen);
        duplicate.title = Some("Changed".to_string());
        let err = items.create_item(&duplicate).await.expect_err("duplicate");
        assert!(matches!(err, DatabaseError::Conflict(_)));

        let stored = items
            .get_item_by_url("https://www.olx.pl/d/oferta/1")
            .await
            .expect("lookup")
            .expect("exists");
        assert_eq!(stored, original);
    }

    #[tokio::test]
    async fn delete_items_seen_before_removes_only_older_items() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = manager(&file).await;
        let items = manager.item_store();
        let cutoff = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();

        let old = items
            .create_item(&new_item("https://www.olx.pl/old", "s", cutoff - Duration::seconds(1)))
            .await
            .expect("create");
        items
            .create_item(&new_item("https://www.olx.pl/edge", "s", cutoff))
            .await
            .expect("create");
        items
            .create_item(&new_item("https://www.olx.pl/new", "s", cutoff + Duration::days(1)))
            .await
            .expect("create");

        let deleted = items.delete_items_seen_before(cutoff).await.expect("cleanup");
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, old.id);
        assert_eq!(deleted[0].item_url, "https://www.olx.pl/old");
        assert_eq!(items.count_items().await.expect("count"), 2);
    }
}
