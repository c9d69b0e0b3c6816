use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;

use crate::db::manager::Pool;
use crate::db::schema::{item_records, monitoring_tasks};

use super::{
    DatabaseError,
    models::{
        DeletedItem, ItemRecord, MonitoringTask, MonitoringTaskChanges, NewItemRecord,
        NewMonitoringTask,
    },
};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = monitoring_tasks)]
struct DbMonitoringTask {
    id: i64,
    chat_id: String,
    name: String,
    url: String,
    frequency_minutes: i32,
    last_updated: DateTime<Utc>,
    last_got_item: Option<DateTime<Utc>>,
}

impl From<DbMonitoringTask> for MonitoringTask {
    fn from(value: DbMonitoringTask) -> Self {
        Self {
            id: value.id,
            chat_id: value.chat_id,
            name: value.name,
            url: value.url,
            frequency_minutes: value.frequency_minutes,
            last_updated: value.last_updated,
            last_got_item: value.last_got_item,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = monitoring_tasks)]
struct NewTaskRow<'a> {
    chat_id: &'a str,
    name: &'a str,
    url: &'a str,
    frequency_minutes: i32,
    last_updated: &'a DateTime<Utc>,
}

#[derive(AsChangeset)]
#[diesel(table_name = monitoring_tasks)]
struct TaskChangeset<'a> {
    name: Option<&'a str>,
    url: Option<&'a str>,
    frequency_minutes: Option<i32>,
    last_updated: &'a DateTime<Utc>,
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
    created_at: Option<DateTime<Utc>>,
    created_at_pretty: Option<String>,
    image_url: Option<String>,
    description: Option<String>,
    source: Option<String>,
    first_seen: DateTime<Utc>,
}

impl From<DbItemRecord> for ItemRecord {
    fn from(value: DbItemRecord) -> Self {
        Self {
            id: value.id,
            item_url: value.item_url,
            source_url: value.source_url,
            title: value.title,
            price: value.price,
            location: value.location,
            created_at: value.created_at,
            created_at_pretty: value.created_at_pretty,
            image_url: value.image_url,
            description: value.description,
            source: value.source,
            first_seen: value.first_seen,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = item_records)]
struct NewItemRow<'a> {
    item_url: &'a str,
    source_url: &'a str,
    title: Option<&'a str>,
    price: Option<&'a str>,
    location: Option<&'a str>,
    created_at: Option<&'a DateTime<Utc>>,
    created_at_pretty: Option<&'a str>,
    image_url: Option<&'a str>,
    description: Option<&'a str>,
    source: Option<&'a str>,
    first_seen: &'a DateTime<Utc>,
}

async fn with_connection<T, F>(pool: Pool, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

pub struct PostgresTaskStore {
    pool: Pool,
}

impl PostgresTaskStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::TaskStore for PostgresTaskStore {
    async fn list_tasks(&self) -> Result<Vec<MonitoringTask>, DatabaseError> {
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::monitoring_tasks::dsl::*;
            monitoring_tasks
                .order(id.asc())
                .select(DbMonitoringTask::as_select())
                .load::<DbMonitoringTask>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn list_tasks_by_chat(&self, chat: &str) -> Result<Vec<MonitoringTask>, DatabaseError> {
        let chat = chat.to_string();
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::monitoring_tasks::dsl::*;
            monitoring_tasks
                .filter(chat_id.eq(chat))
                .order(id.asc())
                .select(DbMonitoringTask::as_select())
                .load::<DbMonitoringTask>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn get_task_by_id(&self, task_id: i64) -> Result<Option<MonitoringTask>, DatabaseError> {
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::monitoring_tasks::dsl::*;
            monitoring_tasks
                .filter(id.eq(task_id))
                .select(DbMonitoringTask::as_select())
                .first::<DbMonitoringTask>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
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
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::monitoring_tasks::dsl::*;
            monitoring_tasks
                .filter(chat_id.eq(chat))
                .filter(name.eq(task_name))
                .select(DbMonitoringTask::as_select())
                .first::<DbMonitoringTask>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
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
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::monitoring_tasks::dsl::*;
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
        with_connection(self.pool.clone(), move |conn| {
            let row = NewTaskRow {
                chat_id: &task.chat_id,
                name: &task.name,
                url: &task.url,
                frequency_minutes: task.frequency_minutes,
                last_updated: &task.last_updated,
            };

            diesel::insert_into(monitoring_tasks::table)
                .values(&row)
                .returning(DbMonitoringTask::as_returning())
                .get_result::<DbMonitoringTask>(conn)
                .map(Into::into)
                .map_err(DatabaseError::from)
        })
        .await
    }

    async fn update_task(
        &self,
        task_id: i64,
        changes: &MonitoringTaskChanges,
    ) -> Result<Option<MonitoringTask>, DatabaseError> {
        let changes = changes.clone();
        with_connection(self.pool.clone(), move |conn| {
            let changeset = TaskChangeset {
                name: changes.name.as_deref(),
                url: changes.url.as_deref(),
                frequency_minutes: changes.frequency_minutes,
                last_updated: &changes.last_updated,
            };

            diesel::update(monitoring_tasks::table.filter(monitoring_tasks::id.eq(task_id)))
                .set(changeset)
                .returning(DbMonitoringTask::as_returning())
                .get_result::<DbMonitoringTask>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(DatabaseError::from)
        })
        .await
    }

    async fn delete_task(&self, task_id: i64) -> Result<bool, DatabaseError> {
        with_connection(self.pool.clone(), move |conn| {
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
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::monitoring_tasks::dsl::*;
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
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::monitoring_tasks::dsl::*;
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::update(
                    monitoring_tasks
                        .filter(id.eq(task_id))
                        .filter(last_got_item.is_null().or(last_got_item.lt(at))),
                )
                .set(last_got_item.eq(at))
                .execute(conn)?;

                monitoring_tasks
                    .filter(id.eq(task_id))
                    .select(DbMonitoringTask::as_select())
                    .first::<DbMonitoringTask>(conn)
                    .optional()
            })
            .map(|value| value.map(Into::into))
            .map_err(DatabaseError::from)
        })
        .await
    }
}

pub struct PostgresItemStore {
    pool: Pool,
}

impl PostgresItemStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::ItemStore for PostgresItemStore {
    async fn create_item(&self, item: &NewItemRecord) -> Result<ItemRecord, DatabaseError> {
        let item = item.clone();
        with_connection(self.pool.clone(), move |conn| {
            let row = NewItemRow {
                item_url: &item.item_url,
                source_url: &item.source_url,
                title: item.title.as_deref(),
                price: item.price.as_deref(),
                location: item.location.as_deref(),
                created_at: item.created_at.as_ref(),
                created_at_pretty: item.created_at_pretty.as_deref(),
                image_url: item.image_url.as_deref(),
                description: item.description.as_deref(),
                source: item.source.as_deref(),
                first_seen: &item.first_seen,
            };

            diesel::insert_into(item_records::table)
                .values(&row)
                .returning(DbItemRecord::as_returning())
                .get_result::<DbItemRecord>(conn)
                .map(Into::into)
                .map_err(DatabaseError::from)
        })
        .await
    }

    async fn get_item_by_id(&self, item_id: i64) -> Result<Option<ItemRecord>, DatabaseError> {
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::item_records::dsl::*;
            item_records
                .filter(id.eq(item_id))
                .select(DbItemRecord::as_select())
                .first::<DbItemRecord>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn get_item_by_url(&self, wanted: &str) -> Result<Option<ItemRecord>, DatabaseError> {
        let wanted = wanted.to_string();
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::item_records::dsl::*;
            item_records
                .filter(item_url.eq(wanted))
                .select(DbItemRecord::as_select())
                .first::<DbItemRecord>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn list_items(&self, skip: i64, max: i64) -> Result<Vec<ItemRecord>, DatabaseError> {
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::item_records::dsl::*;
            item_records
                .order(id.asc())
                .offset(skip)
                .limit(max)
                .select(DbItemRecord::as_select())
                .load::<DbItemRecord>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn count_items(&self) -> Result<i64, DatabaseError> {
        with_connection(self.pool.clone(), move |conn| {
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
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::item_records::dsl::*;
            item_records
                .filter(source_url.eq(wanted))
                .order((first_seen.desc(), id.desc()))
                .limit(max)
                .select(DbItemRecord::as_select())
                .load::<DbItemRecord>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn list_items_seen_after(
        &self,
        wanted: &str,
        after: DateTime<Utc>,
    ) -> Result<Vec<ItemRecord>, DatabaseError> {
        let wanted = wanted.to_string();
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::item_records::dsl::*;
            item_records
                .filter(source_url.eq(wanted))
                .filter(first_seen.gt(after))
                .order((first_seen.asc(), id.asc()))
                .select(DbItemRecord::as_select())
                .load::<DbItemRecord>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn list_items_seen_since(
        &self,
        since: DateTime<Utc>,
        max: i64,
    ) -> Result<Vec<ItemRecord>, DatabaseError> {
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::item_records::dsl::*;
            item_records
                .filter(first_seen.gt(since))
                .order((first_seen.desc(), id.desc()))
                .limit(max)
                .select(DbItemRecord::as_select())
                .load::<DbItemRecord>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_item(&self, item_id: i64) -> Result<bool, DatabaseError> {
        with_connection(self.pool.clone(), move |conn| {
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
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::item_records::dsl::*;
            diesel::delete(item_records.filter(first_seen.lt(cutoff)))
                .returning((id, item_url))
                .get_results::<(i64, String)>(conn)
                .map(|rows| {
                    let mut deleted: Vec<DeletedItem> = rows
                        .into_iter()
                        .map(|(deleted_id, deleted_url)| DeletedItem {
                            id: deleted_id,
                            item_url: deleted_url,
                        })
                        .collect();
                    deleted.sort_by_key(|item| item.id);
                    deleted
                })
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}
