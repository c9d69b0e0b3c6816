use crate::config::{DatabaseConfig, DbType};
use crate::db::{DatabaseError, ItemStore, TaskStore};
use std::sync::Arc;
use tracing::info;

#[cfg(feature = "postgres")]
use crate::db::postgres::{PostgresItemStore, PostgresTaskStore};
#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "postgres")]
use diesel::r2d2::{self, ConnectionManager};

#[cfg(any(feature = "postgres", feature = "sqlite"))]
use diesel::RunQueryDsl;

#[cfg(feature = "postgres")]
pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[cfg(feature = "sqlite")]
use crate::db::sqlite::{SqliteItemStore, SqliteTaskStore, establish_connection};

#[derive(Clone)]
pub struct DatabaseManager {
    #[cfg(feature = "postgres")]
    postgres_pool: Option<Pool>,
    #[cfg(feature = "sqlite")]
    sqlite_path: Option<String>,
    task_store: Arc<dyn TaskStore>,
    item_store: Arc<dyn ItemStore>,
    db_type: DbType,
}

#[cfg(feature = "postgres")]
const POSTGRES_SCHEMA: [&str; 8] = [
    r#"
    CREATE TABLE IF NOT EXISTS monitoring_tasks (
        id BIGSERIAL PRIMARY KEY,
        chat_id TEXT NOT NULL,
        name VARCHAR(64) NOT NULL,
        url TEXT NOT NULL,
        frequency_minutes INTEGER NOT NULL DEFAULT 1,
        last_updated TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        last_got_item TIMESTAMP WITH TIME ZONE,
        CONSTRAINT uix_chat_id_name UNIQUE (chat_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS item_records (
        id BIGSERIAL PRIMARY KEY,
        item_url TEXT NOT NULL UNIQUE,
        source_url TEXT NOT NULL,
        title TEXT,
        price TEXT,
        location TEXT,
        created_at TIMESTAMP WITH TIME ZONE,
        created_at_pretty TEXT,
        image_url TEXT,
        description TEXT,
        source TEXT,
        first_seen TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    "ALTER TABLE monitoring_tasks ADD COLUMN IF NOT EXISTS frequency_minutes INTEGER NOT NULL DEFAULT 1",
    "ALTER TABLE item_records ADD COLUMN IF NOT EXISTS source TEXT",
    "CREATE INDEX IF NOT EXISTS idx_monitoring_tasks_chat_id ON monitoring_tasks(chat_id)",
    "CREATE INDEX IF NOT EXISTS idx_item_records_source_url ON item_records(source_url)",
    "CREATE INDEX IF NOT EXISTS idx_item_records_first_seen ON item_records(first_seen)",
    "CREATE INDEX IF NOT EXISTS idx_item_records_source ON item_records(source)",
];

#[cfg(feature = "sqlite")]
const SQLITE_SCHEMA: [&str; 6] = [
    r#"
    CREATE TABLE IF NOT EXISTS monitoring_tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chat_id TEXT NOT NULL,
        name TEXT NOT NULL,
        url TEXT NOT NULL,
        frequency_minutes INTEGER NOT NULL DEFAULT 1,
        last_updated TEXT NOT NULL,
        last_got_item TEXT,
        UNIQUE (chat_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS item_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_url TEXT NOT NULL UNIQUE,
        source_url TEXT NOT NULL,
        title TEXT,
        price TEXT,
        location TEXT,
        created_at TEXT,
        created_at_pretty TEXT,
        image_url TEXT,
        description TEXT,
        source TEXT,
        first_seen TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_monitoring_tasks_chat_id ON monitoring_tasks(chat_id)",
    "CREATE INDEX IF NOT EXISTS idx_item_records_source_url ON item_records(source_url)",
    "CREATE INDEX IF NOT EXISTS idx_item_records_first_seen ON item_records(first_seen)",
    "CREATE INDEX IF NOT EXISTS idx_item_records_source ON item_records(source)",
];

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let Some(db_type) = config.db_type() else {
            return Err(DatabaseError::Connection(format!(
                "unsupported database url: {}",
                config.redacted_url()
            )));
        };

        match db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let manager = ConnectionManager::<PgConnection>::new(config.connection_string());
                let max_connections = config.max_connections();
                let min_connections = config.min_connections();

                // r2d2 opens the idle connections eagerly, so keep it off the runtime threads
                let pool = tokio::task::spawn_blocking(move || {
                    r2d2::Pool::builder()
                        .max_size(max_connections)
                        .min_idle(Some(min_connections))
                        .build(manager)
                })
                .await
                .map_err(|e| DatabaseError::Connection(format!("pool task failed: {e}")))?
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

                info!(
                    "connected to postgres at {} (max {} connections)",
                    config.redacted_url(),
                    max_connections
                );

                Ok(Self {
                    task_store: Arc::new(PostgresTaskStore::new(pool.clone())),
                    item_store: Arc::new(PostgresItemStore::new(pool.clone())),
                    postgres_pool: Some(pool),
                    #[cfg(feature = "sqlite")]
                    sqlite_path: None,
                    db_type,
                })
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = config.sqlite_path().ok_or_else(|| {
                    DatabaseError::Connection("sqlite url has no path".to_string())
                })?;
                let path_arc = Arc::new(path.clone());

                info!("using sqlite database at {}", path);

                Ok(Self {
                    #[cfg(feature = "postgres")]
                    postgres_pool: None,
                    task_store: Arc::new(SqliteTaskStore::new(path_arc.clone())),
                    item_store: Arc::new(SqliteItemStore::new(path_arc)),
                    sqlite_path: Some(path),
                    db_type,
                })
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Connection(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Connection(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    /// Creates the tables and indexes if they are missing. Safe to run on every start.
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        match self.db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let pool = self.postgres_pool.clone().ok_or_else(|| {
                    DatabaseError::Migration("postgres pool is not initialized".to_string())
                })?;
                tokio::task::spawn_blocking(move || {
                    let mut conn = pool
                        .get()
                        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
                    for statement in POSTGRES_SCHEMA {
                        diesel::sql_query(statement)
                            .execute(&mut conn)
                            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
                    }
                    Ok(())
                })
                .await
                .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = self.sqlite_path.clone().ok_or_else(|| {
                    DatabaseError::Migration("sqlite path is not initialized".to_string())
                })?;
                tokio::task::spawn_blocking(move || {
                    let mut conn = establish_connection(&path)?;
                    for statement in SQLITE_SCHEMA {
                        diesel::sql_query(statement)
                            .execute(&mut conn)
                            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
                    }
                    Ok(())
                })
                .await
                .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Migration(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Migration(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    pub fn task_store(&self) -> Arc<dyn TaskStore> {
        self.task_store.clone()
    }

    pub fn item_store(&self) -> Arc<dyn ItemStore> {
        self.item_store.clone()
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }
}

#[cfg(test)]
mod tests {
    use tempfile::NamedTempFile;

    use super::DatabaseManager;
    use crate::config::{DatabaseConfig, DbType};

    fn sqlite_config(file: &NamedTempFile) -> DatabaseConfig {
        DatabaseConfig {
            url: Some(format!("sqlite://{}", file.path().to_string_lossy())),
            max_connections: None,
            min_connections: None,
        }
    }

    #[tokio::test]
    async fn sqlite_migrate_is_idempotent() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = DatabaseManager::new(&sqlite_config(&file))
            .await
            .expect("db manager");
        assert_eq!(manager.db_type(), DbType::Sqlite);

        manager.migrate().await.expect("first migrate");
        manager.migrate().await.expect("second migrate");

        let count = manager.item_store().count_items().await.expect("count");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected() {
        let config = DatabaseConfig {
            url: Some("mysql://localhost/olx".to_string()),
            max_connections: None,
            min_connections: None,
        };
        assert!(DatabaseManager::new(&config).await.is_err());
    }
}
