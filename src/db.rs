pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::models::{
    DeletedItem, ItemRecord, MonitoringTask, MonitoringTaskChanges, NewItemRecord,
    NewMonitoringTask,
};
pub use self::stores::{ItemStore, TaskStore};

pub mod error;
pub mod manager;
pub mod models;
#[cfg(feature = "postgres")]
pub mod schema;
pub mod stores;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub mod schema_sqlite;
