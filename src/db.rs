pub use self::error::DatabaseError;
pub use self::manager::{DatabaseManager, Session};
pub use self::migrate::{ColumnReport, ColumnStatus, patch_notifications};
pub use self::schema::SchemaMetadata;

pub mod error;
pub mod manager;
pub mod migrate;
pub mod schema;
