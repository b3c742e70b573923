use crate::config::DbType;

/// Contract with the application's `models` crate, which owns the table
/// definitions. The manager only needs a way to materialize every described
/// table; it never inspects them.
///
/// Statements must be individually idempotent (`CREATE TABLE IF NOT EXISTS`
/// shaped) so that [`crate::db::DatabaseManager::create_schema`] is safe to
/// run on every startup.
pub trait SchemaMetadata: Send + Sync {
    fn statements(&self, db_type: DbType) -> Vec<&'static str>;
}
