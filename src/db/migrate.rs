//! Additive patch for the `notifications` table.
//!
//! Databases deployed before the notification feature grew entity
//! references lack two columns the application now reads. This module adds
//! whichever of them is missing, and nothing else: no column is ever
//! dropped or renamed, so re-running is always safe. It opens its own
//! direct connection from the connection string rather than borrowing the
//! application's pool, which keeps the `run-migration` binary usable
//! against a stopped deployment.
//!
//! Not safe to run concurrently against one database: two runs can both
//! observe a column as absent and both try to add it. One-shot operator
//! use is assumed.

use diesel::prelude::*;
use tracing::debug;

use crate::config::{DatabaseConfig, DbType};
use crate::db::DatabaseError;

#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "sqlite")]
use diesel::sqlite::SqliteConnection;

pub const NOTIFICATIONS_TABLE: &str = "notifications";

/// Columns the current application expects, in patch order. Both are
/// nullable references (a user and a post a notification may point at).
pub const NOTIFICATION_COLUMNS: [(&str, &str); 2] = [
    ("related_user_id", "INTEGER"),
    ("related_post_id", "INTEGER"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnStatus {
    Added,
    AlreadyPresent,
    Failed(String),
}

/// Outcome for one target column, in [`NOTIFICATION_COLUMNS`] order.
#[derive(Debug, Clone)]
pub struct ColumnReport {
    pub column: &'static str,
    pub status: ColumnStatus,
}

#[derive(QueryableByName)]
struct ColumnName {
    #[diesel(sql_type = diesel::sql_types::Text)]
    name: String,
}

/// Bring the `notifications` table up to date.
///
/// Failure to connect or to introspect the table returns `Err`: a database
/// we cannot even read is an operational problem, not a backend quirk. A
/// failed `ALTER` on an individual column, by contrast, is recorded as
/// [`ColumnStatus::Failed`] and the remaining columns are still attempted;
/// the caller decides whether a partial patch is acceptable.
pub fn patch_notifications(
    config: &DatabaseConfig,
) -> Result<Vec<ColumnReport>, DatabaseError> {
    match config.db_type()? {
        #[cfg(feature = "sqlite")]
        DbType::Sqlite => {
            let path = config.sqlite_path().ok_or_else(|| {
                DatabaseError::Configuration("sqlite connection string has no path".to_string())
            })?;
            let mut conn = SqliteConnection::establish(&path)
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;
            let existing = sqlite_columns(&mut conn)?;
            apply_missing(&mut conn, &existing)
        }
        #[cfg(feature = "postgres")]
        DbType::Postgres => {
            let mut conn = PgConnection::establish(&config.connection_string())
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;
            let existing = postgres_columns(&mut conn)?;
            apply_missing_pg(&mut conn, &existing)
        }
        #[cfg(not(feature = "sqlite"))]
        DbType::Sqlite => Err(DatabaseError::Configuration(
            "crate built without sqlite support".to_string(),
        )),
        #[cfg(not(feature = "postgres"))]
        DbType::Postgres => Err(DatabaseError::Configuration(
            "crate built without postgres support".to_string(),
        )),
    }
}

#[cfg(feature = "sqlite")]
fn sqlite_columns(conn: &mut SqliteConnection) -> Result<Vec<String>, DatabaseError> {
    let sql = format!("SELECT name FROM pragma_table_info('{NOTIFICATIONS_TABLE}')");
    let columns = diesel::sql_query(sql)
        .load::<ColumnName>(conn)
        .map_err(|e| DatabaseError::Migration(e.to_string()))?
        .into_iter()
        .map(|c| c.name)
        .collect::<Vec<_>>();
    debug!(?columns, "introspected notification columns");
    Ok(columns)
}

#[cfg(feature = "postgres")]
fn postgres_columns(conn: &mut PgConnection) -> Result<Vec<String>, DatabaseError> {
    let sql = format!(
        "SELECT column_name AS name FROM information_schema.columns \
         WHERE table_name = '{NOTIFICATIONS_TABLE}'"
    );
    let columns = diesel::sql_query(sql)
        .load::<ColumnName>(conn)
        .map_err(|e| DatabaseError::Migration(e.to_string()))?
        .into_iter()
        .map(|c| c.name)
        .collect::<Vec<_>>();
    debug!(?columns, "introspected notification columns");
    Ok(columns)
}

/// Check-then-add for every target column, committed as one transaction
/// after the loop. A failed `ALTER` does not abort the loop; whatever was
/// applied before and after it still commits.
#[cfg(feature = "sqlite")]
fn apply_missing(
    conn: &mut SqliteConnection,
    existing: &[String],
) -> Result<Vec<ColumnReport>, DatabaseError> {
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        let mut reports = Vec::with_capacity(NOTIFICATION_COLUMNS.len());
        for (column, sql_type) in NOTIFICATION_COLUMNS {
            reports.push(ColumnReport {
                column,
                status: patch_column(conn, existing, column, sql_type),
            });
        }
        Ok(reports)
    })
    .map_err(|e| DatabaseError::Migration(e.to_string()))
}

#[cfg(feature = "postgres")]
fn apply_missing_pg(
    conn: &mut PgConnection,
    existing: &[String],
) -> Result<Vec<ColumnReport>, DatabaseError> {
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        let mut reports = Vec::with_capacity(NOTIFICATION_COLUMNS.len());
        for (column, sql_type) in NOTIFICATION_COLUMNS {
            reports.push(ColumnReport {
                column,
                status: patch_column_pg(conn, existing, column, sql_type),
            });
        }
        Ok(reports)
    })
    .map_err(|e| DatabaseError::Migration(e.to_string()))
}

#[cfg(feature = "sqlite")]
fn patch_column(
    conn: &mut SqliteConnection,
    existing: &[String],
    column: &str,
    sql_type: &str,
) -> ColumnStatus {
    if existing.iter().any(|c| c == column) {
        return ColumnStatus::AlreadyPresent;
    }
    let ddl = format!("ALTER TABLE {NOTIFICATIONS_TABLE} ADD COLUMN {column} {sql_type}");
    match diesel::sql_query(ddl).execute(conn) {
        Ok(_) => ColumnStatus::Added,
        Err(e) => ColumnStatus::Failed(e.to_string()),
    }
}

#[cfg(feature = "postgres")]
fn patch_column_pg(
    conn: &mut PgConnection,
    existing: &[String],
    column: &str,
    sql_type: &str,
) -> ColumnStatus {
    if existing.iter().any(|c| c == column) {
        return ColumnStatus::AlreadyPresent;
    }
    let ddl = format!("ALTER TABLE {NOTIFICATIONS_TABLE} ADD COLUMN {column} {sql_type}");
    match diesel::sql_query(ddl).execute(conn) {
        Ok(_) => ColumnStatus::Added,
        Err(e) => ColumnStatus::Failed(e.to_string()),
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn db_config(dir: &TempDir) -> (DatabaseConfig, String) {
        let path = dir.path().join("techtalk.db").display().to_string();
        let config = DatabaseConfig::from_url(Some(format!("sqlite:///{path}")));
        (config, path)
    }

    fn seed_notifications(path: &str, with_related_user: bool) {
        let mut conn = SqliteConnection::establish(path).unwrap();
        let base = if with_related_user {
            "CREATE TABLE notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                message TEXT,
                related_user_id INTEGER
            )"
        } else {
            "CREATE TABLE notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                message TEXT
            )"
        };
        diesel::sql_query(base).execute(&mut conn).unwrap();
    }

    fn column_names(path: &str) -> Vec<String> {
        let mut conn = SqliteConnection::establish(path).unwrap();
        sqlite_columns(&mut conn).unwrap()
    }

    #[test]
    fn adds_both_columns_to_fresh_table() {
        let dir = TempDir::new().unwrap();
        let (config, path) = db_config(&dir);
        seed_notifications(&path, false);

        let reports = patch_notifications(&config).unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].column, "related_user_id");
        assert_eq!(reports[0].status, ColumnStatus::Added);
        assert_eq!(reports[1].column, "related_post_id");
        assert_eq!(reports[1].status, ColumnStatus::Added);

        let columns = column_names(&path);
        assert!(columns.contains(&"related_user_id".to_string()));
        assert!(columns.contains(&"related_post_id".to_string()));
    }

    #[test]
    fn second_run_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let (config, path) = db_config(&dir);
        seed_notifications(&path, false);

        patch_notifications(&config).unwrap();
        let before = column_names(&path);

        let reports = patch_notifications(&config).unwrap();
        for report in &reports {
            assert_eq!(report.status, ColumnStatus::AlreadyPresent);
        }
        assert_eq!(column_names(&path), before);
    }

    #[test]
    fn only_adds_the_missing_column() {
        let dir = TempDir::new().unwrap();
        let (config, path) = db_config(&dir);
        seed_notifications(&path, true);

        let reports = patch_notifications(&config).unwrap();
        assert_eq!(reports[0].status, ColumnStatus::AlreadyPresent);
        assert_eq!(reports[1].status, ColumnStatus::Added);

        let columns = column_names(&path);
        assert_eq!(
            columns.iter().filter(|c| *c == "related_user_id").count(),
            1
        );
        assert!(columns.contains(&"related_post_id".to_string()));
    }

    #[test]
    fn missing_table_reports_per_column_failure() {
        let dir = TempDir::new().unwrap();
        let (config, _path) = db_config(&dir);
        // Connecting creates an empty database file with no tables; the
        // introspection sees zero columns and each ALTER then fails.
        let reports = patch_notifications(&config).unwrap();
        for report in &reports {
            assert!(matches!(report.status, ColumnStatus::Failed(_)));
        }
    }

    #[test]
    fn unreachable_database_is_an_error() {
        let config = DatabaseConfig::from_url(Some(
            "sqlite:////nonexistent/dir/for/techtalk/techtalk.db".to_string(),
        ));
        match patch_notifications(&config) {
            Err(DatabaseError::Connection(_)) => {}
            other => panic!("expected Connection error, got {other:?}"),
        }
    }
}
