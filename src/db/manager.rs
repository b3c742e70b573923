use std::time::Duration;

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, PooledConnection};
use tracing::info;

use crate::config::{DatabaseConfig, DbType};
use crate::db::{DatabaseError, SchemaMetadata};

#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "sqlite")]
use diesel::sqlite::SqliteConnection;

#[cfg(feature = "postgres")]
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;
#[cfg(feature = "sqlite")]
pub type SqlitePool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the engine (one r2d2 pool, built once at startup) and hands out
/// scoped [`Session`]s. Cloning shares the same pool, so passing clones
/// around preserves single-engine semantics without any global state.
#[derive(Clone)]
pub struct DatabaseManager {
    #[cfg(feature = "postgres")]
    postgres_pool: Option<PgPool>,
    #[cfg(feature = "sqlite")]
    sqlite_pool: Option<SqlitePool>,
    db_type: DbType,
}

/// A unit-of-work connection checked out of the engine's pool. Dropping it
/// returns the connection on every exit path, panics included.
pub enum Session {
    #[cfg(feature = "sqlite")]
    Sqlite(PooledConnection<ConnectionManager<SqliteConnection>>),
    #[cfg(feature = "postgres")]
    Postgres(PooledConnection<ConnectionManager<PgConnection>>),
}

impl Session {
    /// Run a single raw SQL statement, returning the affected row count.
    pub fn execute(&mut self, sql: &str) -> Result<usize, DatabaseError> {
        match self {
            #[cfg(feature = "sqlite")]
            Session::Sqlite(conn) => diesel::sql_query(sql)
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string())),
            #[cfg(feature = "postgres")]
            Session::Postgres(conn) => diesel::sql_query(sql)
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string())),
        }
    }
}

/// Applied to every SQLite connection the pool opens. Serves the same
/// purpose as SQLAlchemy's `check_same_thread=False` escape hatch: the pool
/// is shared across threads and the driver arbitrates concurrent access,
/// with a busy timeout instead of immediate lock errors.
#[cfg(feature = "sqlite")]
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas;

#[cfg(feature = "sqlite")]
impl r2d2::CustomizeConnection<SqliteConnection, r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        diesel::sql_query("PRAGMA busy_timeout = 5000")
            .execute(conn)
            .map_err(r2d2::Error::QueryError)?;
        diesel::sql_query("PRAGMA foreign_keys = ON")
            .execute(conn)
            .map_err(r2d2::Error::QueryError)?;
        Ok(())
    }
}

impl DatabaseManager {
    /// Construct the engine for the configured backend. Any failure here is
    /// fatal to startup; no half-initialized manager is ever returned.
    pub fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let db_type = config.db_type()?;
        let checkout_timeout = config
            .connection_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CHECKOUT_TIMEOUT);

        match db_type {
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = config.sqlite_path().ok_or_else(|| {
                    DatabaseError::Configuration(
                        "sqlite connection string has no path".to_string(),
                    )
                })?;

                let manager = ConnectionManager::<SqliteConnection>::new(path);
                let pool = r2d2::Pool::builder()
                    .max_size(config.max_connections())
                    .min_idle(Some(config.min_connections()))
                    .connection_timeout(checkout_timeout)
                    .connection_customizer(Box::new(SqlitePragmas))
                    .build(manager)
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;

                info!(backend = "sqlite", "database engine ready");
                Ok(Self {
                    #[cfg(feature = "postgres")]
                    postgres_pool: None,
                    sqlite_pool: Some(pool),
                    db_type,
                })
            }
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let manager =
                    ConnectionManager::<PgConnection>::new(config.connection_string());
                let pool = r2d2::Pool::builder()
                    .max_size(config.max_connections())
                    .min_idle(Some(config.min_connections()))
                    .connection_timeout(checkout_timeout)
                    .build(manager)
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;

                info!(backend = "postgres", "database engine ready");
                Ok(Self {
                    postgres_pool: Some(pool),
                    #[cfg(feature = "sqlite")]
                    sqlite_pool: None,
                    db_type,
                })
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

    /// Check a session out of the pool. An exhausted pool surfaces as
    /// [`DatabaseError::ResourceUnavailable`] once the checkout timeout
    /// elapses; the caller decides whether to retry.
    pub fn session(&self) -> Result<Session, DatabaseError> {
        match self.db_type {
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let pool = self.sqlite_pool.as_ref().ok_or_else(|| {
                    DatabaseError::Configuration("sqlite pool not initialized".to_string())
                })?;
                let conn = pool
                    .get()
                    .map_err(|e| DatabaseError::ResourceUnavailable(e.to_string()))?;
                Ok(Session::Sqlite(conn))
            }
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let pool = self.postgres_pool.as_ref().ok_or_else(|| {
                    DatabaseError::Configuration("postgres pool not initialized".to_string())
                })?;
                let conn = pool
                    .get()
                    .map_err(|e| DatabaseError::ResourceUnavailable(e.to_string()))?;
                Ok(Session::Postgres(conn))
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

    /// Materialize every table the `models` collaborator describes. Must run
    /// before the application accepts traffic; safe to run on every startup
    /// because the statements are existence-guarded.
    pub fn create_schema(&self, schema: &dyn SchemaMetadata) -> Result<(), DatabaseError> {
        let mut session = self.session()?;
        for statement in schema.statements(self.db_type) {
            session.execute(statement)?;
        }
        info!("schema creation completed");
        Ok(())
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }

    #[cfg(feature = "sqlite")]
    pub fn sqlite_pool(&self) -> Option<&SqlitePool> {
        self.sqlite_pool.as_ref()
    }

    #[cfg(feature = "postgres")]
    pub fn postgres_pool(&self) -> Option<&PgPool> {
        self.postgres_pool.as_ref()
    }
}
