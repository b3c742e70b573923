use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fallback connection string when `DATABASE_URL` is unset.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:///./techtalk.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unsupported database scheme in `{0}`")]
    UnsupportedScheme(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Sqlite,
    Postgres,
}

impl DbType {
    /// Classify a connection string by scheme. Unknown or empty schemes are
    /// rejected outright; a mistyped URL must fail at startup, not at first
    /// query.
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        if url.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database connection string cannot be empty".to_string(),
            ));
        }
        if url.starts_with("sqlite:") || url == ":memory:" {
            Ok(DbType::Sqlite)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(DbType::Postgres)
        } else {
            Err(ConfigError::UnsupportedScheme(url.to_string()))
        }
    }
}

/// Connection settings for the TechTalk database. Read once at startup and
/// immutable afterwards; usually embedded in the application's config file,
/// with [`DatabaseConfig::from_env`] as the bare-environment path.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub min_connections: Option<u32>,
    /// How long a session checkout may wait on an exhausted pool.
    #[serde(default)]
    pub connection_timeout_ms: Option<u64>,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self::from_url(std::env::var("DATABASE_URL").ok())
    }

    pub fn from_url(url: Option<String>) -> Self {
        Self {
            url,
            max_connections: None,
            min_connections: None,
            connection_timeout_ms: None,
        }
    }

    pub fn connection_string(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
    }

    pub fn db_type(&self) -> Result<DbType, ConfigError> {
        DbType::from_url(&self.connection_string())
    }

    /// Filesystem path (or `:memory:`) for a SQLite connection string.
    ///
    /// The path portion after `sqlite:///` is taken verbatim, so it is
    /// relative unless it begins with `/` (i.e. four slashes total for an
    /// absolute path). Returns `None` for non-SQLite strings.
    pub fn sqlite_path(&self) -> Option<String> {
        let url = self.connection_string();
        if url == ":memory:" {
            return Some(url);
        }
        if !url.starts_with("sqlite:") {
            return None;
        }
        let path = url
            .strip_prefix("sqlite:///")
            .or_else(|| url.strip_prefix("sqlite://"))
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(&url);
        Some(path.to_string())
    }

    pub fn max_connections(&self) -> u32 {
        match self.max_connections {
            Some(n) => n,
            // A single writer avoids lock contention on file-based SQLite.
            None => match self.db_type() {
                Ok(DbType::Sqlite) => 1,
                _ => 10,
            },
        }
    }

    pub fn min_connections(&self) -> u32 {
        self.min_connections.unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("sqlite:///./techtalk.db", DbType::Sqlite ; "sqlalchemy style relative sqlite url")]
    #[test_case("sqlite://techtalk.db", DbType::Sqlite ; "bare sqlite url")]
    #[test_case(":memory:", DbType::Sqlite ; "in memory sqlite")]
    #[test_case("postgres://tt:tt@localhost/techtalk", DbType::Postgres ; "postgres scheme")]
    #[test_case("postgresql://tt:tt@localhost/techtalk", DbType::Postgres ; "postgresql scheme")]
    fn detects_db_type(url: &str, expected: DbType) {
        assert_eq!(DbType::from_url(url).unwrap(), expected);
    }

    #[test_case("mysql://localhost/techtalk" ; "unsupported scheme")]
    #[test_case("techtalk.db" ; "missing scheme")]
    #[test_case("" ; "empty string")]
    fn rejects_malformed_urls(url: &str) {
        assert!(DbType::from_url(url).is_err());
    }

    #[test]
    fn default_url_when_unset() {
        let config = DatabaseConfig::from_url(None);
        assert_eq!(config.connection_string(), DEFAULT_DATABASE_URL);
        assert_eq!(config.db_type().unwrap(), DbType::Sqlite);
    }

    #[test_case("sqlite:///./techtalk.db", "./techtalk.db" ; "relative path")]
    #[test_case("sqlite:////var/lib/techtalk.db", "/var/lib/techtalk.db" ; "absolute path")]
    #[test_case("sqlite://techtalk.db", "techtalk.db" ; "two slash form")]
    #[test_case(":memory:", ":memory:" ; "in memory")]
    fn extracts_sqlite_path(url: &str, expected: &str) {
        let config = DatabaseConfig::from_url(Some(url.to_string()));
        assert_eq!(config.sqlite_path().as_deref(), Some(expected));
    }

    #[test]
    fn no_sqlite_path_for_postgres() {
        let config =
            DatabaseConfig::from_url(Some("postgres://tt@localhost/techtalk".to_string()));
        assert!(config.sqlite_path().is_none());
    }

    #[test]
    fn pool_size_defaults() {
        let sqlite = DatabaseConfig::from_url(Some("sqlite://tt.db".to_string()));
        assert_eq!(sqlite.max_connections(), 1);

        let mut postgres =
            DatabaseConfig::from_url(Some("postgres://tt@localhost/techtalk".to_string()));
        assert_eq!(postgres.max_connections(), 10);

        postgres.max_connections = Some(32);
        assert_eq!(postgres.max_connections(), 32);
    }
}
