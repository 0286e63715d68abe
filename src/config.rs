use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_SQLITE_PATH: &str = "students.db";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Which engine backs the store and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Embedded SQLite database file. `:memory:` opens a private in-memory database.
    Sqlite {
        path: PathBuf,
        #[serde(default = "default_busy_timeout_ms")]
        busy_timeout_ms: u64,
    },
    /// PostgreSQL server reached through a connection URL.
    Postgres { url: String },
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Sqlite { .. } => "sqlite",
            BackendConfig::Postgres { .. } => "postgres",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendConfig,
}

impl StoreConfig {
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            backend: BackendConfig::Sqlite {
                path: path.into(),
                busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            },
        }
    }

    pub fn in_memory() -> Self {
        Self::sqlite(":memory:")
    }

    pub fn postgres(url: impl Into<String>) -> Self {
        StoreConfig {
            backend: BackendConfig::Postgres { url: url.into() },
        }
    }

    /// A database URL wins over a file path; with neither, the default file is used.
    pub fn resolve(db_path: Option<PathBuf>, database_url: Option<String>) -> Self {
        match (database_url.filter(|u| !u.trim().is_empty()), db_path) {
            (Some(url), _) => Self::postgres(url),
            (None, Some(path)) => Self::sqlite(path),
            (None, None) => Self::sqlite(DEFAULT_SQLITE_PATH),
        }
    }
}
