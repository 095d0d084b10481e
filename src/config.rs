//! Environment-driven configuration. Values come from the process
//! environment, with a `.env` file loaded first when present.

use crate::auth::DEFAULT_AUTH_WINDOW_MS;
use crate::resolver::DEFAULT_MAX_PHOTO_BYTES;

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file. `None` selects the in-memory store.
    pub database_path: Option<String>,
    /// Credential freshness window in milliseconds.
    pub auth_window_ms: i64,
    /// Cap on decoded photo size in bytes.
    pub max_photo_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            auth_window_ms: DEFAULT_AUTH_WINDOW_MS,
            max_photo_bytes: DEFAULT_MAX_PHOTO_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let database_path = std::env::var("DATABASE_PATH").ok().filter(|p| !p.is_empty());
        let auth_window_ms = std::env::var("AUTH_WINDOW_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .map(|secs| secs * 1_000)
            .unwrap_or(DEFAULT_AUTH_WINDOW_MS);
        let max_photo_bytes = std::env::var("MAX_PHOTO_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_PHOTO_BYTES);

        Self {
            database_path,
            auth_window_ms,
            max_photo_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.database_path.is_none());
        assert_eq!(config.auth_window_ms, 60_000);
        assert_eq!(config.max_photo_bytes, 10 * 1024 * 1024);
    }
}
