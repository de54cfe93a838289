//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the client starts with zero configuration.

use std::path::PathBuf;

use agora_shared::constants::DEFAULT_FEED_BUFFER;

/// Default log filter when neither `RUST_LOG` nor `AGORA_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "agora_client=debug,agora_store=info,warn";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// SQLite file of the embedded backend.
    /// Env: `AGORA_DB_PATH`
    /// Default: `agora.db` in the platform data directory.
    pub db_path: Option<PathBuf>,

    /// Per-subscription change-feed buffer, in events.
    /// Env: `AGORA_FEED_BUFFER`
    /// Default: `256`
    pub feed_buffer: usize,

    /// Log filter used when `RUST_LOG` is unset.
    /// Env: `AGORA_LOG`
    pub log_filter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            feed_buffer: DEFAULT_FEED_BUFFER,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("AGORA_DB_PATH").filter(|p| !p.is_empty()) {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(value) = lookup("AGORA_FEED_BUFFER") {
            match value.parse::<usize>() {
                Ok(n) if n > 0 => config.feed_buffer = n,
                _ => {
                    tracing::warn!(
                        value = %value,
                        "Invalid AGORA_FEED_BUFFER, using default"
                    );
                }
            }
        }

        if let Some(filter) = lookup("AGORA_LOG") {
            config.log_filter = filter;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let config = load(&[]);
        assert!(config.db_path.is_none());
        assert_eq!(config.feed_buffer, 256);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("AGORA_DB_PATH", "/tmp/agora-test.db"),
            ("AGORA_FEED_BUFFER", "8"),
            ("AGORA_LOG", "trace"),
        ]);
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/agora-test.db")));
        assert_eq!(config.feed_buffer, 8);
        assert_eq!(config.log_filter, "trace");
    }

    #[test]
    fn invalid_buffer_falls_back() {
        assert_eq!(load(&[("AGORA_FEED_BUFFER", "lots")]).feed_buffer, 256);
        assert_eq!(load(&[("AGORA_FEED_BUFFER", "0")]).feed_buffer, 256);
    }
}
