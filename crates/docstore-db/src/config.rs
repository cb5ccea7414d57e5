use std::env;
use std::time::Duration;

pub const DEFAULT_CONNECTION_STRING: &str = "mongodb://localhost:27017";
pub const DEFAULT_DATABASE_NAME: &str = "testdb";
pub const DEFAULT_COLLECTION_NAME: &str = "users";
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Where the client connects to and which collection it works on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    pub connection_string: String,
    pub database_name: String,
    pub collection_name: String,
    /// Upper bound on finding a server while connecting
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            connection_string: DEFAULT_CONNECTION_STRING.to_string(),
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    /// Read the configuration from the environment, loading `.env` first.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from a variable lookup.
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = StoreConfig::default();
        StoreConfig {
            connection_string: lookup("DOCUMENTDB_CONNECTION_STRING")
                .unwrap_or(defaults.connection_string),
            database_name: lookup("DOCUMENTDB_DATABASE_NAME").unwrap_or(defaults.database_name),
            collection_name: lookup("DOCUMENTDB_COLLECTION_NAME")
                .unwrap_or(defaults.collection_name),
            timeout_ms: lookup("DOCUMENTDB_TIMEOUT_MS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.timeout_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `database.collection`
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database_name, self.collection_name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let config = StoreConfig::from_lookup(|_| None);
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.connection_string, "mongodb://localhost:27017");
        assert_eq!(config.namespace(), "testdb.users");
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_lookup_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DOCUMENTDB_CONNECTION_STRING", "mongodb://db.internal:10260"),
            ("DOCUMENTDB_DATABASE_NAME", "demo_db"),
            ("DOCUMENTDB_COLLECTION_NAME", "products"),
            ("DOCUMENTDB_TIMEOUT_MS", "250"),
        ]);
        let config = StoreConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.connection_string, "mongodb://db.internal:10260");
        assert_eq!(config.namespace(), "demo_db.products");
        assert_eq!(config.timeout_ms, 250);
    }

    #[test]
    fn test_bad_timeout_falls_back() {
        let config = StoreConfig::from_lookup(|key| {
            (key == "DOCUMENTDB_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
    }
}
