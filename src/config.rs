//!
//! provisioning-controller configuration
//! -------------------------------------
//! Configuration is a flat map of dotted keys (`db.url`, `service.port`, ...). Values
//! come from an optional JSON file, whose nested objects are flattened into dotted
//! keys, and are then overridden by environment variables named `PROVISION_<KEY>`
//! with dots replaced by underscores (`db.url` -> `PROVISION_DB_URL`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "PROVISION";

pub const KEY_DB_URL: &str = "db.url";
pub const KEY_DB_USER: &str = "db.user";
pub const KEY_DB_PASSWORD: &str = "db.password";
pub const KEY_DB_NAME: &str = "db.name";
pub const KEY_DB_GRAPH: &str = "db.graph";
pub const KEY_DB_TIMEOUT_SECS: &str = "db.timeout_secs";
pub const KEY_SERVICE_PORT: &str = "service.port";

/// Every key the service reads. Environment overrides are looked up for these only.
pub const KNOWN_KEYS: &[&str] = &[
    KEY_DB_URL,
    KEY_DB_USER,
    KEY_DB_PASSWORD,
    KEY_DB_NAME,
    KEY_DB_GRAPH,
    KEY_DB_TIMEOUT_SECS,
    KEY_SERVICE_PORT,
];

pub const DEFAULT_SERVICE_PORT: u16 = 8080;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("configuration file {path} is not valid JSON: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("configuration file {path} must contain a JSON object at the top level")]
    NotAnObject { path: PathBuf },
    #[error("configuration value '{key}' = '{value}' is not a valid {expected}")]
    InvalidValue { key: String, value: String, expected: &'static str },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    values: BTreeMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self { Self::default() }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { values }
    }

    /// Load the file (when given) and then apply `PROVISION_*` overrides from the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = Self::new();
        if let Some(p) = path {
            debug!(path = %p.display(), "reading configuration file");
            cfg.merge_file(p)?;
        }
        cfg.merge_env_from(std::env::vars());
        Ok(cfg)
    }

    pub fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        let serde_json::Value::Object(map) = value else {
            return Err(ConfigError::NotAnObject { path: path.to_path_buf() });
        };
        flatten_into(&mut self.values, "", &map);
        Ok(())
    }

    /// Apply overrides for the known keys from an iterator of `(name, value)` variables.
    /// Empty values are ignored so an exported-but-blank variable does not count as set.
    pub fn merge_env_from<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: BTreeMap<String, String> = vars.into_iter().collect();
        for key in KNOWN_KEYS {
            if let Some(v) = vars.get(&env_var_name(key)) {
                if !v.is_empty() {
                    self.values.insert((*key).to_string(), v.clone());
                }
            }
        }
    }

    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.values.insert(key.into(), value.into());
    }

    pub fn is_set(&self, key: &str) -> bool { self.values.contains_key(key) }

    pub fn get_string(&self, key: &str) -> Option<&str> { self.values.get(key).map(|s| s.as_str()) }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(v) => v.trim().parse::<u64>().map(Some).map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: v.clone(),
                expected: "unsigned integer",
            }),
        }
    }

    pub fn service_port(&self) -> Result<u16, ConfigError> {
        match self.get_u64(KEY_SERVICE_PORT)? {
            None => Ok(DEFAULT_SERVICE_PORT),
            Some(p) => u16::try_from(p).map_err(|_| ConfigError::InvalidValue {
                key: KEY_SERVICE_PORT.to_string(),
                value: p.to_string(),
                expected: "port number",
            }),
        }
    }
}

/// `db.url` -> `PROVISION_DB_URL`
pub fn env_var_name(key: &str) -> String {
    format!("{}_{}", ENV_PREFIX, key.replace('.', "_").to_ascii_uppercase())
}

fn flatten_into(out: &mut BTreeMap<String, String>, prefix: &str, map: &serde_json::Map<String, serde_json::Value>) {
    for (k, v) in map {
        let key = if prefix.is_empty() { k.to_ascii_lowercase() } else { format!("{}.{}", prefix, k.to_ascii_lowercase()) };
        match v {
            serde_json::Value::Object(inner) => flatten_into(out, &key, inner),
            serde_json::Value::Null => {}
            serde_json::Value::String(s) => { out.insert(key, s.clone()); }
            other => { out.insert(key, other.to_string()); }
        }
    }
}
