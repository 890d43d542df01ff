use std::path::PathBuf;
use std::str::FromStr;

use crate::catalog::{CatalogError, SlotTemplateCatalog};
use crate::store::{DEFAULT_KEY, DEFAULT_NAMESPACE};

/// Server settings, read from `POSTSLOT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// JSON slot template; the built-in template when unset.
    pub template_path: Option<PathBuf>,
    pub namespace: String,
    pub key: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5480,
            data_dir: PathBuf::from("./data"),
            template_path: None,
            namespace: DEFAULT_NAMESPACE.into(),
            key: DEFAULT_KEY.into(),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|s| s.parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unparseable numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind: lookup("POSTSLOT_BIND").unwrap_or(defaults.bind),
            port: parse_var(&lookup, "POSTSLOT_PORT").unwrap_or(defaults.port),
            data_dir: lookup("POSTSLOT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            template_path: lookup("POSTSLOT_TEMPLATE").map(PathBuf::from),
            namespace: lookup("POSTSLOT_NAMESPACE").unwrap_or(defaults.namespace),
            key: lookup("POSTSLOT_KEY").unwrap_or(defaults.key),
            max_connections: parse_var(&lookup, "POSTSLOT_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            compact_threshold: parse_var(&lookup, "POSTSLOT_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parse_var(&lookup, "POSTSLOT_METRICS_PORT"),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("taken_dates.wal")
    }

    pub fn load_catalog(&self) -> Result<SlotTemplateCatalog, CatalogError> {
        match &self.template_path {
            Some(path) => SlotTemplateCatalog::from_path(path),
            None => Ok(SlotTemplateCatalog::default()),
        }
    }
}
