use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Settings for opening an [`Environment`](crate::Environment).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub cache_capacity_bytes: u64,
    /// Background flush interval. `None` disables periodic flushing.
    pub flush_every_ms: Option<u64>,
    /// Flush to disk before `commit` returns.
    pub sync_on_commit: bool,
    /// Remove the database files when the environment is dropped.
    pub temporary: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./index.db"),
            cache_capacity_bytes: 64 * 1024 * 1024,
            flush_every_ms: Some(500),
            sync_on_commit: false,
            temporary: false,
        }
    }
}

impl StoreConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf(), ..Self::default() }
    }

    /// Throwaway store, used by tests and benchmarks.
    pub fn temporary() -> Self {
        Self { temporary: true, flush_every_ms: None, ..Self::default() }
    }

    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut f = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let mut buf = String::new();
        f.read_to_string(&mut buf)?;
        let cfg: StoreConfig = serde_json::from_str(&buf).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    pub(crate) fn to_sled(&self) -> sled::Config {
        let cfg = sled::Config::new()
            .cache_capacity(self.cache_capacity_bytes)
            .flush_every_ms(self.flush_every_ms)
            .temporary(self.temporary);
        if self.temporary {
            cfg
        } else {
            cfg.path(&self.path)
        }
    }
}
