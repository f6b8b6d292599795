// src/config/sources.rs
//! The list of handles to watch. A `.toml` file holds `sources = [...]`;
//! any other file is a bare JSON array of strings.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

pub const ENV_SOURCES_PATH: &str = "MONITOR_SOURCES_PATH";
pub const DEFAULT_SOURCES_PATH: &str = "config/users.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Toml,
    Json,
}

impl SourceFormat {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }

    fn parse(self, data: &str) -> Result<Vec<String>> {
        let handles = match self {
            Self::Toml => {
                #[derive(Deserialize)]
                struct SourcesFile {
                    sources: Vec<String>,
                }
                toml::from_str::<SourcesFile>(data)
                    .context("expected `sources = [...]`")?
                    .sources
            }
            Self::Json => serde_json::from_str::<Vec<String>>(data)
                .context("expected a JSON array of handles")?,
        };
        Ok(normalize_handles(handles))
    }
}

/// Read and clean the handle list stored at `path`.
pub fn read_sources(path: &Path) -> Result<Vec<String>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    SourceFormat::of(path)
        .parse(&data)
        .with_context(|| format!("parsing sources in {}", path.display()))
}

/// Trim, strip a leading `@`, drop empties and case-insensitive duplicates.
/// First spelling wins; configured order is kept.
fn normalize_handles(handles: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    handles
        .into_iter()
        .filter_map(|h| {
            let h = h.trim().trim_start_matches('@').trim();
            (!h.is_empty() && seen.insert(h.to_ascii_lowercase())).then(|| h.to_string())
        })
        .collect()
}

/// Source list shared by the scheduler and manual triggers. Loaded lazily and
/// kept until [`SourceRegistry::invalidate`] is called.
pub struct SourceRegistry {
    path: Option<PathBuf>,
    cache: RwLock<Option<Vec<String>>>,
}

impl SourceRegistry {
    /// Backed by `path`, unless `$MONITOR_SOURCES_PATH` names another file.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            cache: RwLock::new(None),
        }
    }

    /// Fixed in-memory list; `invalidate` is a no-op.
    pub fn fixed(sources: Vec<String>) -> Self {
        Self {
            path: None,
            cache: RwLock::new(Some(normalize_handles(sources))),
        }
    }

    /// Current sources. A load failure is logged and yields an empty list so
    /// the pass does nothing instead of failing.
    pub fn list(&self) -> Vec<String> {
        if let Some(v) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return v.clone();
        }
        let Some(configured) = &self.path else {
            return Vec::new();
        };
        match Self::load(configured) {
            Ok(v) => {
                info!(target: "ingest", count = v.len(), "sources loaded");
                *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(v.clone());
                v
            }
            Err(e) => {
                warn!(target: "ingest", error = ?e, "loading sources failed");
                Vec::new()
            }
        }
    }

    pub fn invalidate(&self) {
        if self.path.is_some() {
            *self.cache.write().unwrap_or_else(PoisonError::into_inner) = None;
        }
    }

    /// An env override must exist. A missing configured file means nothing to watch.
    fn load(configured: &Path) -> Result<Vec<String>> {
        if let Some(p) = std::env::var_os(ENV_SOURCES_PATH) {
            return read_sources(Path::new(&p))
                .with_context(|| format!("{ENV_SOURCES_PATH} is set"));
        }
        if !configured.exists() {
            return Ok(Vec::new());
        }
        read_sources(configured)
    }
}
