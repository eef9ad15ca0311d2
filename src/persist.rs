use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::table::Table;

const CACHE_DIR: &str = "tennis_prep";
const CACHE_FILE: &str = "processed.json";
const CACHE_VERSION: u32 = 1;

/// Snapshot of fully processed outputs, keyed by dataset path. Opaque and
/// version-gated; any mismatch or decode failure is just a cache miss.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CacheFile {
    version: u32,
    datasets: HashMap<String, Table>,
}

fn dataset_key(dataset_path: &Path) -> String {
    dataset_path
        .canonicalize()
        .unwrap_or_else(|_| dataset_path.to_path_buf())
        .display()
        .to_string()
}

pub fn load_processed(dataset_path: &Path) -> Option<Table> {
    let path = cache_path()?;
    let raw = fs::read_to_string(&path).ok()?;
    let cache = match serde_json::from_str::<CacheFile>(&raw) {
        Ok(cache) => cache,
        Err(err) => {
            warn!("cache decode failed, reprocessing: {err}");
            return None;
        }
    };
    if cache.version != CACHE_VERSION {
        return None;
    }
    cache.datasets.get(&dataset_key(dataset_path)).cloned()
}

pub fn store_processed(dataset_path: &Path, table: &Table) {
    let Some(path) = cache_path() else {
        return;
    };
    let Some(dir) = path.parent() else {
        return;
    };
    let _ = fs::create_dir_all(dir);

    let mut cache = load_cache_file(&path).unwrap_or_else(|| CacheFile {
        version: CACHE_VERSION,
        datasets: HashMap::new(),
    });
    cache.version = CACHE_VERSION;
    cache
        .datasets
        .insert(dataset_key(dataset_path), table.clone());

    if let Ok(json) = serde_json::to_string(&cache) {
        let tmp = path.with_extension("json.tmp");
        if fs::write(&tmp, json).is_ok() {
            let _ = fs::rename(&tmp, &path);
        }
    }
}

fn load_cache_file(path: &Path) -> Option<CacheFile> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str::<CacheFile>(&raw).ok()
}

fn cache_path() -> Option<PathBuf> {
    // Prefer XDG cache.
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(CACHE_DIR).join(CACHE_FILE));
        }
    }
    // Fallback to ~/.cache on linux-like systems.
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".cache")
            .join(CACHE_DIR)
            .join(CACHE_FILE),
    )
}
