//! Filesystem-backed [`PatchStore`] (§4.B) and [`RunConfigScanner`]
//! (§4.I's `global_update` directory scan), built on the same
//! file-repository pattern as `accounts.rs`/`config_repository.rs`
//! (`tokio::fs`, `#[instrument]`, `Error::Other` for serialization
//! failures) generalized from one fixed file to an arbitrary relative
//! path scoped under a patch's archive root.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use stackpatch_core::entities::{Patch, RunConfig};
use stackpatch_core::error::Error;
use stackpatch_core::ports::{PatchStore, RunConfigScanner};
use tokio::fs;
use tracing::{debug, instrument};

/// A [`PatchStore`] rooted at each patch's own `archive` directory.
/// Stateless — every call resolves the path fresh from `patch.archive`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsPatchStore;

impl FsPatchStore {
    pub fn new() -> Self {
        Self
    }
}

fn map_io_error(e: std::io::Error, path: &Path) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(path.display().to_string())
    } else {
        Error::Io(e)
    }
}

/// Recursively rewrites a JSON value's objects into sorted-key order, for
/// `store_json`'s "pretty-prints with stable key order" contract (§4.B).
fn sorted_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), sorted_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted_keys).collect()),
        other => other.clone(),
    }
}

#[async_trait]
impl PatchStore for FsPatchStore {
    #[instrument(skip(self, patch))]
    async fn exists(&self, patch: &Patch, relative: &str) -> bool {
        fs::try_exists(patch.archive.join(relative)).await.unwrap_or(false)
    }

    #[instrument(skip(self, patch))]
    async fn is_dir(&self, patch: &Patch, relative: &str) -> bool {
        fs::metadata(patch.archive.join(relative))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    #[instrument(skip(self, patch))]
    async fn load(&self, patch: &Patch, relative: &str) -> Result<Vec<u8>, Error> {
        let path = patch.archive.join(relative);
        fs::read(&path).await.map_err(|e| map_io_error(e, &path))
    }

    #[instrument(skip(self, patch, bytes))]
    async fn store(&self, patch: &Patch, relative: &str, bytes: &[u8]) -> Result<(), Error> {
        let path = patch.archive.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("file");
        let tmp_path = path.with_file_name(format!(".{file_name}.tmp-{}", std::process::id()));
        fs::write(&tmp_path, bytes).await?;
        fs::rename(&tmp_path, &path).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "stored file");
        Ok(())
    }

    #[instrument(skip(self, patch))]
    async fn delete(&self, patch: &Patch, relative: &str) -> Result<(), Error> {
        let path = patch.archive.join(relative);
        fs::remove_file(&path).await.map_err(|e| map_io_error(e, &path))
    }

    #[instrument(skip(self, patch))]
    async fn load_json(&self, patch: &Patch, relative: &str) -> Result<Value, Error> {
        let bytes = self.load(patch, relative).await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::parse(format!("{relative}: {e}")))
    }

    #[instrument(skip(self, patch, value))]
    async fn store_json(&self, patch: &Patch, relative: &str, value: &Value) -> Result<(), Error> {
        let sorted = sorted_keys(value);
        let text = serde_json::to_vec_pretty(&sorted)
            .map_err(|e| Error::parse(format!("{relative}: {e}")))?;
        self.store(patch, relative, &text).await
    }

    fn resolve_absolute(&self, patch: &Patch, relative: &str) -> PathBuf {
        patch.archive.join(relative)
    }
}

/// Scans a directory for sibling runconfigs and `games.js`, for
/// `global_update` (§4.I).
#[derive(Debug, Default, Clone, Copy)]
pub struct FsRunConfigScanner;

impl FsRunConfigScanner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RunConfigScanner for FsRunConfigScanner {
    #[instrument(skip(self))]
    async fn scan_sibling_run_configs(&self, dir: &Path) -> Result<Vec<RunConfig>, Error> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut run_configs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("js") {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path).await else {
                continue;
            };
            match serde_json::from_str::<RunConfig>(&content) {
                Ok(run_config) if !run_config.patches.is_empty() => run_configs.push(run_config),
                _ => {
                    debug!(path = %path.display(), "not a run config, skipping");
                }
            }
        }
        Ok(run_configs)
    }

    #[instrument(skip(self))]
    async fn load_games_js(&self, dir: &Path) -> Result<Option<Map<String, Value>>, Error> {
        let path = dir.join("games.js");
        match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => Ok(Some(map)),
                _ => Ok(None),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
