//! The patch updater (§4.H) and stack updater (§4.I), grounded line-for-line
//! in `patch_update()`/`stack_update()`/`global_update()` in
//! `original_source/thcrap_update/src/update.cpp`.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::entities::{
    crc32, join_mirror_url, manifest_get, update_filter_games, update_filter_global, Manifest,
    ManifestEntry, MirrorPool, Patch, PatchUpdateStatus, RunConfig,
};
use crate::error::{Error, NetError};
use crate::ports::{Downloader, MirrorPoolCache, PatchStore, ProgressCallback, RunConfigScanner};

/// The store/downloader/mirror-pool-cache/runconfig-scanner ports a caller
/// hands the updater, per §9's "explicit download environment" design note.
/// Cheap to clone: every field is an `Arc`.
#[derive(Clone)]
pub struct UpdateEnvironment {
    pub store: Arc<dyn PatchStore>,
    pub downloader: Arc<dyn Downloader>,
    pub mirror_cache: Arc<dyn MirrorPoolCache>,
    pub scanner: Arc<dyn RunConfigScanner>,
}

impl UpdateEnvironment {
    pub fn new(
        store: Arc<dyn PatchStore>,
        downloader: Arc<dyn Downloader>,
        mirror_cache: Arc<dyn MirrorPoolCache>,
        scanner: Arc<dyn RunConfigScanner>,
    ) -> Self {
        Self {
            store,
            downloader,
            mirror_cache,
            scanner,
        }
    }
}

/// Result of updating one patch: the terminal status plus how many files
/// were actually fetched or removed during the fetch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchUpdateOutcome {
    pub status: PatchUpdateStatus,
    pub files_changed: usize,
}

impl PatchUpdateOutcome {
    fn new(status: PatchUpdateStatus, files_changed: usize) -> Self {
        Self {
            status,
            files_changed,
        }
    }
}

/// One progress event surfaced to a `stack_update` caller, carrying the
/// full `(stack_index, stack_total, patch, patch_index, patch_total, file,
/// status, bytes, total)` tuple from §4.I.
#[derive(Debug, Clone, Copy)]
pub struct StackProgress<'a> {
    pub stack_index: usize,
    pub stack_total: usize,
    pub patch: &'a Patch,
    pub file_index: usize,
    pub file_total: usize,
    pub file: &'a str,
    pub stage: FileStage,
    pub bytes: u64,
    pub total_bytes: u64,
}

/// Where a single file is in its transfer, for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStage {
    Start,
    Progress,
    Stored,
    Deleted,
    Skipped,
    Failed,
}

/// Either the update halted because every mirror is exhausted ("offline"),
/// or a non-retryable error occurred.
enum FetchOutcome {
    Halt,
    Failed(Error),
}

/// Tries mirrors in `get_first()`/round-robin order until one succeeds,
/// disabling each one that fails (§4.F round-robin fallback). Returns
/// `FetchOutcome::Halt` once no active mirror remains.
async fn fetch_via_mirrors(
    pool: &Arc<Mutex<MirrorPool>>,
    downloader: &dyn Downloader,
    key: &str,
    expected_crc: Option<u32>,
    progress: &ProgressCallback<'_>,
) -> Result<Vec<u8>, FetchOutcome> {
    loop {
        let picked = {
            let guard = pool.lock().await;
            guard.get_first().map(|idx| (idx, guard.mirrors()[idx].url.clone()))
        };
        let Some((idx, url)) = picked else {
            return Err(FetchOutcome::Halt);
        };
        let full_url = join_mirror_url(&url, key);
        match downloader.http_get(&full_url, progress).await {
            Ok(ctx) if ctx.is_empty() => {
                let mut guard = pool.lock().await;
                guard.mirrors_mut()[idx].disable();
                tracing::warn!(url = %full_url, "zero-byte response, disabling mirror");
                continue;
            }
            Ok(ctx) => {
                if let Some(expected) = expected_crc {
                    let actual = crc32(&ctx.buffer);
                    if actual != expected {
                        let mut guard = pool.lock().await;
                        guard.mirrors_mut()[idx].disable();
                        tracing::warn!(url = %full_url, expected, actual, "CRC mismatch, disabling mirror");
                        continue;
                    }
                }
                let mut guard = pool.lock().await;
                let connect_ticks = ctx.timings.time_ping.saturating_sub(ctx.timings.time_start) as u64;
                guard.mirrors_mut()[idx].push_ping(connect_ticks);
                return Ok(ctx.buffer);
            }
            Err(e) => {
                let mut guard = pool.lock().await;
                guard.mirrors_mut()[idx].disable();
                let fatal = !e.disables_mirror();
                tracing::warn!(url = %full_url, error = %e, "mirror attempt failed, disabling");
                if fatal {
                    return Err(FetchOutcome::Failed(e));
                }
            }
        }
    }
}

fn no_progress(_bytes: u64, _total: u64) -> bool {
    true
}

/// Updates one patch per §4.H. `filter` decides which manifest keys are
/// in scope (e.g. the "games" filter `global_update` applies); pass
/// `|_| true` for an unfiltered `stack_update` pass.
pub async fn patch_update(
    env: &UpdateEnvironment,
    patch: &Patch,
    filter: &(dyn Fn(&str) -> bool + Send + Sync),
    mut on_file: impl FnMut(&str, FileStage, u64, u64, usize, usize) + Send,
) -> PatchUpdateOutcome {
    if let Some(parent) = patch.archive.parent() {
        if parent.join(".git").exists() {
            tracing::info!(patch = %patch.id, "skipped: under external vcs");
            return PatchUpdateOutcome::new(PatchUpdateStatus::Skipped, 0);
        }
    }
    if !patch.update {
        tracing::info!(patch = %patch.id, "skipped: update disabled for this patch");
        return PatchUpdateOutcome::new(PatchUpdateStatus::Skipped, 0);
    }
    if patch.valid_servers().is_empty() {
        tracing::warn!(patch = %patch.id, "offline: no mirrors configured");
        return PatchUpdateOutcome::new(PatchUpdateStatus::Offline, 0);
    }

    let mut local_manifest: Manifest = match env.store.load_json(patch, "files.js").await {
        Ok(Value::Object(map)) => map,
        _ => Manifest::new(),
    };

    let pool = env.mirror_cache.get_or_create(patch).await;

    let remote_bytes = match fetch_via_mirrors(&pool, env.downloader.as_ref(), "files.js", None, &no_progress).await
    {
        Ok(bytes) => bytes,
        Err(FetchOutcome::Halt) => {
            tracing::warn!(patch = %patch.id, "offline: all mirrors failed fetching the remote manifest");
            return PatchUpdateOutcome::new(PatchUpdateStatus::Offline, 0);
        }
        Err(FetchOutcome::Failed(e)) => {
            tracing::error!(patch = %patch.id, error = %e, "error fetching remote manifest");
            return PatchUpdateOutcome::new(PatchUpdateStatus::Error, 0);
        }
    };

    let remote_manifest: Manifest = match serde_json::from_slice::<Value>(&remote_bytes) {
        Ok(Value::Object(map)) => map,
        _ => {
            tracing::warn!(patch = %patch.id, "remote manifest did not parse as a JSON object");
            return PatchUpdateOutcome::new(PatchUpdateStatus::ManifestInvalid, 0);
        }
    };

    let mut to_process: Vec<String> = Vec::new();
    for (key, remote_value) in remote_manifest.iter() {
        if !filter(key) {
            continue;
        }
        let exists_locally = env.store.exists(patch, key).await;
        if manifest_get(&local_manifest, key).is_some() && !exists_locally {
            local_manifest.remove(key);
        }
        let lv = manifest_get(&local_manifest, key);
        let rv = ManifestEntry::from_json(remote_value);
        // A remote tombstone only requires action if we have a local entry
        // for it at all; a file neither side has ever recorded is simply
        // not in scope, not "needs deleting".
        let needs_update = match &rv {
            Some(ManifestEntry::Tombstone) => lv.is_some() && exists_locally,
            _ => rv != lv || !exists_locally,
        };
        if needs_update {
            to_process.push(key.clone());
        }
    }

    if to_process.is_empty() {
        tracing::info!(patch = %patch.id, "up to date");
        return PatchUpdateOutcome::new(PatchUpdateStatus::UpToDate, 0);
    }

    let total = to_process.len();
    let mut changed = 0usize;

    for (index, key) in to_process.iter().enumerate() {
        on_file(key, FileStage::Start, 0, 0, index, total);
        let remote_value = remote_manifest.get(key).expect("key came from this manifest");
        let rv = ManifestEntry::from_json(remote_value);
        let lv = manifest_get(&local_manifest, key);

        let progress_cb = |bytes: u64, total_bytes: u64| -> bool {
            let _ = (bytes, total_bytes);
            true
        };

        // Four cases, in this order, mirroring `PatchFileRequiresUpdate`'s
        // companion fetch step: a null remote paired with a locally known
        // CRC is a conditional delete; any other null local entry is an
        // unconditional delete (checked before the CRC-download case, so a
        // remote re-adding a file we'd tombstoned locally still deletes);
        // an integer remote CRC downloads with integrity checking; anything
        // else (string/object/array) downloads with no CRC check and the
        // raw remote value is written back into the manifest.
        if matches!(rv, Some(ManifestEntry::Tombstone)) && matches!(lv, Some(ManifestEntry::Crc(_))) {
            let Some(ManifestEntry::Crc(lv_crc)) = lv else {
                unreachable!("matched above")
            };
            match env.store.load(patch, key).await {
                Ok(bytes) if crc32(&bytes) == lv_crc => {
                    env.store.delete(patch, key).await.ok();
                    local_manifest.remove(key);
                    changed += 1;
                    on_file(key, FileStage::Deleted, 0, 0, index, total);
                }
                Ok(_) => {
                    tracing::warn!(patch = %patch.id, file = key, "locally changed, skipping deletion");
                    on_file(key, FileStage::Skipped, 0, 0, index, total);
                }
                Err(_) => {
                    on_file(key, FileStage::Skipped, 0, 0, index, total);
                }
            }
        } else if matches!(lv, Some(ManifestEntry::Tombstone)) {
            if env.store.exists(patch, key).await {
                env.store.delete(patch, key).await.ok();
            }
            local_manifest.remove(key);
            changed += 1;
            on_file(key, FileStage::Deleted, 0, 0, index, total);
        } else if let Some(ManifestEntry::Crc(rv_crc)) = rv {
            match fetch_via_mirrors(&pool, env.downloader.as_ref(), key, Some(rv_crc), &progress_cb).await {
                Ok(bytes) => {
                    if env.store.store(patch, key, &bytes).await.is_ok() {
                        local_manifest.insert(key.clone(), Value::from(rv_crc));
                        changed += 1;
                        on_file(key, FileStage::Stored, bytes.len() as u64, bytes.len() as u64, index, total);
                    } else {
                        on_file(key, FileStage::Failed, 0, 0, index, total);
                    }
                }
                Err(FetchOutcome::Halt) => {
                    env.store.store_json(patch, "files.js", &Value::Object(local_manifest)).await.ok();
                    tracing::warn!(patch = %patch.id, "offline: mirrors exhausted mid-update");
                    return PatchUpdateOutcome::new(PatchUpdateStatus::Offline, changed);
                }
                Err(FetchOutcome::Failed(e)) => {
                    tracing::error!(patch = %patch.id, file = key, error = %e, "download failed");
                    on_file(key, FileStage::Failed, 0, 0, index, total);
                }
            }
        } else {
            let remote_value = remote_value.clone();
            match fetch_via_mirrors(&pool, env.downloader.as_ref(), key, None, &progress_cb).await {
                Ok(bytes) => {
                    if env.store.store(patch, key, &bytes).await.is_ok() {
                        local_manifest.insert(key.clone(), remote_value);
                        changed += 1;
                        on_file(key, FileStage::Stored, bytes.len() as u64, bytes.len() as u64, index, total);
                    } else {
                        on_file(key, FileStage::Failed, 0, 0, index, total);
                    }
                }
                Err(FetchOutcome::Halt) => {
                    env.store.store_json(patch, "files.js", &Value::Object(local_manifest)).await.ok();
                    tracing::warn!(patch = %patch.id, "offline: mirrors exhausted mid-update");
                    return PatchUpdateOutcome::new(PatchUpdateStatus::Offline, changed);
                }
                Err(FetchOutcome::Failed(e)) => {
                    tracing::error!(patch = %patch.id, file = key, error = %e, "download failed");
                    on_file(key, FileStage::Failed, 0, 0, index, total);
                }
            }
        }

        env.store.store_json(patch, "files.js", &Value::Object(local_manifest.clone())).await.ok();
    }

    PatchUpdateOutcome::new(PatchUpdateStatus::UpToDate, changed)
}

/// Drives the patch updater sequentially over `run_config.patches`,
/// surfacing one [`StackProgress`] event per file (§4.I `stack_update`).
pub async fn stack_update(
    env: &UpdateEnvironment,
    run_config: &RunConfig,
    filter: &(dyn Fn(&str) -> bool + Send + Sync),
    mut on_progress: impl FnMut(StackProgress<'_>) + Send,
) -> Vec<(String, PatchUpdateOutcome)> {
    let stack_total = run_config.patches.len();
    let mut results = Vec::with_capacity(stack_total);

    for (stack_index, patch) in run_config.patches.iter().enumerate() {
        let outcome = patch_update(
            env,
            patch,
            filter,
            |file, stage, bytes, total_bytes, file_index, file_total| {
                on_progress(StackProgress {
                    stack_index,
                    stack_total,
                    patch,
                    file_index,
                    file_total,
                    file,
                    stage,
                    bytes,
                    total_bytes,
                });
            },
        )
        .await;
        results.push((patch.id.clone(), outcome));
    }

    results
}

/// Outcome of a `global_update` call: per §4.I, it does nothing at all
/// (not even a default unfiltered update) if no `games.js` is found.
pub enum GlobalUpdateOutcome {
    NoGamesJs,
    Updated(Vec<(String, PatchUpdateOutcome)>),
}

/// Scans `dir` for sibling runconfig files, unions their patches by
/// archive path (first occurrence wins), and updates each against the
/// `games.js`-derived filter (§4.I `global_update`).
pub async fn global_update(
    env: &UpdateEnvironment,
    dir: &Path,
    mut on_progress: impl FnMut(StackProgress<'_>) + Send,
) -> Result<GlobalUpdateOutcome, Error> {
    let games_js = env.scanner.load_games_js(dir).await?;
    let Some(games_js) = games_js else {
        tracing::info!(dir = %dir.display(), "no games.js found, global update is a no-op");
        return Ok(GlobalUpdateOutcome::NoGamesJs);
    };

    let mut games: Vec<String> = games_js.keys().cloned().collect();
    games.sort();

    let run_configs = env.scanner.scan_sibling_run_configs(dir).await?;

    let mut by_archive: Vec<Patch> = Vec::new();
    let mut seen_archives = std::collections::HashSet::new();
    for run_config in &run_configs {
        for patch in &run_config.patches {
            if seen_archives.insert(patch.archive.clone()) {
                by_archive.push(patch.clone());
            }
        }
    }

    let filter = move |fn_: &str| {
        if games.is_empty() {
            update_filter_global(fn_)
        } else {
            update_filter_games(fn_, &games)
        }
    };

    let stack_total = by_archive.len();
    let mut results = Vec::with_capacity(stack_total);
    for (stack_index, patch) in by_archive.iter().enumerate() {
        let outcome = patch_update(
            env,
            patch,
            &filter,
            |file, stage, bytes, total_bytes, file_index, file_total| {
                on_progress(StackProgress {
                    stack_index,
                    stack_total,
                    patch,
                    file_index,
                    file_total,
                    file,
                    stage,
                    bytes,
                    total_bytes,
                });
            },
        )
        .await;
        results.push((patch.id.clone(), outcome));
    }

    Ok(GlobalUpdateOutcome::Updated(results))
}

/// Thin convenience wrapper bundling [`stack_update`]/[`global_update`]
/// with a fixed [`UpdateEnvironment`], for callers (like the CLI) that
/// don't want to thread it through every call.
pub struct StackUpdater {
    env: UpdateEnvironment,
}

impl StackUpdater {
    pub fn new(env: UpdateEnvironment) -> Self {
        Self { env }
    }

    pub async fn stack_update(
        &self,
        run_config: &RunConfig,
        filter: &(dyn Fn(&str) -> bool + Send + Sync),
        on_progress: impl FnMut(StackProgress<'_>) + Send,
    ) -> Vec<(String, PatchUpdateOutcome)> {
        stack_update(&self.env, run_config, filter, on_progress).await
    }

    pub async fn global_update(
        &self,
        dir: &Path,
        on_progress: impl FnMut(StackProgress<'_>) + Send,
    ) -> Result<GlobalUpdateOutcome, Error> {
        global_update(&self.env, dir, on_progress).await
    }
}
