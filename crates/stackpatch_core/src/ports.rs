//! Port traits: the seams between the pure algorithms in this crate and
//! concrete I/O supplied by `stackpatch_adapters`. One trait per external
//! capability, `async-trait` for the async ones.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::entities::{DownloadContext, MirrorPool, Patch, RunConfig};
use crate::error::Error;

/// Operations on a patch's files, scoped to its archive root (§4.B).
#[async_trait]
pub trait PatchStore: Send + Sync {
    async fn exists(&self, patch: &Patch, relative: &str) -> bool;
    async fn is_dir(&self, patch: &Patch, relative: &str) -> bool;
    async fn load(&self, patch: &Patch, relative: &str) -> Result<Vec<u8>, Error>;
    async fn store(&self, patch: &Patch, relative: &str, bytes: &[u8]) -> Result<(), Error>;
    async fn delete(&self, patch: &Patch, relative: &str) -> Result<(), Error>;
    async fn load_json(&self, patch: &Patch, relative: &str) -> Result<Value, Error>;
    async fn store_json(&self, patch: &Patch, relative: &str, value: &Value) -> Result<(), Error>;
    fn resolve_absolute(&self, patch: &Patch, relative: &str) -> PathBuf;
}

/// The "virtual JSON source" collaborator consulted before any on-disk
/// patch file, per §4.D step 2. Returns the value and its serialized size
/// if it has one for `fn`.
#[async_trait]
pub trait VirtualJsonSource: Send + Sync {
    async fn get(&self, fn_: &str) -> Option<(Value, usize)>;
}

/// A `VirtualJsonSource` with nothing to contribute, for callers with no
/// such collaborator.
pub struct NoopVirtualJsonSource;

#[async_trait]
impl VirtualJsonSource for NoopVirtualJsonSource {
    async fn get(&self, _fn_: &str) -> Option<(Value, usize)> {
        None
    }
}

/// Progress/cancellation callback shape for a download: called with bytes
/// transferred so far and the total (0 if unknown); returning `false`
/// cancels the transfer (§4.G).
pub type ProgressCallback<'a> = dyn Fn(u64, u64) -> bool + Send + Sync + 'a;

/// One HTTP GET with progress reporting and status classification
/// (§4.G). Implementations classify failures into the taxonomy in
/// [`crate::error::Error`]; a successful fetch returns the bytes and
/// timings.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn http_get(
        &self,
        url: &str,
        progress: &ProgressCallback<'_>,
    ) -> Result<DownloadContext, Error>;
}

/// Process-global (or caller-scoped) cache of one [`MirrorPool`] per patch,
/// keyed by `Patch.id` (see DESIGN.md for why identity-of-servers-array
/// could not be carried over verbatim). Lazily constructs a pool on first
/// request for a given patch and reuses it afterward.
#[async_trait]
pub trait MirrorPoolCache: Send + Sync {
    async fn get_or_create(&self, patch: &Patch) -> Arc<Mutex<MirrorPool>>;
}

/// Directory-scanning collaborator for `global_update` (§4.I): finds every
/// sibling runconfig and the optional `games.js` in a directory. Kept as its
/// own port, separate from [`PatchStore`] (which is always scoped to one
/// patch's archive root), since `global_update` reads a directory of
/// runconfig files that sit alongside patch archives, not inside one.
#[async_trait]
pub trait RunConfigScanner: Send + Sync {
    /// Every `*.js` file directly under `dir` that parses as a run config
    /// with a non-empty `patches` array. Malformed or unrelated `*.js`
    /// files are skipped, not treated as an error.
    async fn scan_sibling_run_configs(&self, dir: &std::path::Path) -> Result<Vec<RunConfig>, Error>;

    /// `games.js` in `dir`, if present and it parses as a JSON object.
    async fn load_games_js(
        &self,
        dir: &std::path::Path,
    ) -> Result<Option<serde_json::Map<String, Value>>, Error>;
}
