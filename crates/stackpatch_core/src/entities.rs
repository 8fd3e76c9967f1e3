use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Run configuration
// =============================================================================

/// One mirror URL as configured on a patch. Validated on `Patch::servers()`
/// construction: must contain `"://"` at an offset of at least 1.
pub type ServerUrl = String;

/// A single patch: a directory tree of overlay files plus metadata, and its
/// place (via array index) in the priority order of a [`RunConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    pub id: String,
    pub archive: PathBuf,
    #[serde(default)]
    pub servers: Vec<ServerUrl>,
    #[serde(default)]
    pub motd: Option<String>,
    #[serde(default)]
    pub motd_title: Option<String>,
    #[serde(default)]
    pub motd_type: Option<u32>,
    #[serde(default = "default_true")]
    pub update: bool,
    #[serde(default)]
    pub thcrap_version_min: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl Patch {
    pub fn new(id: impl Into<String>, archive: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            archive: archive.into(),
            servers: Vec::new(),
            motd: None,
            motd_title: None,
            motd_type: None,
            update: true,
            thcrap_version_min: None,
        }
    }

    /// Entries in `servers` that are well-formed mirror URLs: a string
    /// containing `"://"` at an offset of at least 1. Malformed entries are
    /// dropped silently here; the caller (mirror pool construction) is
    /// responsible for warning about each rejection.
    pub fn valid_servers(&self) -> Vec<&str> {
        self.servers
            .iter()
            .filter(|s| is_valid_server_url(s))
            .map(|s| s.as_str())
            .collect()
    }

    /// Absolute path to `r`, relative to this patch's archive root.
    pub fn resolve_absolute(&self, relative: &str) -> PathBuf {
        self.archive.join(relative)
    }

    /// Whether this patch contains content relevant to `game` (and,
    /// optionally, `build`): a `<game>.js` file, a `<game>/` directory, or
    /// (when a build is given) a `<game>.<build>.js` file. Grounded on the
    /// original `stack_remove_if_unneeded`'s relevance check; unlike the
    /// original, this does not mutate any patch list — it only answers the
    /// question, leaving pruning to the caller.
    pub fn is_relevant_to(&self, game: &str, build: Option<&str>) -> bool {
        if self.archive.join(format!("{game}.js")).is_file() {
            return true;
        }
        if self.archive.join(game).is_dir() {
            return true;
        }
        if let Some(build) = build {
            if self.archive.join(format!("{game}.{build}.js")).is_file() {
                return true;
            }
        }
        false
    }
}

pub fn is_valid_server_url(s: &str) -> bool {
    match s.find("://") {
        Some(offset) => offset >= 1,
        None => false,
    }
}

/// The loaded, read-only run configuration: the ordered patch stack plus
/// the current game/build context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub patches: Vec<Patch>,
    #[serde(default)]
    pub game: Option<String>,
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub thcrap_dir: Option<PathBuf>,
    /// Arbitrary extra key/value pairs consumed by collaborators this core
    /// does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl RunConfig {
    pub fn patch_by_id(&self, id: &str) -> Option<&Patch> {
        self.patches.iter().find(|p| p.id == id)
    }
}

// =============================================================================
// Variant chain (path synthesizer, §4.A)
// =============================================================================

/// Inserts `.{build}` before the filename's final extension. A filename
/// with no extension gets the build appended after a `.` separator. An
/// empty build collapses the distinction — callers should prefer
/// `variant_chain` which already handles that case.
pub fn fn_for_build(fn_: &str, build: &str) -> String {
    match fn_.rfind('.') {
        Some(idx) => format!("{}.{}{}", &fn_[..idx], build, &fn_[idx..]),
        None => format!("{fn_}.{build}"),
    }
}

/// Rewrites `fn` to `<game>/<fn>`, or leaves it unchanged if no game is set.
pub fn fn_for_game(fn_: &str, game: Option<&str>) -> String {
    match game {
        Some(game) if !game.is_empty() => format!("{game}/{fn_}"),
        _ => fn_.to_string(),
    }
}

/// Generic-domain variant chain: `[fn, fn_for_build(fn)]`. An empty build
/// collapses to `[fn, fn]` (duplicates tolerated, per §3).
pub fn variant_chain(fn_: &str, build: Option<&str>) -> Vec<String> {
    let build_variant = match build {
        Some(build) if !build.is_empty() => fn_for_build(fn_, build),
        _ => fn_.to_string(),
    };
    vec![fn_.to_string(), build_variant]
}

/// Game-scoped variant chain: rewrite to `<game>/<fn>` first, then apply
/// the generic rule.
pub fn variant_chain_game(fn_: &str, game: Option<&str>, build: Option<&str>) -> Vec<String> {
    let game_fn = fn_for_game(fn_, game);
    variant_chain(&game_fn, build)
}

// =============================================================================
// Manifests (§3, §6)
// =============================================================================

/// One entry in a manifest: a CRC32 of the current file bytes, or a
/// tombstone instructing deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestEntry {
    Crc(u32),
    Tombstone,
}

impl ManifestEntry {
    pub fn from_json(v: &Value) -> Option<Self> {
        if v.is_null() {
            return Some(ManifestEntry::Tombstone);
        }
        v.as_u64().map(|n| ManifestEntry::Crc(n as u32))
    }

    pub fn to_json(self) -> Value {
        match self {
            ManifestEntry::Crc(crc) => Value::from(crc),
            ManifestEntry::Tombstone => Value::Null,
        }
    }

    pub fn as_crc(self) -> Option<u32> {
        match self {
            ManifestEntry::Crc(crc) => Some(crc),
            ManifestEntry::Tombstone => None,
        }
    }
}

/// A manifest: relative path (using `/` separators) to either a CRC32 or a
/// tombstone. Order-preserving, since the fetch loop must process remote
/// manifest entries "in remote manifest order".
pub type Manifest = serde_json::Map<String, Value>;

pub fn manifest_get(manifest: &Manifest, key: &str) -> Option<ManifestEntry> {
    manifest.get(key).and_then(ManifestEntry::from_json)
}

// =============================================================================
// Mirror pool (§3, §4.F)
// =============================================================================

/// Number of connect-time samples retained per mirror.
pub const PING_HISTORY_LEN: usize = 4;

/// One mirror endpoint and its adaptive-probing state.
#[derive(Debug, Clone)]
pub struct Mirror {
    pub url: String,
    ping_history: [u64; PING_HISTORY_LEN],
    pub active: bool,
    pub visited: bool,
}

impl Mirror {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ping_history: [0; PING_HISTORY_LEN],
            active: true,
            visited: false,
        }
    }

    pub fn unused(&self) -> bool {
        !self.visited
    }

    /// Shifts the ping history left by one and appends `sample_ticks`,
    /// mirroring the fixed 4-sample shift buffer in the original
    /// `server_t::ping_push`.
    pub fn push_ping(&mut self, sample_ticks: u64) {
        self.ping_history.copy_within(1.., 0);
        self.ping_history[PING_HISTORY_LEN - 1] = sample_ticks;
        self.visited = true;
    }

    /// Sum of non-zero samples divided by their count; `0` if there are no
    /// non-zero samples (treated as "infinitely fast" only by the unused
    /// branch of selection, never compared directly against a visited
    /// mirror with an actual average).
    pub fn ping_average(&self) -> u64 {
        let nonzero: Vec<u64> = self.ping_history.iter().copied().filter(|&s| s != 0).collect();
        if nonzero.is_empty() {
            return 0;
        }
        nonzero.iter().sum::<u64>() / nonzero.len() as u64
    }

    pub fn disable(&mut self) {
        self.active = false;
    }
}

/// Per-patch set of mirrors with adaptive selection. Pure bookkeeping: no
/// network I/O happens here, only the decision of which mirror to try.
#[derive(Debug, Clone, Default)]
pub struct MirrorPool {
    mirrors: Vec<Mirror>,
}

impl MirrorPool {
    /// Builds a pool from a patch's raw `servers` entries, rejecting (with
    /// a warning logged here) any that are not well-formed mirror URLs.
    pub fn from_servers(servers: &[String]) -> Self {
        let mirrors = servers
            .iter()
            .filter(|s| {
                let ok = is_valid_server_url(s);
                if !ok {
                    tracing::warn!(server = %s, "not a URI, rejecting mirror");
                }
                ok
            })
            .map(|s| Mirror::new(s.clone()))
            .collect();
        Self { mirrors }
    }

    pub fn mirrors(&self) -> &[Mirror] {
        &self.mirrors
    }

    pub fn mirrors_mut(&mut self) -> &mut [Mirror] {
        &mut self.mirrors
    }

    pub fn num_active(&self) -> usize {
        self.mirrors.iter().filter(|m| m.active).count()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    /// Selection algorithm (§4.F `get_first`): among active mirrors,
    /// prefer the first unused one by index; otherwise the visited mirror
    /// with the lowest non-zero ping average, ties broken by first-in-list.
    /// Returns `None` if no active mirror is available.
    ///
    /// Deliberately follows the distilled spec's literal "first such"
    /// wording for the unused case rather than the source's loop, which
    /// (due to an unconditional overwrite with no early break) ends up
    /// returning the *last* unused mirror scanned. See DESIGN.md.
    pub fn get_first(&self) -> Option<usize> {
        for (idx, mirror) in self.mirrors.iter().enumerate() {
            if mirror.active && mirror.unused() {
                return Some(idx);
            }
        }
        let mut best: Option<(usize, u64)> = None;
        for (idx, mirror) in self.mirrors.iter().enumerate() {
            if !mirror.active || mirror.unused() {
                continue;
            }
            let avg = mirror.ping_average();
            if avg == 0 {
                continue;
            }
            match best {
                Some((_, best_avg)) if avg >= best_avg => {}
                _ => best = Some((idx, avg)),
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Circular try order starting at `get_first()`'s pick, covering every
    /// mirror index at most once. Empty if no mirror is selectable.
    pub fn round_robin_order(&self) -> Vec<usize> {
        let total = self.mirrors.len();
        let Some(start) = self.get_first() else {
            return Vec::new();
        };
        (0..total).map(|i| (start + i) % total).collect()
    }
}

// =============================================================================
// Download context (§3, §4.G)
// =============================================================================

/// Status classification of one `http_get` attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    Ok,
    NotAvailable,
    ServerError,
    Cancelled,
    OutOfMemory,
    InvalidParameter,
}

/// Per-request timing, captured from a monotonic clock at three points.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadTimings {
    pub time_start: u128,
    pub time_ping: u128,
    pub time_end: u128,
}

/// The bytes, size, and timings of a completed (successful or failed)
/// download attempt.
#[derive(Debug, Clone, Default)]
pub struct DownloadContext {
    pub buffer: Vec<u8>,
    pub timings: DownloadTimings,
}

impl DownloadContext {
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Outcome of a single patch's update pass (§4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchUpdateStatus {
    UpToDate,
    Skipped,
    Offline,
    ManifestInvalid,
    Error,
}

/// Computes the CRC32 (IEEE polynomial `0xedb88320`, initial `0`) of a byte
/// slice. A thin wrapper so call sites read in domain terms.
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Join a mirror's base URL with a manifest key the way a browser's
/// relative-URL resolution would *not* be trusted to: explicit, since the
/// mirror URL must end in `/` for the natural-looking result, and the key
/// should never begin with one (manifest keys are always relative).
pub fn join_mirror_url(mirror_base: &str, key: &str) -> String {
    let base = mirror_base.trim_end_matches('/');
    let key = key.trim_start_matches('/');
    format!("{base}/{key}")
}

/// `update_filter_games` (§4.I, §8 invariant 6): a relative path passes if
/// it has no `/` (a global, top-level file) or its first path segment
/// equals one of the configured game ids (case-insensitive, requiring a
/// full segment match so `"th14"` does not also match `"th143/x"`).
pub fn update_filter_games(fn_: &str, games: &[String]) -> bool {
    match fn_.find('/') {
        None => true,
        Some(slash) => {
            let first_segment = &fn_[..slash];
            games.iter().any(|g| g.eq_ignore_ascii_case(first_segment))
        }
    }
}

/// `update_filter_global`: true iff `fn` has no `/`.
pub fn update_filter_global(fn_: &str) -> bool {
    !fn_.contains('/')
}

pub fn path_exists(path: &Path) -> bool {
    path.exists()
}
