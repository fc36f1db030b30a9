use crate::index::bitmap::BackendKind;
use crate::index::types::{FilterIndexConfig, DEFAULT_BITMAP_MIN_SIZE, DEFAULT_CHARGRAM_N};
use crate::query::candidate::IntersectOptions;
use crate::query::file_matcher::RegexConfig;
use anyhow::{bail, Context, Result};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Overrides the data directory (config file and saved indexes)
pub const HOME_ENV_VAR: &str = "CHUNKFILTER_HOME";

const APP_NAME: &str = "chunkfilter";
const CONFIG_FILE: &str = "config.json";
const INDEXES_DIR: &str = "indexes";
const INDEX_SUFFIX: &str = ".filter.json";

/// Engine configuration stored in the data directory.
///
/// Every field has a default, so a partial (or empty) config file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Char-gram length for the file-path prefilter
    pub file_chargram_n: usize,
    /// Buckets at or above this size get a bitmap mirror
    pub bitmap_min_size: usize,
    /// Return bitmap allowlists when large enough
    pub prefer_bitmap: bool,
    pub bitmap_backend: BackendKind,
    /// Limits for file regexes
    pub regex: RegexConfig,
    /// Warn when a serialized index is larger than this many bytes
    pub max_index_json_bytes_soft: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            file_chargram_n: DEFAULT_CHARGRAM_N,
            bitmap_min_size: DEFAULT_BITMAP_MIN_SIZE,
            prefer_bitmap: true,
            bitmap_backend: BackendKind::default(),
            regex: RegexConfig::default(),
            max_index_json_bytes_soft: 256 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    /// Config from the data directory, defaults when there is none yet
    pub fn load() -> Result<Self> {
        let path = get_config_path()?;
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write to `path`, creating its directory
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.file_chargram_n == 0 {
            bail!("file_chargram_n must be at least 1");
        }
        if self.bitmap_min_size == 0 {
            bail!("bitmap_min_size must be at least 1");
        }
        if self.regex.max_pattern_length == 0 {
            bail!("regex.max_pattern_length must be at least 1");
        }
        Ok(())
    }

    /// Build settings for a new index
    pub fn index_config(&self) -> FilterIndexConfig {
        FilterIndexConfig {
            file_chargram_n: self.file_chargram_n,
            bitmap_min_size: self.bitmap_min_size,
            include_bitmaps: self.bitmap_backend != BackendKind::Plain,
        }
    }

    pub fn intersect_options(&self) -> IntersectOptions {
        IntersectOptions {
            prefer_bitmap: self.prefer_bitmap,
            bitmap_min_size: self.bitmap_min_size,
        }
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_app_data_dir()?.join(CONFIG_FILE))
}

/// `$CHUNKFILTER_HOME`, else the platform data directory
pub fn get_app_data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV_VAR).filter(|v| !v.is_empty()) {
        Some(home) => PathBuf::from(home),
        None => dirs::data_dir()
            .or_else(dirs::data_local_dir)
            .context("Could not determine app data directory")?
            .join(APP_NAME),
    };
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(dir)
}

/// Default location of the filter index built from a chunk corpus file
pub fn get_index_path(corpus_path: &Path) -> Result<PathBuf> {
    let dir = get_app_data_dir()?.join(INDEXES_DIR);
    fs::create_dir_all(&dir)?;
    Ok(dir.join(index_file_name(corpus_path)))
}

/// `<stem>-<hash>.filter.json`; the stem is kept short and readable, the
/// hash covers the full canonical path
fn index_file_name(corpus_path: &Path) -> String {
    let canonical = corpus_path
        .canonicalize()
        .unwrap_or_else(|_| corpus_path.to_path_buf());

    let stem: String = canonical
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_'))
        .take(16)
        .collect();
    let stem = if stem.is_empty() { "corpus".to_string() } else { stem };

    let mut hasher = FxHasher::default();
    canonical.hash(&mut hasher);
    format!("{}-{:016x}{}", stem, hasher.finish(), INDEX_SUFFIX)
}

/// False when the corpus was modified after the index was written.
///
/// Missing timestamps count as fresh so platforms without mtime still reuse
/// saved indexes.
pub fn is_index_fresh(corpus_path: &Path, index_path: &Path) -> bool {
    let modified = |path: &Path| -> Option<SystemTime> { fs::metadata(path).ok()?.modified().ok() };
    match (modified(corpus_path), modified(index_path)) {
        (Some(corpus), Some(index)) => index >= corpus,
        _ => true,
    }
}
