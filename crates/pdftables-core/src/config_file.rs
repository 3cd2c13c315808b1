use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scoring::ScoringWeights;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub cascade: Option<CascadeConfig>,
    pub selector: Option<SelectorConfig>,
    pub ocr: Option<OcrConfig>,
    pub pool: Option<PoolConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CascadeConfig {
    pub confidence_threshold: Option<f64>,
    pub time_budget_secs: Option<f64>,
    pub enhanced_min_confidence: Option<f64>,
    pub text_heuristic_min_confidence: Option<f64>,
    pub text_heuristic_penalty: Option<f64>,
    pub ocr_confidence: Option<f64>,
    pub min_rows: Option<usize>,
    pub default_order: Option<Vec<String>>,
    /// Replaces the whole weight set when present.
    pub weights: Option<ScoringWeights>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub separator_threshold: Option<usize>,
    pub numeric_threshold: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrConfig {
    pub dpi: Option<u32>,
    pub max_pages: Option<usize>,
    pub min_token_confidence: Option<f64>,
    pub row_tolerance: Option<f32>,
    pub scan_sample_pages: Option<usize>,
    pub scanned_text_threshold: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    pub num_workers: Option<usize>,
    pub hard_timeout_secs: Option<u64>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Platform config directory path: `<config_dir>/pdftables/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pdftables").join("config.toml"))
}

/// Load config by cascading CWD `.pdftables.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".pdftables.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    match read_config(path) {
        Ok(config) => Some(config),
        Err(ConfigError::Read { .. }) => None,
        Err(e) => {
            tracing::warn!("{}", e);
            None
        }
    }
}

/// Strict variant of [`load_from_path`] for explicitly requested files.
pub fn read_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// First `Some` of `get` applied to overlay, then base.
fn pick<S, T>(overlay: Option<&S>, base: Option<&S>, get: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay.and_then(&get).or_else(|| base.and_then(&get))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bc, oc) = (base.cascade.as_ref(), overlay.cascade.as_ref());
    let (bs, os) = (base.selector.as_ref(), overlay.selector.as_ref());
    let (bo, oo) = (base.ocr.as_ref(), overlay.ocr.as_ref());
    let (bp, op) = (base.pool.as_ref(), overlay.pool.as_ref());

    ConfigFile {
        cascade: Some(CascadeConfig {
            confidence_threshold: pick(oc, bc, |c| c.confidence_threshold),
            time_budget_secs: pick(oc, bc, |c| c.time_budget_secs),
            enhanced_min_confidence: pick(oc, bc, |c| c.enhanced_min_confidence),
            text_heuristic_min_confidence: pick(oc, bc, |c| c.text_heuristic_min_confidence),
            text_heuristic_penalty: pick(oc, bc, |c| c.text_heuristic_penalty),
            ocr_confidence: pick(oc, bc, |c| c.ocr_confidence),
            min_rows: pick(oc, bc, |c| c.min_rows),
            default_order: pick(oc, bc, |c| c.default_order.clone()),
            weights: pick(oc, bc, |c| c.weights.clone()),
        }),
        selector: Some(SelectorConfig {
            separator_threshold: pick(os, bs, |s| s.separator_threshold),
            numeric_threshold: pick(os, bs, |s| s.numeric_threshold),
        }),
        ocr: Some(OcrConfig {
            dpi: pick(oo, bo, |o| o.dpi),
            max_pages: pick(oo, bo, |o| o.max_pages),
            min_token_confidence: pick(oo, bo, |o| o.min_token_confidence),
            row_tolerance: pick(oo, bo, |o| o.row_tolerance),
            scan_sample_pages: pick(oo, bo, |o| o.scan_sample_pages),
            scanned_text_threshold: pick(oo, bo, |o| o.scanned_text_threshold),
        }),
        pool: Some(PoolConfig {
            num_workers: pick(op, bp, |p| p.num_workers),
            hard_timeout_secs: pick(op, bp, |p| p.hard_timeout_secs),
        }),
    }
}
