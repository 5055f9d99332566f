//! Anchor normalization — raw metrics → population-relative 0..10 scores.
//!
//! Each raw metric is turned into a z-score against calibration statistics
//! and then into a percentile via the normal CDF. Eased floor/ceiling bands
//! are a separate post-processing step over that percentile.

use crate::config::{EaseBand, EaseBands};
use crate::geometry::{clamp, normal_cdf, smoothstep};
use crate::metrics::RawMetrics;
use crate::types::{Metric, NormalizedMetrics};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Mean used for any metric the calibration resource does not cover.
pub const FALLBACK_MEAN: f64 = 5.0;
/// Standard deviation used when missing, non-finite or non-positive.
pub const FALLBACK_STD: f64 = 1.5;

const BUNDLED_ANCHORS: &str = include_str!("../data/anchors.json");

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("failed to read calibration file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("calibration document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("calibration unavailable: {0}")]
    Unavailable(String),
}

/// Calibration statistics for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorStat {
    pub mean: f64,
    pub std: f64,
}

impl AnchorStat {
    pub const FALLBACK: AnchorStat = AnchorStat {
        mean: FALLBACK_MEAN,
        std: FALLBACK_STD,
    };
}

/// Where an anchor table came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnchorOrigin {
    Loaded { version: Option<String> },
    Fallback,
}

/// Per-metric calibration statistics. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorTable {
    stats: [AnchorStat; 5],
    origin: AnchorOrigin,
}

#[derive(Deserialize)]
struct StatEntry {
    mean: f64,
    #[serde(default)]
    std: Option<f64>,
}

impl AnchorTable {
    /// Built-in defaults used when calibration cannot be loaded.
    pub fn fallback() -> Self {
        Self {
            stats: [AnchorStat::FALLBACK; 5],
            origin: AnchorOrigin::Fallback,
        }
    }

    /// Table with explicit statistics, ordered as [`Metric::ALL`].
    /// Invalid entries are repaired the same way a loaded document is.
    pub fn with_stats(stats: [AnchorStat; 5], version: Option<String>) -> Self {
        let mut table = Self {
            stats: [AnchorStat::FALLBACK; 5],
            origin: AnchorOrigin::Loaded { version },
        };
        for (metric, stat) in Metric::ALL.into_iter().zip(stats) {
            table.stats[metric_slot(metric)] = sanitize(metric, stat.mean, Some(stat.std));
        }
        table
    }

    /// Parse a calibration document:
    /// `{ "version": "...", "symmetry": { "mean": 7.9, "std": 1.1 }, ... }`.
    pub fn from_json(src: &str) -> Result<Self, CalibrationError> {
        let doc: serde_json::Value = serde_json::from_str(src)?;
        let serde_json::Value::Object(map) = doc else {
            return Err(CalibrationError::Unavailable(
                "calibration document must be a JSON object".into(),
            ));
        };

        let version = map
            .get("version")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let mut stats = [AnchorStat::FALLBACK; 5];
        for metric in Metric::ALL {
            let stat = match map.get(metric.key()) {
                None => {
                    tracing::warn!(%metric, "calibration has no entry for metric; using fallback");
                    AnchorStat::FALLBACK
                }
                Some(value) => match StatEntry::deserialize(value) {
                    Ok(entry) => sanitize(metric, entry.mean, entry.std),
                    Err(e) => {
                        tracing::warn!(%metric, error = %e, "malformed calibration entry; using fallback");
                        AnchorStat::FALLBACK
                    }
                },
            };
            stats[metric_slot(metric)] = stat;
        }

        for key in map.keys() {
            if key != "version" && Metric::from_key(key).is_none() {
                tracing::debug!(key = %key, "ignoring unknown calibration key");
            }
        }

        Ok(Self {
            stats,
            origin: AnchorOrigin::Loaded { version },
        })
    }

    pub fn get(&self, metric: Metric) -> AnchorStat {
        self.stats[metric_slot(metric)]
    }

    pub fn origin(&self) -> &AnchorOrigin {
        &self.origin
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self.origin, AnchorOrigin::Loaded { .. })
    }
}

fn metric_slot(metric: Metric) -> usize {
    match metric {
        Metric::Symmetry => 0,
        Metric::Jawline => 1,
        Metric::Eyes => 2,
        Metric::Skin => 3,
        Metric::Balance => 4,
    }
}

fn sanitize(metric: Metric, mean: f64, std: Option<f64>) -> AnchorStat {
    let mean = if mean.is_finite() {
        mean
    } else {
        tracing::warn!(%metric, mean, "non-finite calibration mean; using fallback");
        FALLBACK_MEAN
    };
    let std = match std {
        Some(s) if s.is_finite() && s > 0.0 => s,
        other => {
            tracing::warn!(%metric, std = ?other, "unusable calibration std; using fallback");
            FALLBACK_STD
        }
    };
    AnchorStat { mean, std }
}

/// Percentile-style 0..10 score of `raw` against `stat`.
pub fn percentile_score(raw: f64, stat: AnchorStat) -> f64 {
    let z = (raw - stat.mean) / stat.std;
    clamp(10.0 * normal_cdf(z), 0.0, 10.0)
}

/// Compress a percentile score into `[floor, ceiling]` with a smooth ease.
/// Scores at or above the ceiling pass through unchanged.
pub fn apply_band(score: f64, band: EaseBand) -> f64 {
    if band.ceiling <= 0.0 || score >= band.ceiling {
        return score;
    }
    let t = smoothstep(score / band.ceiling, 0.0, 1.0);
    band.floor + t * (band.ceiling - band.floor)
}

/// Statistical normalization followed by the configured eased bands.
pub fn normalize(raw: &RawMetrics, anchors: &AnchorTable, bands: &EaseBands) -> NormalizedMetrics {
    NormalizedMetrics::from_fn(|metric| {
        let pct = percentile_score(raw.get(metric), anchors.get(metric));
        match bands.get(metric) {
            Some(band) => clamp(apply_band(pct, band), 0.0, 10.0),
            None => pct,
        }
    })
}

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<String, CalibrationError>> + Send + 'a>>;

/// A calibration resource: file, bundled asset, or anything the host provides.
pub trait AnchorSource: Send + Sync {
    /// Fetch the raw calibration document.
    fn fetch(&self) -> FetchFuture<'_>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;
}

/// Calibration document on disk.
#[derive(Debug, Clone)]
pub struct FileAnchors {
    path: PathBuf,
}

impl FileAnchors {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl AnchorSource for FileAnchors {
    fn fetch(&self) -> FetchFuture<'_> {
        Box::pin(async move {
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| CalibrationError::Io {
                    path: self.path.display().to_string(),
                    source,
                })
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Calibration document compiled into the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledAnchors;

impl AnchorSource for BundledAnchors {
    fn fetch(&self) -> FetchFuture<'_> {
        Box::pin(async { Ok(BUNDLED_ANCHORS.to_string()) })
    }

    fn describe(&self) -> String {
        "bundled".to_string()
    }
}

/// Calibration document held in memory.
#[derive(Debug, Clone)]
pub struct StaticAnchors(pub String);

impl AnchorSource for StaticAnchors {
    fn fetch(&self) -> FetchFuture<'_> {
        Box::pin(async move { Ok(self.0.clone()) })
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}

/// Load-once anchor table.
///
/// The first `get_or_load` fetches from the source; concurrent first callers
/// wait on that same fetch. A failed load caches the fallback table and is
/// not retried.
pub struct AnchorCache {
    source: Arc<dyn AnchorSource>,
    cell: OnceCell<Arc<AnchorTable>>,
}

impl AnchorCache {
    pub fn new(source: Arc<dyn AnchorSource>) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
        }
    }

    /// Cache that is already initialized with `table`; never fetches.
    pub fn preloaded(table: AnchorTable) -> Self {
        Self {
            source: Arc::new(StaticAnchors(String::new())),
            cell: OnceCell::new_with(Some(Arc::new(table))),
        }
    }

    pub async fn get_or_load(&self) -> Arc<AnchorTable> {
        self.cell
            .get_or_init(|| async { Arc::new(self.load().await) })
            .await
            .clone()
    }

    /// The table, if a load has already completed.
    pub fn get(&self) -> Option<Arc<AnchorTable>> {
        self.cell.get().cloned()
    }

    async fn load(&self) -> AnchorTable {
        let source = self.source.describe();
        let parsed = match self.source.fetch().await {
            Ok(doc) => AnchorTable::from_json(&doc),
            Err(e) => Err(e),
        };
        match parsed {
            Ok(table) => {
                tracing::info!(source = %source, origin = ?table.origin(), "loaded anchor table");
                table
            }
            Err(e) => {
                tracing::warn!(
                    source = %source,
                    error = %e,
                    "calibration unavailable; scoring against built-in default anchors"
                );
                AnchorTable::fallback()
            }
        }
    }
}
