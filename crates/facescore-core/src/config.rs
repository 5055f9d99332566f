//! Tuning parameters and engine configuration.
//!
//! Every constant the metric, quality, normalization and composition stages
//! use lives in [`ScoringParams`]. A TOML file only needs to name the values
//! it overrides; everything else keeps its default.

use crate::anchors::{AnchorSource, BundledAnchors, FileAnchors};
use crate::types::{Breakdown, Metric, Topology};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid parameter file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid parameter {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Smoothstep edges: the ease is 0 at `start` and 1 at `end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ramp {
    pub start: f64,
    pub end: f64,
}

impl Ramp {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn ease(&self, value: f64) -> f64 {
        crate::geometry::smoothstep(value, self.start, self.end)
    }
}

/// Eased floor/ceiling remap applied after statistical normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EaseBand {
    pub floor: f64,
    pub ceiling: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymmetryParams {
    /// Score lost per unit of width-normalized left/right error.
    pub k: f64,
}

impl Default for SymmetryParams {
    fn default() -> Self {
        Self { k: 36.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JawlineParams {
    /// Below this chin angle the score decays slowly from `edge_score`.
    pub sharp_below_deg: f64,
    /// Above this chin angle the score decays quickly from `edge_score`.
    pub obtuse_above_deg: f64,
    pub edge_score: f64,
    pub sharp_slope: f64,
    pub obtuse_slope: f64,
    pub apex_deg: f64,
    /// Distance from the apex at which the triangular curve reaches `band_base`.
    pub apex_half_width_deg: f64,
    pub band_base: f64,
}

impl Default for JawlineParams {
    fn default() -> Self {
        Self {
            sharp_below_deg: 60.0,
            obtuse_above_deg: 115.0,
            edge_score: 6.0,
            sharp_slope: 0.02,
            obtuse_slope: 0.06,
            apex_deg: 90.0,
            apex_half_width_deg: 20.0,
            band_base: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeParams {
    /// Openness (lid gap / eye width) band mapped onto 0..10.
    pub openness: Ramp,
    /// Score lost per unit of left/right openness difference.
    pub match_k: f64,
    pub openness_weight: f64,
    pub match_weight: f64,
}

impl Default for EyeParams {
    fn default() -> Self {
        Self {
            openness: Ramp::new(0.18, 0.35),
            match_k: 75.0,
            openness_weight: 0.65,
            match_weight: 0.35,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkinParams {
    /// Raw skin value used when no pixels are available.
    pub neutral: f64,
    /// Luma variance band; variance at `end` and above scores 0.
    pub variance: Ramp,
    pub patch_width_ratio: f64,
    pub patch_height_ratio: f64,
    pub min_patch_side: f64,
}

impl Default for SkinParams {
    fn default() -> Self {
        Self {
            neutral: 5.5,
            variance: Ramp::new(120.0, 950.0),
            patch_width_ratio: 0.34,
            patch_height_ratio: 0.22,
            min_patch_side: 22.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceParams {
    pub mouth_nose_ideal: f64,
    pub mouth_nose_k: f64,
    pub eye_gap_ideal: f64,
    pub eye_gap_k: f64,
    /// Lower-face / mid-face ideal for 68-point input.
    pub lower_mid_ideal_68: f64,
    /// Lower-face / mid-face ideal for 468-point input.
    pub lower_mid_ideal_468: f64,
    pub lower_mid_k: f64,
    pub mouth_nose_weight: f64,
    pub eye_gap_weight: f64,
    pub lower_mid_weight: f64,
}

impl BalanceParams {
    pub fn lower_mid_ideal(&self, topology: Topology) -> f64 {
        match topology {
            Topology::Topology68 => self.lower_mid_ideal_68,
            Topology::Topology468 => self.lower_mid_ideal_468,
        }
    }
}

impl Default for BalanceParams {
    fn default() -> Self {
        Self {
            mouth_nose_ideal: 1.6,
            mouth_nose_k: 8.0,
            eye_gap_ideal: 1.0,
            eye_gap_k: 10.0,
            lower_mid_ideal_68: 1.05,
            lower_mid_ideal_468: 1.05,
            lower_mid_k: 12.0,
            mouth_nose_weight: 0.4,
            eye_gap_weight: 0.35,
            lower_mid_weight: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseParams {
    /// Roll ramp in degrees.
    pub roll: Ramp,
    /// Yaw-proxy ramp in pseudo-degrees.
    pub yaw: Ramp,
    /// Scale from (nose offset / eye distance) to yaw pseudo-degrees.
    pub yaw_scale: f64,
}

impl Default for PoseParams {
    fn default() -> Self {
        Self {
            roll: Ramp::new(5.0, 22.0),
            yaw: Ramp::new(8.0, 26.0),
            yaw_scale: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityParams {
    pub focus_patch_side: f64,
    /// Luma variance band; variance at `start` or below is fully blurred.
    pub focus_variance: Ramp,
    pub blur_max: f64,
    pub dark_below: f64,
    pub dark_span: f64,
    pub bright_above: f64,
    pub bright_span: f64,
    pub illumination_scale: f64,
    pub illumination_max: f64,
    pub blur_weight: f64,
    pub illumination_weight: f64,
}

impl Default for QualityParams {
    fn default() -> Self {
        Self {
            focus_patch_side: 64.0,
            focus_variance: Ramp::new(60.0, 600.0),
            blur_max: 0.8,
            dark_below: 60.0,
            dark_span: 60.0,
            bright_above: 200.0,
            bright_span: 55.0,
            illumination_scale: 0.6,
            illumination_max: 0.6,
            blur_weight: 0.6,
            illumination_weight: 0.4,
        }
    }
}

/// Per-metric eased bands. `None` leaves the normalized score untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EaseBands {
    pub symmetry: Option<EaseBand>,
    pub jawline: Option<EaseBand>,
    pub eyes: Option<EaseBand>,
    pub skin: Option<EaseBand>,
    pub balance: Option<EaseBand>,
}

impl EaseBands {
    pub fn none() -> Self {
        Self {
            symmetry: None,
            jawline: None,
            eyes: None,
            skin: None,
            balance: None,
        }
    }

    pub fn get(&self, metric: Metric) -> Option<EaseBand> {
        match metric {
            Metric::Symmetry => self.symmetry,
            Metric::Jawline => self.jawline,
            Metric::Eyes => self.eyes,
            Metric::Skin => self.skin,
            Metric::Balance => self.balance,
        }
    }
}

impl Default for EaseBands {
    fn default() -> Self {
        Self {
            skin: Some(EaseBand {
                floor: 7.1,
                ceiling: 9.1,
            }),
            balance: Some(EaseBand {
                floor: 7.5,
                ceiling: 9.8,
            }),
            ..Self::none()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerParams {
    pub weights: Breakdown,
    pub pose_weight: f64,
    pub quality_weight: f64,
    /// Fraction of the remaining gap to 10 credited to Potential.
    pub headroom: f64,
    pub pose_discount: f64,
}

impl Default for ComposerParams {
    fn default() -> Self {
        Self {
            weights: Breakdown {
                symmetry: 0.28,
                jawline: 0.22,
                eyes: 0.18,
                skin: 0.17,
                balance: 0.15,
            },
            pose_weight: 0.9,
            quality_weight: 0.5,
            headroom: 0.35,
            pose_discount: 0.3,
        }
    }
}

/// All tunable scoring constants.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    pub symmetry: SymmetryParams,
    pub jawline: JawlineParams,
    pub eyes: EyeParams,
    pub skin: SkinParams,
    pub balance: BalanceParams,
    pub pose: PoseParams,
    pub quality: QualityParams,
    pub bands: EaseBands,
    pub composer: ComposerParams,
}

impl ScoringParams {
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let params: ScoringParams = toml::from_str(src)?;
        params.validate()?;
        Ok(params)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let params = Self::from_toml_str(&src)?;
        tracing::info!(path = %path.display(), "loaded scoring parameters");
        Ok(params)
    }

    /// Reject parameter sets that would break the range or ordering invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ramps = [
            ("eyes.openness", self.eyes.openness),
            ("skin.variance", self.skin.variance),
            ("pose.roll", self.pose.roll),
            ("pose.yaw", self.pose.yaw),
            ("quality.focus_variance", self.quality.focus_variance),
        ];
        for (name, ramp) in ramps {
            if !(ramp.start.is_finite() && ramp.end.is_finite() && ramp.start < ramp.end) {
                return Err(invalid(name, format!(
                    "start ({}) must be below end ({})",
                    ramp.start, ramp.end
                )));
            }
        }

        for metric in Metric::ALL {
            if let Some(band) = self.bands.get(metric) {
                if !(0.0..=10.0).contains(&band.floor)
                    || !(0.0..=10.0).contains(&band.ceiling)
                    || band.floor > band.ceiling
                {
                    return Err(invalid(
                        &format!("bands.{metric}"),
                        format!("need 0 <= floor <= ceiling <= 10, got {band:?}"),
                    ));
                }
            }
            let w = self.composer.weights.get(metric);
            if !w.is_finite() || w < 0.0 {
                return Err(invalid(&format!("composer.weights.{metric}"), format!("{w}")));
            }
        }

        let non_negative = [
            ("symmetry.k", self.symmetry.k),
            ("eyes.match_k", self.eyes.match_k),
            ("balance.mouth_nose_k", self.balance.mouth_nose_k),
            ("balance.eye_gap_k", self.balance.eye_gap_k),
            ("balance.lower_mid_k", self.balance.lower_mid_k),
            ("pose.yaw_scale", self.pose.yaw_scale),
            ("composer.pose_weight", self.composer.pose_weight),
            ("composer.quality_weight", self.composer.quality_weight),
            ("composer.pose_discount", self.composer.pose_discount),
            ("quality.dark_span", self.quality.dark_span),
            ("quality.bright_span", self.quality.bright_span),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(name, format!("must be finite and >= 0, got {value}")));
            }
        }

        if !(0.0..=1.0).contains(&self.composer.headroom) {
            return Err(invalid(
                "composer.headroom",
                format!("must lie in [0, 1], got {}", self.composer.headroom),
            ));
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: String) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        reason,
    }
}

/// Engine wiring, loaded from `FACESCORE_*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Calibration document; the bundled anchors are used when unset.
    pub anchors_path: Option<PathBuf>,
    /// TOML parameter overrides; defaults are used when unset.
    pub params_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            anchors_path: env_path("FACESCORE_ANCHORS_PATH"),
            params_path: env_path("FACESCORE_PARAMS_PATH"),
        }
    }

    pub fn load_params(&self) -> Result<ScoringParams, ConfigError> {
        match &self.params_path {
            Some(path) => ScoringParams::load(path),
            None => Ok(ScoringParams::default()),
        }
    }

    pub fn anchor_source(&self) -> Arc<dyn AnchorSource> {
        match &self.anchors_path {
            Some(path) => Arc::new(FileAnchors::new(path)),
            None => Arc::new(BundledAnchors),
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
