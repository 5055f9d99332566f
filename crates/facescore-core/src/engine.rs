//! Scoring engine: wires the adapter, extractor, normalizer, quality module
//! and composer behind one call.

use crate::adapter::{adapt, AdapterError};
use crate::anchors::{normalize, AnchorCache, AnchorSource, AnchorTable};
use crate::composer::compose;
use crate::config::{ConfigError, EngineConfig, ScoringParams};
use crate::metrics::{extract, skin_patch_request, RawMetrics};
use crate::patch::PatchSource;
use crate::quality::{focus_patch_request, quality, QualityPenalties};
use crate::types::{RawLandmarkSet, ScoreResult, Topology};
use std::sync::Arc;

/// Everything one scoring call reads.
#[derive(Clone, Copy)]
pub struct ScoreInput<'a> {
    pub landmarks: &'a RawLandmarkSet,
    pub topology: Topology,
    /// Image the landmarks were detected on, in the same coordinate space.
    pub pixels: Option<&'a dyn PatchSource>,
}

impl<'a> ScoreInput<'a> {
    pub fn landmarks_only(landmarks: &'a RawLandmarkSet, topology: Topology) -> Self {
        Self {
            landmarks,
            topology,
            pixels: None,
        }
    }

    pub fn with_pixels(mut self, pixels: &'a dyn PatchSource) -> Self {
        self.pixels = Some(pixels);
        self
    }
}

/// Intermediate stages of one scoring call, for diagnostics.
#[derive(Debug, Clone)]
pub struct ScoreTrace {
    pub raw: RawMetrics,
    pub penalties: QualityPenalties,
    pub result: ScoreResult,
}

/// Clone-safe handle; clones share the parameters and the anchor cache.
#[derive(Clone)]
pub struct ScoringEngine {
    params: Arc<ScoringParams>,
    anchors: Arc<AnchorCache>,
}

impl ScoringEngine {
    pub fn new(params: ScoringParams, source: Arc<dyn AnchorSource>) -> Self {
        Self {
            params: Arc::new(params),
            anchors: Arc::new(AnchorCache::new(source)),
        }
    }

    /// Engine over an already-built anchor table; never performs I/O.
    pub fn with_table(params: ScoringParams, table: AnchorTable) -> Self {
        Self {
            params: Arc::new(params),
            anchors: Arc::new(AnchorCache::preloaded(table)),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let params = config.load_params()?;
        Ok(Self::new(params, config.anchor_source()))
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    /// Anchor table, loading it on first use.
    pub async fn anchors(&self) -> Arc<AnchorTable> {
        self.anchors.get_or_load().await
    }

    pub async fn score(&self, input: &ScoreInput<'_>) -> Result<ScoreResult, AdapterError> {
        let table = self.anchors.get_or_load().await;
        self.score_with(&table, input)
    }

    /// Synchronous pipeline against an explicit anchor table.
    pub fn score_with(
        &self,
        anchors: &AnchorTable,
        input: &ScoreInput<'_>,
    ) -> Result<ScoreResult, AdapterError> {
        self.trace_with(anchors, input).map(|t| t.result)
    }

    pub fn trace_with(
        &self,
        anchors: &AnchorTable,
        input: &ScoreInput<'_>,
    ) -> Result<ScoreTrace, AdapterError> {
        let params = &*self.params;
        let sem = adapt(input.landmarks, input.topology)?;

        let skin_patch = input
            .pixels
            .and_then(|src| src.sample(skin_patch_request(&sem, &params.skin)));
        let focus_patch = input
            .pixels
            .and_then(|src| src.sample(focus_patch_request(&sem, &params.quality)));
        let scene_luma = input.pixels.and_then(|src| src.mean_luma());

        let raw = extract(&sem, skin_patch.as_ref(), params);
        let penalties = quality(&sem, focus_patch.as_ref(), scene_luma, params);
        let norm = normalize(&raw, anchors, &params.bands);

        let mut result = compose(&norm, penalties.pose, penalties.quality, &params.composer);
        result.penalties.blur = penalties.blur;
        result.penalties.illumination = penalties.illumination;
        result.calibrated = anchors.is_calibrated();

        tracing::debug!(
            topology = %input.topology,
            symmetry = result.breakdown.symmetry,
            jawline = result.breakdown.jawline,
            eyes = result.breakdown.eyes,
            skin = result.breakdown.skin,
            balance = result.breakdown.balance,
            pose = penalties.pose,
            quality = penalties.quality,
            overall = result.overall,
            potential = result.potential,
            calibrated = result.calibrated,
            "scored face"
        );

        Ok(ScoreTrace {
            raw,
            penalties,
            result,
        })
    }
}
