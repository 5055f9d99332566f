//! facescore-core — facial landmark scoring engine.
//!
//! Turns a detector's landmark set (68-point or 468-point topology) and an
//! optional image into five population-relative sub-scores, an Overall score
//! and a Potential score. Pipeline: adapter → metrics → anchors → composer,
//! with the quality module feeding pose/blur/illumination penalties into the
//! composer.

pub mod adapter;
pub mod anchors;
pub mod composer;
pub mod config;
pub mod engine;
pub mod geometry;
pub mod metrics;
pub mod patch;
pub mod quality;
pub mod tips;
pub mod types;

pub use adapter::{adapt, AdapterError};
pub use anchors::{AnchorCache, AnchorSource, AnchorTable, BundledAnchors, CalibrationError, FileAnchors, StaticAnchors};
pub use config::{ConfigError, EngineConfig, ScoringParams};
pub use engine::{ScoreInput, ScoringEngine};
pub use patch::{PatchSource, PixelFormat, PixelPatch};
pub use types::{Breakdown, Comparison, Metric, Point, RawLandmarkSet, ScoreResult, Topology};
