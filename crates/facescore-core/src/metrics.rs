//! Metric extraction — canonical landmarks (+ optional skin patch) → raw metrics.
//!
//! Every metric is computed from ratios of landmark distances, so results do
//! not depend on image resolution or face size. Degenerate geometry is
//! recovered locally through [`safe_denominator`]; nothing here fails.

use crate::config::{BalanceParams, EyeParams, JawlineParams, ScoringParams, SkinParams, SymmetryParams};
use crate::geometry::{angle_at_deg, clamp, safe_denominator};
use crate::patch::{PatchRequest, PixelPatch};
use crate::quality::pose_penalty;
use crate::types::{Feature, Metric, SemanticLandmarkSet, Topology};
use serde::Serialize;

/// Bilateral pairs compared against the midline, viewer-left first.
const SYMMETRY_PAIRS: [(Feature, Feature); 5] = [
    (Feature::EyeOuterLeft, Feature::EyeOuterRight),
    (Feature::EyeInnerLeft, Feature::EyeInnerRight),
    (Feature::MouthLeft, Feature::MouthRight),
    (Feature::AlarLeft, Feature::AlarRight),
    (Feature::JawLeft, Feature::JawRight),
];

/// Intermediate measurements behind the raw metric values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Measurements {
    /// Summed left/right midline-distance difference over face width.
    pub symmetry_error: f64,
    pub jaw_angle_deg: f64,
    pub openness_left: f64,
    pub openness_right: f64,
    /// Skin patch luma variance; `None` when no patch was supplied.
    pub skin_variance: Option<f64>,
    pub mouth_nose_ratio: f64,
    pub eye_gap_ratio: f64,
    pub lower_mid_ratio: f64,
}

/// Raw per-metric values on a 0..10 scale, before population normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawMetrics {
    pub symmetry: f64,
    pub jawline: f64,
    pub eyes: f64,
    pub skin: f64,
    pub balance: f64,
    /// Roll/yaw penalty in [0, 1].
    pub pose_penalty: f64,
    pub measurements: Measurements,
}

impl RawMetrics {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Symmetry => self.symmetry,
            Metric::Jawline => self.jawline,
            Metric::Eyes => self.eyes,
            Metric::Skin => self.skin,
            Metric::Balance => self.balance,
        }
    }
}

pub fn extract(
    sem: &SemanticLandmarkSet,
    patch: Option<&PixelPatch>,
    params: &ScoringParams,
) -> RawMetrics {
    let (symmetry, symmetry_error) = symmetry(sem, &params.symmetry);
    let (jawline, jaw_angle_deg) = jawline(sem, &params.jawline);
    let (eyes, openness_left, openness_right) = eyes(sem, &params.eyes);
    let (skin, skin_variance) = skin(patch, &params.skin);
    let (balance, ratios) = balance(sem, &params.balance);

    RawMetrics {
        symmetry,
        jawline,
        eyes,
        skin,
        balance,
        pose_penalty: pose_penalty(sem, &params.pose),
        measurements: Measurements {
            symmetry_error,
            jaw_angle_deg,
            openness_left,
            openness_right,
            skin_variance,
            mouth_nose_ratio: ratios[0],
            eye_gap_ratio: ratios[1],
            lower_mid_ratio: ratios[2],
        },
    }
}

/// Returns `(score, error)`.
pub fn symmetry(sem: &SemanticLandmarkSet, params: &SymmetryParams) -> (f64, f64) {
    let mid_x = sem.point(Feature::Midline).x;
    let diff: f64 = SYMMETRY_PAIRS
        .iter()
        .map(|&(l, r)| {
            let dl = (sem.point(l).x - mid_x).abs();
            let dr = (sem.point(r).x - mid_x).abs();
            (dl - dr).abs()
        })
        .sum();

    let error = diff / safe_denominator(sem.face_width());
    (clamp(10.0 - error * params.k, 0.0, 10.0), error)
}

/// Returns `(score, chin angle in degrees)`.
pub fn jawline(sem: &SemanticLandmarkSet, params: &JawlineParams) -> (f64, f64) {
    let deg = angle_at_deg(
        sem.point(Feature::Chin),
        sem.point(Feature::JawLeft),
        sem.point(Feature::JawRight),
    );
    (jaw_angle_score(deg, params), deg)
}

/// Three-segment chin-angle curve: mild decay below the sharp edge, a
/// triangular peak at the apex, faster decay past the obtuse edge.
pub fn jaw_angle_score(deg: f64, p: &JawlineParams) -> f64 {
    let score = if deg < p.sharp_below_deg {
        p.edge_score + (deg - p.sharp_below_deg) * p.sharp_slope
    } else if deg > p.obtuse_above_deg {
        p.edge_score - (deg - p.obtuse_above_deg) * p.obtuse_slope
    } else {
        let off = (deg - p.apex_deg).abs() / safe_denominator(p.apex_half_width_deg);
        p.band_base + (1.0 - off) * (10.0 - p.band_base)
    };
    clamp(score, 0.0, 10.0)
}

/// Returns `(score, openness left, openness right)`.
pub fn eyes(sem: &SemanticLandmarkSet, params: &EyeParams) -> (f64, f64, f64) {
    let openness = |outer, inner, top, bottom| {
        let gap = (sem.point(top).y - sem.point(bottom).y).abs();
        let width = sem.point(outer).distance(&sem.point(inner));
        gap / safe_denominator(width)
    };
    let left = openness(
        Feature::EyeOuterLeft,
        Feature::EyeInnerLeft,
        Feature::EyelidTopLeft,
        Feature::EyelidBottomLeft,
    );
    let right = openness(
        Feature::EyeOuterRight,
        Feature::EyeInnerRight,
        Feature::EyelidTopRight,
        Feature::EyelidBottomRight,
    );

    let open = 10.0 * params.openness.ease((left + right) / 2.0);
    let matched = clamp(10.0 - (left - right).abs() * params.match_k, 0.0, 10.0);
    let score = params.openness_weight * open + params.match_weight * matched;
    (clamp(score, 0.0, 10.0), left, right)
}

/// Returns `(score, variance)`; the neutral value stands in when there is no patch.
pub fn skin(patch: Option<&PixelPatch>, params: &SkinParams) -> (f64, Option<f64>) {
    match patch {
        Some(patch) => {
            let variance = patch.luma_stats().variance;
            let score = 10.0 - params.variance.ease(variance) * 10.0;
            (clamp(score, 0.0, 10.0), Some(variance))
        }
        None => (clamp(params.neutral, 0.0, 10.0), None),
    }
}

/// Region the skin metric reads: around the nose tip, sized from the face
/// width, with its top edge a third of its height above the tip.
pub fn skin_patch_request(sem: &SemanticLandmarkSet, params: &SkinParams) -> PatchRequest {
    let nose = sem.point(Feature::NoseTip);
    let face_w = sem.face_width();
    let width = (params.patch_width_ratio * face_w).max(params.min_patch_side);
    let height = (params.patch_height_ratio * face_w).max(params.min_patch_side);
    let mut center = nose;
    center.y = nose.y - height / 3.0 + height / 2.0;
    PatchRequest {
        center,
        width,
        height,
    }
}

/// Returns `(score, [mouth/nose, eye gap, lower/mid])`.
pub fn balance(sem: &SemanticLandmarkSet, params: &BalanceParams) -> (f64, [f64; 3]) {
    let dist = |a: Feature, b: Feature| sem.point(a).distance(&sem.point(b));

    let mouth_nose = dist(Feature::MouthLeft, Feature::MouthRight)
        / safe_denominator(dist(Feature::AlarLeft, Feature::AlarRight));

    let eye_width = (dist(Feature::EyeOuterLeft, Feature::EyeInnerLeft)
        + dist(Feature::EyeOuterRight, Feature::EyeInnerRight))
        / 2.0;
    let eye_gap = dist(Feature::EyeInnerLeft, Feature::EyeInnerRight) / safe_denominator(eye_width);

    let lower_mid = dist(Feature::NoseTip, Feature::Chin)
        / safe_denominator(dist(Feature::Midline, Feature::NoseTip));

    let topology: Topology = sem.topology();
    let parts = [
        (ratio_score(mouth_nose, params.mouth_nose_ideal, params.mouth_nose_k), params.mouth_nose_weight),
        (ratio_score(eye_gap, params.eye_gap_ideal, params.eye_gap_k), params.eye_gap_weight),
        (
            ratio_score(lower_mid, params.lower_mid_ideal(topology), params.lower_mid_k),
            params.lower_mid_weight,
        ),
    ];
    let weighted: f64 = parts.iter().map(|(s, w)| s * w).sum();
    let total: f64 = parts.iter().map(|(_, w)| w).sum();

    (
        clamp(weighted / safe_denominator(total), 0.0, 10.0),
        [mouth_nose, eye_gap, lower_mid],
    )
}

/// `10 − min(10, |ratio − ideal|·k)`.
pub fn ratio_score(ratio: f64, ideal: f64, k: f64) -> f64 {
    clamp(10.0 - ((ratio - ideal).abs() * k).min(10.0), 0.0, 10.0)
}
