//! Score composition: normalized sub-scores + penalties → Overall / Potential.

use crate::config::ComposerParams;
use crate::geometry::clamp;
use crate::types::{NormalizedMetrics, Penalties, ScoreResult};

/// Blend the sub-scores into Overall, then project Potential.
///
/// Potential is Overall with a share of the remaining headroom credited back,
/// less a pose discount, and never below Overall. `calibrated` starts out
/// true; the engine clears it when scoring against fallback anchors.
pub fn compose(
    norm: &NormalizedMetrics,
    pose_penalty: f64,
    quality_penalty: f64,
    params: &ComposerParams,
) -> ScoreResult {
    let pose = penalty_input(pose_penalty);
    let quality = penalty_input(quality_penalty);

    let weighted: f64 = norm
        .iter()
        .map(|(metric, score)| params.weights.get(metric) * clamp(score, 0.0, 10.0))
        .sum();
    let overall = clamp(
        weighted - pose * params.pose_weight - quality * params.quality_weight,
        0.0,
        10.0,
    );

    let projected = clamp(
        overall + (10.0 - overall) * params.headroom - pose * params.pose_discount,
        0.0,
        10.0,
    );

    ScoreResult {
        overall,
        potential: overall.max(projected),
        breakdown: norm.map(|_, v| clamp(v, 0.0, 10.0)),
        penalties: Penalties {
            pose,
            quality,
            ..Penalties::default()
        },
        calibrated: true,
    }
}

fn penalty_input(value: f64) -> f64 {
    clamp(value, 0.0, 1.0)
}
