//! Improvement tips derived from a score breakdown.

use crate::types::{Metric, ScoreResult};
use serde::Serialize;

/// Sub-scores below this get a tip.
pub const DEFAULT_TIP_THRESHOLD: f64 = 8.0;

/// Pose or quality penalties above this get a capture tip.
const CAPTURE_PENALTY_THRESHOLD: f64 = 0.25;

/// Metric order in which tips are listed.
const TIP_ORDER: [Metric; 5] = [
    Metric::Skin,
    Metric::Jawline,
    Metric::Eyes,
    Metric::Balance,
    Metric::Symmetry,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tip {
    /// `None` for capture and maintenance advice.
    pub metric: Option<Metric>,
    pub text: &'static str,
}

fn metric_tip(metric: Metric) -> &'static str {
    match metric {
        Metric::Skin => "Daily sunscreen, a gentle cleanser and a consistent night routine even out skin texture.",
        Metric::Jawline => "Lower body fat and upright neck posture sharpen the jaw outline.",
        Metric::Eyes => "Regular sleep and groomed brows make the eye area look more open.",
        Metric::Balance => "A haircut with volume on top or light stubble can rebalance facial thirds.",
        Metric::Symmetry => "Alternate your sleeping side and check posture; avoid chewing on one side only.",
    }
}

const POSE_TIP: &str = "Face the camera squarely with your head level.";
const QUALITY_TIP: &str = "Use even, bright light and hold the camera steady.";
const MAINTAIN_TIP: &str = "Scores are strong across the board; keep up your current routine.";

pub fn tips(result: &ScoreResult, threshold: f64) -> Vec<Tip> {
    let mut out: Vec<Tip> = TIP_ORDER
        .into_iter()
        .filter(|&m| result.breakdown.get(m) < threshold)
        .map(|m| Tip {
            metric: Some(m),
            text: metric_tip(m),
        })
        .collect();

    if result.penalties.pose > CAPTURE_PENALTY_THRESHOLD {
        out.push(Tip {
            metric: None,
            text: POSE_TIP,
        });
    }
    if result.penalties.quality > CAPTURE_PENALTY_THRESHOLD {
        out.push(Tip {
            metric: None,
            text: QUALITY_TIP,
        });
    }

    if out.is_empty() {
        out.push(Tip {
            metric: None,
            text: MAINTAIN_TIP,
        });
    }
    out
}
