//! Capture-quality signals: head pose, focus blur and illumination.
//!
//! All penalties live in [0, 1]. Missing pixels contribute nothing, so the
//! engine keeps working on landmark-only input.

use crate::config::{PoseParams, QualityParams, ScoringParams};
use crate::geometry::{clamp, safe_denominator};
use crate::patch::{PatchRequest, PixelPatch};
use crate::types::{Feature, SemanticLandmarkSet};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct QualityPenalties {
    pub pose: f64,
    /// Blended blur + illumination penalty.
    pub quality: f64,
    pub blur: f64,
    pub illumination: f64,
}

pub fn quality(
    sem: &SemanticLandmarkSet,
    focus: Option<&PixelPatch>,
    scene_luma: Option<f64>,
    params: &ScoringParams,
) -> QualityPenalties {
    let q = &params.quality;
    let blur = focus.map_or(0.0, |patch| blur_penalty(patch.luma_stats().variance, q));
    let illumination = scene_luma.map_or(0.0, |m| illumination_penalty(m, q));
    let blended = q.blur_weight * blur + q.illumination_weight * illumination;

    QualityPenalties {
        pose: pose_penalty(sem, &params.pose),
        quality: clamp(blended, 0.0, 1.0),
        blur,
        illumination,
    }
}

/// Roll of the outer-eye-corner line, in degrees.
pub fn roll_deg(sem: &SemanticLandmarkSet) -> f64 {
    let l = sem.point(Feature::EyeOuterLeft);
    let r = sem.point(Feature::EyeOuterRight);
    (r.y - l.y).abs().atan2((r.x - l.x).abs()).to_degrees()
}

/// Horizontal nose offset from the inner-eye-corner midpoint, per unit
/// inner-corner distance, scaled into pseudo-degrees.
pub fn yaw_proxy(sem: &SemanticLandmarkSet, yaw_scale: f64) -> f64 {
    let l = sem.point(Feature::EyeInnerLeft);
    let r = sem.point(Feature::EyeInnerRight);
    let nose = sem.point(Feature::NoseTip);
    let offset = (nose.x - l.midpoint(&r).x).abs();
    offset / safe_denominator(l.distance(&r)) * yaw_scale
}

pub fn pose_penalty(sem: &SemanticLandmarkSet, params: &PoseParams) -> f64 {
    let roll = params.roll.ease(roll_deg(sem));
    let yaw = params.yaw.ease(yaw_proxy(sem, params.yaw_scale));
    clamp((roll + yaw) / 2.0, 0.0, 1.0)
}

/// Low local variance reads as defocus.
pub fn blur_penalty(variance: f64, params: &QualityParams) -> f64 {
    let span = safe_denominator(params.focus_variance.end - params.focus_variance.start);
    let t = 1.0 - clamp((variance - params.focus_variance.start) / span, 0.0, 1.0);
    clamp(t * params.blur_max, 0.0, params.blur_max)
}

/// Too-dark or too-bright frames, from the mean luma (0–255).
pub fn illumination_penalty(mean_luma: f64, params: &QualityParams) -> f64 {
    let raw = if mean_luma < params.dark_below {
        (params.dark_below - mean_luma) / safe_denominator(params.dark_span)
    } else if mean_luma > params.bright_above {
        (mean_luma - params.bright_above) / safe_denominator(params.bright_span)
    } else {
        0.0
    };
    clamp(raw * params.illumination_scale, 0.0, params.illumination_max)
}

/// Square focus window centered on the nose tip.
pub fn focus_patch_request(sem: &SemanticLandmarkSet, params: &QualityParams) -> PatchRequest {
    PatchRequest::square(sem.point(Feature::NoseTip), params.focus_patch_side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Point, Topology};

    fn face(outer_left: Point, outer_right: Point, nose: Point) -> SemanticLandmarkSet {
        let mut points = [Point::new(0.0, 0.0); Feature::COUNT];
        points[Feature::EyeOuterLeft.index()] = outer_left;
        points[Feature::EyeOuterRight.index()] = outer_right;
        // inner corners a third of the way in from each outer corner
        let third = Point::new((outer_right.x - outer_left.x) / 3.0, (outer_right.y - outer_left.y) / 3.0);
        points[Feature::EyeInnerLeft.index()] = Point::new(outer_left.x + third.x, outer_left.y + third.y);
        points[Feature::EyeInnerRight.index()] = Point::new(outer_right.x - third.x, outer_right.y - third.y);
        points[Feature::NoseTip.index()] = nose;
        SemanticLandmarkSet::from_points(Topology::Topology68, points)
    }

    #[test]
    fn test_frontal_pose_has_no_penalty() {
        let sem = face(Point::new(100.0, 100.0), Point::new(200.0, 100.0), Point::new(150.0, 160.0));
        assert_eq!(pose_penalty(&sem, &PoseParams::default()), 0.0);
    }

    #[test]
    fn test_strong_roll_saturates_half() {
        // 45° roll, no yaw: roll ramp saturates, yaw contributes nothing
        let sem = face(Point::new(100.0, 100.0), Point::new(200.0, 200.0), Point::new(150.0, 150.0));
        assert!((roll_deg(&sem) - 45.0).abs() < 1e-9);
        assert!((pose_penalty(&sem, &PoseParams::default()) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_roll_ignores_eye_order() {
        let a = face(Point::new(100.0, 100.0), Point::new(200.0, 110.0), Point::new(150.0, 150.0));
        let b = face(Point::new(200.0, 110.0), Point::new(100.0, 100.0), Point::new(150.0, 150.0));
        assert!((roll_deg(&a) - roll_deg(&b)).abs() < 1e-12);
    }

    #[test]
    fn test_yaw_proxy_scale() {
        // nose 5px off center, inner corners 100/3 px apart → 0.15·60 = 9
        let sem = face(Point::new(100.0, 100.0), Point::new(200.0, 100.0), Point::new(155.0, 160.0));
        assert!((yaw_proxy(&sem, 60.0) - 9.0).abs() < 1e-9);
        let p = pose_penalty(&sem, &PoseParams::default());
        assert!(p > 0.0 && p < 0.5);
    }

    #[test]
    fn test_yaw_measured_against_inner_corners() {
        let mut points = [Point::new(0.0, 0.0); Feature::COUNT];
        points[Feature::EyeOuterLeft.index()] = Point::new(140.0, 150.0);
        points[Feature::EyeInnerLeft.index()] = Point::new(180.0, 150.0);
        points[Feature::EyeInnerRight.index()] = Point::new(220.0, 150.0);
        points[Feature::EyeOuterRight.index()] = Point::new(260.0, 150.0);
        points[Feature::NoseTip.index()] = Point::new(210.0, 200.0);
        let sem = SemanticLandmarkSet::from_points(Topology::Topology468, points);

        // 10px over a 40px inner gap → 15 pseudo-degrees, t = 7/18 on the yaw ramp
        assert!((yaw_proxy(&sem, 60.0) - 15.0).abs() < 1e-9);
        let expected = 0.5 * (1960.0 / 5832.0);
        let p = pose_penalty(&sem, &PoseParams::default());
        assert!((p - expected).abs() < 1e-9, "got {p}");
        assert!((p - 0.168).abs() < 1e-3);
    }

    #[test]
    fn test_pose_penalty_coincident_eyes_is_finite() {
        let p = Point::new(50.0, 50.0);
        let sem = face(p, p, Point::new(80.0, 90.0));
        let penalty = pose_penalty(&sem, &PoseParams::default());
        assert!((0.0..=1.0).contains(&penalty));
    }

    #[test]
    fn test_blur_penalty_band() {
        let q = QualityParams::default();
        assert!((blur_penalty(0.0, &q) - 0.8).abs() < 1e-12);
        assert_eq!(blur_penalty(600.0, &q), 0.0);
        assert!((blur_penalty(330.0, &q) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_illumination_penalty() {
        let q = QualityParams::default();
        assert_eq!(illumination_penalty(128.0, &q), 0.0);
        assert!((illumination_penalty(30.0, &q) - 0.3).abs() < 1e-12);
        assert!((illumination_penalty(0.0, &q) - 0.6).abs() < 1e-12);
        assert!((illumination_penalty(255.0, &q) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_quality_without_pixels_is_pose_only() {
        let sem = face(Point::new(100.0, 100.0), Point::new(200.0, 100.0), Point::new(150.0, 160.0));
        let out = quality(&sem, None, None, &ScoringParams::default());
        assert_eq!(out, QualityPenalties::default());
    }

    #[test]
    fn test_quality_blends_blur_and_illumination() {
        let sem = face(Point::new(100.0, 100.0), Point::new(200.0, 100.0), Point::new(150.0, 160.0));
        let flat = PixelPatch::uniform(64, 64, [20, 20, 20]).unwrap();
        let out = quality(&sem, Some(&flat), Some(30.0), &ScoringParams::default());
        assert!((out.blur - 0.8).abs() < 1e-12);
        assert!((out.illumination - 0.3).abs() < 1e-12);
        assert!((out.quality - (0.6 * 0.8 + 0.4 * 0.3)).abs() < 1e-12);
    }

    #[test]
    fn test_focus_request_is_square_at_nose() {
        let sem = face(Point::new(100.0, 100.0), Point::new(200.0, 100.0), Point::new(150.0, 160.0));
        let req = focus_patch_request(&sem, &QualityParams::default());
        assert_eq!(req.center, Point::new(150.0, 160.0));
        assert_eq!((req.width, req.height), (64.0, 64.0));
    }
}
