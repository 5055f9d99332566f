//! End-to-end scoring scenarios over synthetic landmark sets.

use facescore_core::anchors::{AnchorOrigin, FetchFuture};
use facescore_core::{
    adapt, AnchorSource, AnchorTable, BundledAnchors, CalibrationError, FileAnchors, Point,
    RawLandmarkSet, ScoreInput, ScoreResult, ScoringEngine, ScoringParams, Topology,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Frontal, mirror-symmetric face about x = 200 with every balance ratio at
/// its ideal and a 90° chin angle. Unreferenced indices sit on the nose tip.
fn frontal(topology: Topology) -> RawLandmarkSet {
    let mut pts = vec![Point::new(200.0, 200.0); topology.expected_len()];
    let mut put = |i: usize, x: f64, y: f64| pts[i] = Point::new(x, y);

    match topology {
        Topology::Topology68 => {
            put(36, 140.0, 150.0);
            put(39, 180.0, 150.0);
            put(42, 220.0, 150.0);
            put(45, 260.0, 150.0);
            put(37, 155.0, 143.0);
            put(38, 165.0, 143.0);
            put(41, 155.0, 157.0);
            put(40, 165.0, 157.0);
            put(43, 235.0, 143.0);
            put(44, 245.0, 143.0);
            put(47, 235.0, 157.0);
            put(46, 245.0, 157.0);
            put(30, 200.0, 200.0);
            put(31, 180.0, 205.0);
            put(35, 220.0, 205.0);
            put(48, 168.0, 225.0);
            put(54, 232.0, 225.0);
            put(8, 200.0, 252.5);
            put(4, 120.0, 172.5);
            put(12, 280.0, 172.5);
            put(27, 200.0, 150.0);
            put(0, 110.0, 160.0);
            put(16, 290.0, 160.0);
        }
        Topology::Topology468 => {
            put(33, 140.0, 150.0);
            put(133, 180.0, 150.0);
            put(362, 220.0, 150.0);
            put(263, 260.0, 150.0);
            put(159, 160.0, 143.0);
            put(145, 160.0, 157.0);
            put(386, 240.0, 143.0);
            put(374, 240.0, 157.0);
            put(1, 200.0, 200.0);
            put(98, 180.0, 205.0);
            put(327, 220.0, 205.0);
            put(61, 168.0, 225.0);
            put(291, 232.0, 225.0);
            put(152, 200.0, 252.5);
            put(172, 120.0, 172.5);
            put(397, 280.0, 172.5);
            put(168, 200.0, 150.0);
            put(234, 110.0, 160.0);
            put(454, 290.0, 160.0);
        }
    }
    RawLandmarkSet::new(pts)
}

fn fallback_engine() -> ScoringEngine {
    ScoringEngine::with_table(ScoringParams::default(), AnchorTable::fallback())
}

fn score_sync(engine: &ScoringEngine, raw: &RawLandmarkSet, topology: Topology) -> ScoreResult {
    engine
        .score_with(&AnchorTable::fallback(), &ScoreInput::landmarks_only(raw, topology))
        .unwrap()
}

fn assert_close(a: &ScoreResult, b: &ScoreResult, tol: f64) {
    assert!((a.overall - b.overall).abs() < tol, "{} vs {}", a.overall, b.overall);
    assert!((a.potential - b.potential).abs() < tol);
    for ((m, x), (_, y)) in a.breakdown.iter().zip(b.breakdown.iter()) {
        assert!((x - y).abs() < tol, "{m}: {x} vs {y}");
    }
}

#[test]
fn test_frontal_scenario_with_default_anchors() {
    let r = score_sync(&fallback_engine(), &frontal(Topology::Topology468), Topology::Topology468);

    for v in [r.breakdown.symmetry, r.breakdown.jawline, r.breakdown.eyes, r.breakdown.balance] {
        assert!((v - 9.9957).abs() < 1e-3, "got {v}");
    }
    // neutral skin 5.5 → 6.31 percentile → eased into the 7.1..9.1 band
    assert!((r.breakdown.skin - 8.65).abs() < 0.01, "skin {}", r.breakdown.skin);
    assert!((r.overall - 9.77).abs() < 0.01, "overall {}", r.overall);
    assert!((r.potential - 9.85).abs() < 0.01, "potential {}", r.potential);
    assert_eq!(r.penalties.pose, 0.0);
    assert!(!r.calibrated);

    let shown = r.rounded();
    assert_eq!(shown.overall, 9.8);
    assert_eq!(shown.potential, 9.8);
}

#[test]
fn test_scoring_is_deterministic() {
    let engine = fallback_engine();
    let raw = frontal(Topology::Topology68);
    let a = score_sync(&engine, &raw, Topology::Topology68);
    let b = score_sync(&engine, &raw, Topology::Topology68);
    assert_eq!(a, b);
}

#[test]
fn test_topology_equivalence() {
    let engine = fallback_engine();
    let a = score_sync(&engine, &frontal(Topology::Topology68), Topology::Topology68);
    let b = score_sync(&engine, &frontal(Topology::Topology468), Topology::Topology468);
    assert_close(&a, &b, 1e-9);
}

#[test]
fn test_topology_equivalence_with_slanted_lids() {
    // 68-point lid pairs tilted in opposite directions; their midpoints land
    // on the mesh lid points
    let mut raw68 = frontal(Topology::Topology68);
    for (i, x, y) in [
        (37, 150.0, 140.0),
        (38, 170.0, 146.0),
        (41, 150.0, 160.0),
        (40, 170.0, 154.0),
        (43, 230.0, 146.0),
        (44, 250.0, 140.0),
        (47, 230.0, 154.0),
        (46, 250.0, 160.0),
    ] {
        raw68.points[i] = Point::new(x, y);
    }
    let raw468 = frontal(Topology::Topology468);

    let sem68 = adapt(&raw68, Topology::Topology68).unwrap();
    let sem468 = adapt(&raw468, Topology::Topology468).unwrap();
    for (a, b) in sem68.points().iter().zip(sem468.points().iter()) {
        assert!((a.x - b.x).abs() < 1e-12 && (a.y - b.y).abs() < 1e-12, "{a:?} vs {b:?}");
    }

    let engine = fallback_engine();
    let a = score_sync(&engine, &raw68, Topology::Topology68);
    let b = score_sync(&engine, &raw468, Topology::Topology468);
    assert_close(&a, &b, 1e-9);
}

#[test]
fn test_scale_invariance() {
    let engine = fallback_engine();
    let base = frontal(Topology::Topology68);
    let mut rng = StdRng::seed_from_u64(7);
    let jittered = RawLandmarkSet::new(
        base.points
            .iter()
            .map(|p| Point::new(p.x + rng.gen_range(-6.0..6.0), p.y + rng.gen_range(-6.0..6.0)))
            .collect(),
    );
    let scaled = RawLandmarkSet::new(jittered.points.iter().map(|p| p.scaled(3.25)).collect());

    let a = score_sync(&engine, &jittered, Topology::Topology68);
    let b = score_sync(&engine, &scaled, Topology::Topology68);
    assert_close(&a, &b, 1e-9);
}

#[test]
fn test_normalized_coordinates_match_pixels() {
    let engine = fallback_engine();
    let pixels = frontal(Topology::Topology468);
    let rel: Vec<Point> = pixels
        .points
        .iter()
        .map(|p| Point::new(p.x / 400.0, p.y / 400.0))
        .collect();
    let back = RawLandmarkSet::from_normalized(&rel, 400, 400);
    let a = score_sync(&engine, &pixels, Topology::Topology468);
    let b = score_sync(&engine, &back, Topology::Topology468);
    assert_close(&a, &b, 1e-9);
}

#[test]
fn test_symmetric_face_has_perfect_raw_symmetry() {
    let engine = fallback_engine();
    let raw = frontal(Topology::Topology68);
    let trace = engine
        .trace_with(&AnchorTable::fallback(), &ScoreInput::landmarks_only(&raw, Topology::Topology68))
        .unwrap();
    assert_eq!(trace.raw.symmetry, 10.0);
    assert_eq!(trace.raw.measurements.symmetry_error, 0.0);
}

#[test]
fn test_jawline_peaks_at_right_angle() {
    let engine = fallback_engine();
    let apex = frontal(Topology::Topology468);
    let mut narrow = apex.clone();
    // pull the jaw angles inward: chin angle well below 90°
    narrow.points[172] = Point::new(170.0, 172.5);
    narrow.points[397] = Point::new(230.0, 172.5);

    let table = AnchorTable::fallback();
    let at_apex = engine
        .trace_with(&table, &ScoreInput::landmarks_only(&apex, Topology::Topology468))
        .unwrap();
    let off_apex = engine
        .trace_with(&table, &ScoreInput::landmarks_only(&narrow, Topology::Topology468))
        .unwrap();

    assert!((at_apex.raw.jawline - 10.0).abs() < 1e-6);
    assert!(off_apex.raw.jawline < at_apex.raw.jawline);
    assert!(off_apex.result.breakdown.jawline < at_apex.result.breakdown.jawline);
}

#[test]
fn test_rolled_face_is_penalized_but_keeps_ordering() {
    let engine = fallback_engine();
    let base = frontal(Topology::Topology68);
    let (sin, cos) = 30f64.to_radians().sin_cos();
    let rolled = RawLandmarkSet::new(
        base.points
            .iter()
            .map(|p| {
                let (dx, dy) = (p.x - 200.0, p.y - 200.0);
                Point::new(200.0 + dx * cos - dy * sin, 200.0 + dx * sin + dy * cos)
            })
            .collect(),
    );

    let upright = score_sync(&engine, &base, Topology::Topology68);
    let tilted = score_sync(&engine, &rolled, Topology::Topology68);
    assert!(tilted.penalties.pose >= 0.5);
    assert!(tilted.overall < upright.overall);
    assert!(tilted.potential >= tilted.overall);
}

#[test]
fn test_random_landmarks_stay_in_range() {
    let engine = fallback_engine();
    let mut rng = StdRng::seed_from_u64(0xface);
    for topology in [Topology::Topology68, Topology::Topology468] {
        for _ in 0..200 {
            let raw = RawLandmarkSet::new(
                (0..topology.expected_len())
                    .map(|_| Point::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)))
                    .collect(),
            );
            let r = score_sync(&engine, &raw, topology);
            assert!((0.0..=10.0).contains(&r.overall));
            assert!((0.0..=10.0).contains(&r.potential));
            assert!(r.potential >= r.overall);
            assert!(r.breakdown.iter().all(|(_, v)| (0.0..=10.0).contains(&v)));
            assert!((0.0..=1.0).contains(&r.penalties.pose));
        }
    }
}

#[test]
fn test_collapsed_landmarks_do_not_produce_nan() {
    let engine = fallback_engine();
    let raw = RawLandmarkSet::new(vec![Point::new(12.0, 12.0); 68]);
    let r = score_sync(&engine, &raw, Topology::Topology68);
    assert!(r.overall.is_finite() && r.potential.is_finite());
    assert!(r.breakdown.iter().all(|(_, v)| v.is_finite()));
}

#[tokio::test]
async fn test_missing_calibration_falls_back() {
    let engine = ScoringEngine::new(
        ScoringParams::default(),
        Arc::new(FileAnchors::new("/definitely/not/here/anchors.json")),
    );
    let raw = frontal(Topology::Topology68);
    let input = ScoreInput::landmarks_only(&raw, Topology::Topology68);

    let r = engine.score(&input).await.unwrap();
    assert!(!r.calibrated);
    assert_close(&r, &score_sync(&fallback_engine(), &raw, Topology::Topology68), 1e-12);
}

#[tokio::test]
async fn test_bundled_calibration_is_used() {
    let engine = ScoringEngine::new(ScoringParams::default(), Arc::new(BundledAnchors));
    let table = engine.anchors().await;
    assert_eq!(
        table.origin(),
        &AnchorOrigin::Loaded {
            version: Some("bundled-v1".to_string())
        }
    );

    let raw = frontal(Topology::Topology468);
    let r = engine
        .score(&ScoreInput::landmarks_only(&raw, Topology::Topology468))
        .await
        .unwrap();
    assert!(r.calibrated);
    assert!(r.potential >= r.overall);
}

struct SlowSource {
    calls: Arc<AtomicUsize>,
}

impl AnchorSource for SlowSource {
    fn fetch(&self) -> FetchFuture<'_> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(25)).await;
            Err(CalibrationError::Unavailable("slow and broken".into()))
        })
    }

    fn describe(&self) -> String {
        "slow".into()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_scores_fetch_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = ScoringEngine::new(
        ScoringParams::default(),
        Arc::new(SlowSource {
            calls: calls.clone(),
        }),
    );
    let raw = Arc::new(frontal(Topology::Topology68));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let engine = engine.clone();
            let raw = raw.clone();
            tokio::spawn(async move {
                engine
                    .score(&ScoreInput::landmarks_only(&raw, Topology::Topology68))
                    .await
            })
        })
        .collect();

    let mut results = Vec::new();
    for t in tasks {
        results.push(t.await.unwrap().unwrap());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert!(results.iter().all(|r| !r.calibrated));
}
