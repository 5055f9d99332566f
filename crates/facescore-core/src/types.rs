use serde::{Deserialize, Serialize};
use std::fmt;

/// A 2D landmark position in pixel (or consistently normalized) image space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn scaled(&self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }
}

/// Landmark count/ordering convention of the detector that produced a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topology {
    /// iBUG 300-W / dlib 68-point scheme.
    #[serde(rename = "68")]
    Topology68,
    /// Face-mesh 468-point scheme.
    #[serde(rename = "468")]
    Topology468,
}

impl Topology {
    pub const fn expected_len(self) -> usize {
        match self {
            Topology::Topology68 => 68,
            Topology::Topology468 => 468,
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-point", self.expected_len())
    }
}

impl std::str::FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "68" => Ok(Topology::Topology68),
            "468" => Ok(Topology::Topology468),
            other => Err(format!("unknown topology {other:?} (expected 68 or 468)")),
        }
    }
}

/// Ordered landmark points exactly as the detector returned them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawLandmarkSet {
    pub points: Vec<Point>,
}

impl RawLandmarkSet {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Convert detector output given in 0..1 image-relative coordinates to pixels,
    /// so landmarks and sampled pixel patches share one coordinate space.
    pub fn from_normalized(points: &[Point], width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        Self {
            points: points.iter().map(|p| Point::new(p.x * w, p.y * h)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }
}

/// Named anatomical reference resolved from a raw landmark set.
///
/// "Left" is the viewer's left: the smaller x coordinate in an unmirrored,
/// frontal photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    EyeOuterLeft,
    EyeInnerLeft,
    EyeInnerRight,
    EyeOuterRight,
    EyelidTopLeft,
    EyelidBottomLeft,
    EyelidTopRight,
    EyelidBottomRight,
    NoseTip,
    AlarLeft,
    AlarRight,
    MouthLeft,
    MouthRight,
    Chin,
    JawLeft,
    JawRight,
    Midline,
    FaceLeft,
    FaceRight,
}

impl Feature {
    pub const COUNT: usize = 19;

    pub const ALL: [Feature; Feature::COUNT] = [
        Feature::EyeOuterLeft,
        Feature::EyeInnerLeft,
        Feature::EyeInnerRight,
        Feature::EyeOuterRight,
        Feature::EyelidTopLeft,
        Feature::EyelidBottomLeft,
        Feature::EyelidTopRight,
        Feature::EyelidBottomRight,
        Feature::NoseTip,
        Feature::AlarLeft,
        Feature::AlarRight,
        Feature::MouthLeft,
        Feature::MouthRight,
        Feature::Chin,
        Feature::JawLeft,
        Feature::JawRight,
        Feature::Midline,
        Feature::FaceLeft,
        Feature::FaceRight,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Feature::EyeOuterLeft => "eye_outer_left",
            Feature::EyeInnerLeft => "eye_inner_left",
            Feature::EyeInnerRight => "eye_inner_right",
            Feature::EyeOuterRight => "eye_outer_right",
            Feature::EyelidTopLeft => "eyelid_top_left",
            Feature::EyelidBottomLeft => "eyelid_bottom_left",
            Feature::EyelidTopRight => "eyelid_top_right",
            Feature::EyelidBottomRight => "eyelid_bottom_right",
            Feature::NoseTip => "nose_tip",
            Feature::AlarLeft => "alar_left",
            Feature::AlarRight => "alar_right",
            Feature::MouthLeft => "mouth_left",
            Feature::MouthRight => "mouth_right",
            Feature::Chin => "chin",
            Feature::JawLeft => "jaw_left",
            Feature::JawRight => "jaw_right",
            Feature::Midline => "midline",
            Feature::FaceLeft => "face_left",
            Feature::FaceRight => "face_right",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Topology-independent landmark references. Built once per detection by the
/// adapter and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticLandmarkSet {
    topology: Topology,
    points: [Point; Feature::COUNT],
}

impl SemanticLandmarkSet {
    /// Build from already-resolved reference points, ordered as [`Feature::ALL`].
    pub fn from_points(topology: Topology, points: [Point; Feature::COUNT]) -> Self {
        Self { topology, points }
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn point(&self, feature: Feature) -> Point {
        self.points[feature.index()]
    }

    pub fn points(&self) -> &[Point; Feature::COUNT] {
        &self.points
    }

    /// Distance between the two face-width references.
    pub fn face_width(&self) -> f64 {
        self.point(Feature::FaceLeft)
            .distance(&self.point(Feature::FaceRight))
    }
}

/// The five scored facial metrics, keyed by fixed output strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Symmetry,
    Jawline,
    Eyes,
    Skin,
    Balance,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Symmetry,
        Metric::Jawline,
        Metric::Eyes,
        Metric::Skin,
        Metric::Balance,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            Metric::Symmetry => "symmetry",
            Metric::Jawline => "jawline",
            Metric::Eyes => "eyes",
            Metric::Skin => "skin",
            Metric::Balance => "balance",
        }
    }

    pub fn from_key(key: &str) -> Option<Metric> {
        Metric::ALL.into_iter().find(|m| m.key() == key)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One value per [`Metric`]. Serializes as a map with the fixed metric keys.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Breakdown {
    pub symmetry: f64,
    pub jawline: f64,
    pub eyes: f64,
    pub skin: f64,
    pub balance: f64,
}

/// Population-relative sub-scores in [0, 10].
pub type NormalizedMetrics = Breakdown;

impl Breakdown {
    pub fn from_fn(mut f: impl FnMut(Metric) -> f64) -> Self {
        Self {
            symmetry: f(Metric::Symmetry),
            jawline: f(Metric::Jawline),
            eyes: f(Metric::Eyes),
            skin: f(Metric::Skin),
            balance: f(Metric::Balance),
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Symmetry => self.symmetry,
            Metric::Jawline => self.jawline,
            Metric::Eyes => self.eyes,
            Metric::Skin => self.skin,
            Metric::Balance => self.balance,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL.into_iter().map(move |m| (m, self.get(m)))
    }

    pub fn map(&self, mut f: impl FnMut(Metric, f64) -> f64) -> Self {
        Self::from_fn(|m| f(m, self.get(m)))
    }
}

/// Capture-quality discounts applied to a score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Penalties {
    /// Roll/yaw penalty in [0, 1].
    pub pose: f64,
    /// Blended blur/illumination penalty in [0, 1].
    pub quality: f64,
    pub blur: f64,
    pub illumination: f64,
}

/// Output of one scoring call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub overall: f64,
    /// Overall with fixable capture defects credited back; never below `overall`.
    pub potential: f64,
    pub breakdown: Breakdown,
    pub penalties: Penalties,
    /// False when scoring ran against the built-in fallback anchors.
    pub calibrated: bool,
}

impl ScoreResult {
    /// Copy with every displayed value rounded to one decimal.
    pub fn rounded(&self) -> ScoreResult {
        ScoreResult {
            overall: round1(self.overall),
            potential: round1(self.potential),
            breakdown: self.breakdown.map(|_, v| round1(v)),
            penalties: Penalties {
                pose: round2(self.penalties.pose),
                quality: round2(self.penalties.quality),
                blur: round2(self.penalties.blur),
                illumination: round2(self.penalties.illumination),
            },
            calibrated: self.calibrated,
        }
    }

    /// Side-by-side comparison; deltas are `self − other`.
    pub fn compare(&self, other: &ScoreResult) -> Comparison {
        let overall_delta = self.overall - other.overall;
        let leader = if overall_delta.abs() < COMPARISON_TIE_EPSILON {
            Leader::Tie
        } else if overall_delta > 0.0 {
            Leader::First
        } else {
            Leader::Second
        };

        Comparison {
            overall_delta,
            potential_delta: self.potential - other.potential,
            breakdown_delta: Breakdown::from_fn(|m| {
                self.breakdown.get(m) - other.breakdown.get(m)
            }),
            leader,
        }
    }
}

const COMPARISON_TIE_EPSILON: f64 = 0.05;

/// Which of two compared results scored higher overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leader {
    First,
    Second,
    Tie,
}

/// Difference between two scoring results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub overall_delta: f64,
    pub potential_delta: f64,
    pub breakdown_delta: Breakdown,
    pub leader: Leader,
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
