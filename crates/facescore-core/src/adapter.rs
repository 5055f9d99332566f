//! Landmark adapter: detector output → topology-independent references.
//!
//! Each supported topology has one fixed index table mapping every
//! [`Feature`] to a landmark index, or to the midpoint of two indices where
//! the scheme has no single equivalent point (the 68-point eyelids). These
//! tables are the only topology-specific knowledge in the engine.

use crate::types::{Feature, Point, RawLandmarkSet, SemanticLandmarkSet, Topology};
use thiserror::Error;

/// Bumped whenever an entry in either index table changes.
pub const INDEX_TABLE_VERSION: &str = "2";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("{topology} landmarks expected {expected} points, got {actual}")]
    TopologyMismatch {
        topology: Topology,
        expected: usize,
        actual: usize,
    },
    #[error("landmark index {index} for {feature} out of range (set has {len} points)")]
    MalformedLandmarks {
        feature: Feature,
        index: usize,
        len: usize,
    },
    #[error("{feature} resolved to a non-finite point ({x}, {y})")]
    DegenerateGeometry { feature: Feature, x: f64, y: f64 },
}

/// How one semantic reference is read from a raw set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkRef {
    Index(usize),
    Midpoint(usize, usize),
}

impl LandmarkRef {
    /// Raw indices this reference reads.
    pub fn indices(self) -> impl Iterator<Item = usize> {
        let (a, b) = match self {
            LandmarkRef::Index(i) => (i, None),
            LandmarkRef::Midpoint(i, j) => (i, Some(j)),
        };
        std::iter::once(a).chain(b)
    }
}

/// Per-topology mapping, ordered as [`Feature::ALL`].
pub struct IndexTable {
    pub topology: Topology,
    pub refs: [LandmarkRef; Feature::COUNT],
}

use LandmarkRef::{Index, Midpoint};

/// iBUG 300-W order (dlib, face-api.js). Point 30 is the nose tip proper,
/// 4/12 sit at the mandible angles and 0/16 at the face-width extremes.
pub const TABLE_68: IndexTable = IndexTable {
    topology: Topology::Topology68,
    refs: [
        Index(36),         // eye outer left
        Index(39),         // eye inner left
        Index(42),         // eye inner right
        Index(45),         // eye outer right
        Midpoint(37, 38),  // eyelid top left
        Midpoint(41, 40),  // eyelid bottom left
        Midpoint(43, 44),  // eyelid top right
        Midpoint(47, 46),  // eyelid bottom right
        Index(30),         // nose tip
        Index(31),         // alar left
        Index(35),         // alar right
        Index(48),         // mouth left
        Index(54),         // mouth right
        Index(8),          // chin
        Index(4),          // jaw left
        Index(12),         // jaw right
        Index(27),         // midline (upper nasal bridge)
        Index(0),          // face left
        Index(16),         // face right
    ],
};

/// Face-mesh order. The viewer-left eye is the subject's right eye.
pub const TABLE_468: IndexTable = IndexTable {
    topology: Topology::Topology468,
    refs: [
        Index(33),  // eye outer left
        Index(133), // eye inner left
        Index(362), // eye inner right
        Index(263), // eye outer right
        Index(159), // eyelid top left
        Index(145), // eyelid bottom left
        Index(386), // eyelid top right
        Index(374), // eyelid bottom right
        Index(1),   // nose tip
        Index(98),  // alar left
        Index(327), // alar right
        Index(61),  // mouth left
        Index(291), // mouth right
        Index(152), // chin
        Index(172), // jaw left
        Index(397), // jaw right
        Index(168), // midline (glabella / bridge)
        Index(234), // face left
        Index(454), // face right
    ],
};

pub fn index_table(topology: Topology) -> &'static IndexTable {
    match topology {
        Topology::Topology68 => &TABLE_68,
        Topology::Topology468 => &TABLE_468,
    }
}

/// Resolve every semantic reference of `raw` through the table for `topology`.
pub fn adapt(
    raw: &RawLandmarkSet,
    topology: Topology,
) -> Result<SemanticLandmarkSet, AdapterError> {
    let expected = topology.expected_len();
    if raw.len() != expected {
        return Err(AdapterError::TopologyMismatch {
            topology,
            expected,
            actual: raw.len(),
        });
    }

    let table = index_table(topology);
    let mut points = [Point::new(0.0, 0.0); Feature::COUNT];

    for (feature, landmark_ref) in Feature::ALL.into_iter().zip(table.refs) {
        let point = resolve(raw, feature, landmark_ref)?;
        if !point.is_finite() {
            return Err(AdapterError::DegenerateGeometry {
                feature,
                x: point.x,
                y: point.y,
            });
        }
        points[feature.index()] = point;
    }

    let sem = SemanticLandmarkSet::from_points(topology, points);
    if sem.face_width() <= f64::EPSILON {
        tracing::debug!(%topology, "face-width references coincide; metrics fall back to unit scale");
    }
    Ok(sem)
}

fn resolve(
    raw: &RawLandmarkSet,
    feature: Feature,
    landmark_ref: LandmarkRef,
) -> Result<Point, AdapterError> {
    let fetch = |index: usize| {
        raw.get(index).ok_or(AdapterError::MalformedLandmarks {
            feature,
            index,
            len: raw.len(),
        })
    };

    match landmark_ref {
        LandmarkRef::Index(i) => fetch(i),
        LandmarkRef::Midpoint(i, j) => Ok(fetch(i)?.midpoint(&fetch(j)?)),
    }
}
