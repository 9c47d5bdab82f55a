//! Point-in-polygon predicates.
//!
//! Each ring is classified with `geo`'s robust winding test, after an
//! explicit tolerance band around the ring measured as Euclidean distance.
//! A point inside the band is `OnBoundary` whatever the winding test says,
//! so the result does not depend on ring orientation or on which vertex a
//! ring starts at.

use std::borrow::Cow;

use geo::coordinate_position::{coord_pos_relative_to_ring, CoordPos};
use geo::{Coord, Distance, Euclidean, LineString, MultiPolygon, Point, Polygon};

use crate::models::Containment;

/// Boundary tolerance in coordinate units.
///
/// For WGS84 degrees this is roughly 0.1 mm on the ground, well below the
/// precision of published census boundary files.
pub const DEFAULT_EPSILON: f64 = 1e-9;

/// Containment predicates with a fixed boundary tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kernel {
    epsilon: f64,
}

impl Default for Kernel {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl Kernel {
    /// Kernel with a custom tolerance. `None` unless `epsilon` is finite and non-negative.
    pub fn with_epsilon(epsilon: f64) -> Option<Self> {
        (epsilon.is_finite() && epsilon >= 0.0).then_some(Self { epsilon })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Classify `p` against a single polygon.
    ///
    /// Points on a hole's edge are not interior and come back as `OnBoundary`.
    pub fn contains(&self, polygon: &Polygon<f64>, p: Coord<f64>) -> Containment {
        match self.ring_position(polygon.exterior(), p) {
            Containment::Inside => {}
            other => return other,
        }

        for hole in polygon.interiors() {
            match self.ring_position(hole, p) {
                Containment::Inside => return Containment::Outside,
                Containment::OnBoundary => return Containment::OnBoundary,
                Containment::Outside => {}
            }
        }

        Containment::Inside
    }

    /// Classify `p` against a multi-part region.
    ///
    /// Inside any part wins; otherwise on any part's boundary.
    pub fn contains_multi(&self, geometry: &MultiPolygon<f64>, p: Coord<f64>) -> Containment {
        let mut best = Containment::Outside;
        for polygon in geometry {
            match self.contains(polygon, p) {
                Containment::Inside => return Containment::Inside,
                Containment::OnBoundary => best = Containment::OnBoundary,
                Containment::Outside => {}
            }
        }
        best
    }

    /// Classify `p` against one ring. The ring may or may not repeat its first vertex.
    pub fn ring_position(&self, ring: &LineString<f64>, p: Coord<f64>) -> Containment {
        if ring.0.is_empty() {
            return Containment::Outside;
        }

        let ring = if ring.is_closed() {
            Cow::Borrowed(ring)
        } else {
            let mut closed = ring.clone();
            closed.close();
            Cow::Owned(closed)
        };

        if Euclidean.distance(&Point::from(p), &*ring) <= self.epsilon {
            return Containment::OnBoundary;
        }

        match coord_pos_relative_to_ring(p, &ring) {
            CoordPos::Inside => Containment::Inside,
            CoordPos::OnBoundary => Containment::OnBoundary,
            CoordPos::Outside => Containment::Outside,
        }
    }
}
