//! Query points and the driver-facing input record.

use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::error::PointError;

/// A point to assign. `x` is longitude, `y` is latitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Opaque caller id, echoed back on the result
    pub id: String,
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
        }
    }

    /// Build from latitude/longitude order, as most record formats carry it
    pub fn from_lat_lon(id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self::new(id, lon, lat)
    }

    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.x,
            y: self.y,
        }
    }

    /// Coordinates usable for a containment query, or `InvalidPoint`
    pub fn validate(&self) -> Result<Coord<f64>, PointError> {
        if self.x.is_finite() && self.y.is_finite() {
            Ok(self.coord())
        } else {
            Err(PointError::InvalidPoint {
                id: self.id.clone(),
                x: self.x,
                y: self.y,
            })
        }
    }
}

/// Input record as delivered by a batch driver.
///
/// Either coordinate may be absent; such records are passed through
/// without being queried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub id: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl PointRecord {
    pub fn new(id: impl Into<String>, latitude: Option<f64>, longitude: Option<f64>) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
        }
    }

    /// The point to query, if both coordinates are present
    pub fn point(&self) -> Option<Point> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Point::from_lat_lon(self.id.clone(), lat, lon)),
            _ => None,
        }
    }
}
