//! Error types for catalog loading and point assignment.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a catalog load.
///
/// There is no meaningful partial catalog, so any of these stops the run.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A feature's geometry cannot be used for containment tests.
    #[error("Malformed geometry in feature {feature}: {reason}")]
    MalformedGeometry { feature: usize, reason: String },

    /// A feature lacks the configured identifier property.
    #[error("Feature {feature} is missing required field '{field}'")]
    MissingField { feature: usize, field: String },

    /// The identifier property is present but neither a string nor a number.
    #[error("Feature {feature} has field '{field}' = {found}, expected a string or number")]
    MalformedId {
        feature: usize,
        field: String,
        found: String,
    },

    /// The region source could not be read.
    #[error("Failed to read region source {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    /// The region source is not valid GeoJSON.
    #[error("Failed to parse GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The region source parsed, but is not a FeatureCollection.
    #[error("Region source must be a GeoJSON FeatureCollection")]
    NotAFeatureCollection,
}

/// Per-point errors. These never abort a batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PointError {
    #[error("Point '{id}' has non-finite coordinates ({x}, {y})")]
    InvalidPoint { id: String, x: f64, y: f64 },
}

impl PointError {
    /// Id of the rejected point.
    pub fn point_id(&self) -> &str {
        match self {
            PointError::InvalidPoint { id, .. } => id,
        }
    }
}
