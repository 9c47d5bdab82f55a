//! Tractor - assigns geographic points to the enclosing region of a fixed
//! boundary set (census tracts and similar).
//!
//! Setup happens once: [`load_regions`] reads the boundaries and
//! [`build_index`] bulk-loads an R-tree over them. After that,
//! [`assign_batch`] answers any number of point queries against the
//! read-only catalog and index.

pub mod error;
pub mod models;
pub mod pip;

pub use error::{CatalogError, PointError};
pub use models::{
    Assignment, BatchSummary, Containment, MatchStatus, OutcomeStatus, Point, PointOutcome,
};
pub use pip::{AssignmentEngine, Kernel, RegionCatalog, RegionIndex, RegionSource};

/// Load and validate region boundaries
pub fn load_regions(source: &RegionSource) -> Result<RegionCatalog, CatalogError> {
    RegionCatalog::load(source)
}

/// Build the spatial index over a loaded catalog
pub fn build_index(catalog: &RegionCatalog) -> RegionIndex {
    RegionIndex::build(catalog)
}

/// Assign each point independently, in parallel, returning outcomes in input order
pub fn assign_batch(
    points: &[Point],
    catalog: &RegionCatalog,
    index: &RegionIndex,
    kernel: Kernel,
) -> Vec<PointOutcome> {
    AssignmentEngine::new(catalog, index, kernel).assign_batch(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"fips": "A"},
                "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 1]]]}
            },
            {
                "type": "Feature",
                "properties": {"fips": "B"},
                "geometry": {"type": "Polygon", "coordinates": [[[1, 0], [2, 0], [2, 1], [1, 1]]]}
            }
        ]
    }"#;

    #[test]
    fn test_load_index_assign() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracts.geojson");
        std::fs::write(&path, TRACTS).unwrap();

        let catalog = load_regions(&RegionSource::new(&path).with_id_field("fips")).unwrap();
        let index = build_index(&catalog);

        let points = vec![
            Point::new("interior", 0.5, 0.5),
            Point::new("edge", 1.0, 0.5),
            Point::new("far", 5.0, 5.0),
            Point::new("nan", f64::NAN, 0.5),
        ];
        let outcomes = assign_batch(&points, &catalog, &index, Kernel::default());

        let interior = outcomes[0].as_ref().unwrap();
        assert_eq!(interior.matched_region_id.as_deref(), Some("A"));
        assert_eq!(interior.match_count, 1);

        let edge = outcomes[1].as_ref().unwrap();
        assert_eq!(edge.matched_region_id.as_deref(), Some("A"));
        assert_eq!(edge.match_count, 2);

        let far = outcomes[2].as_ref().unwrap();
        assert_eq!(far.matched_region_id, None);
        assert_eq!(far.match_count, 0);

        assert!(matches!(outcomes[3], Err(PointError::InvalidPoint { .. })));
    }
}
