//! Spatial index for fast region candidate lookups.

use geo::Coord;
use rstar::{RTree, RTreeObject, AABB};
use tracing::info;

use super::catalog::{RegionCatalog, RegionHandle};

/// R-tree leaf: a region handle and its bounding box
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRegion {
    pub handle: RegionHandle,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedRegion {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Bulk-loaded R-tree over the catalog's bounding boxes.
///
/// Holds handles only; geometry stays in the catalog. Immutable once built.
pub struct RegionIndex {
    tree: RTree<IndexedRegion>,
}

impl RegionIndex {
    /// Build the index over every region in the catalog
    pub fn build(catalog: &RegionCatalog) -> Self {
        info!("Building spatial index for {} regions...", catalog.len());

        let indexed: Vec<IndexedRegion> = catalog
            .handles()
            .map(|handle| {
                let bbox = catalog.bounding_box_of(handle);
                IndexedRegion {
                    handle,
                    envelope: AABB::from_corners(
                        [bbox.min().x, bbox.min().y],
                        [bbox.max().x, bbox.max().y],
                    ),
                }
            })
            .collect();

        // OMT bulk load: balanced, depth grows with log(n)
        let tree = RTree::bulk_load(indexed);

        info!("Spatial index built with {} entries", tree.size());

        Self { tree }
    }

    /// Regions whose bounding box contains `p`, widened by `tolerance`.
    ///
    /// Box edges are inclusive, so a superset of the true matches comes
    /// back. Handles are sorted so callers see a stable order.
    pub fn query(&self, p: Coord<f64>, tolerance: f64) -> Vec<RegionHandle> {
        let query_envelope = AABB::from_corners(
            [p.x - tolerance, p.y - tolerance],
            [p.x + tolerance, p.y + tolerance],
        );

        let mut handles: Vec<RegionHandle> = self
            .tree
            .locate_in_envelope_intersecting(&query_envelope)
            .map(|ir| ir.handle)
            .collect();
        handles.sort_unstable();
        handles
    }

    /// Get total number of indexed regions
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, MultiPolygon, Polygon};

    fn rect(id: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> (String, MultiPolygon<f64>) {
        let ring = LineString::from(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)]);
        (id.to_string(), MultiPolygon::new(vec![Polygon::new(ring, vec![])]))
    }

    /// `n` x `n` unit cells, ids "col-row"
    fn grid(n: usize) -> RegionCatalog {
        let cells = (0..n).flat_map(|i| {
            (0..n).map(move |j| {
                let (x, y) = (i as f64, j as f64);
                rect(&format!("{}-{}", i, j), x, y, x + 1.0, y + 1.0)
            })
        });
        RegionCatalog::from_regions(cells).unwrap()
    }

    #[test]
    fn test_empty_index() {
        let catalog = RegionCatalog::default();
        let index = RegionIndex::build(&catalog);
        assert!(index.is_empty());
        assert!(index.query(Coord { x: 0.0, y: 0.0 }, 0.0).is_empty());
    }

    #[test]
    fn test_every_vertex_finds_its_region() {
        let catalog = grid(12);
        let index = RegionIndex::build(&catalog);
        assert_eq!(index.len(), 144);

        for handle in catalog.handles() {
            for polygon in &catalog.get(handle).geometry {
                for vertex in polygon.exterior().coords() {
                    let candidates = index.query(*vertex, 0.0);
                    assert!(
                        candidates.contains(&handle),
                        "vertex {:?} missed region {}",
                        vertex,
                        catalog.get(handle).id
                    );
                }
            }
        }
    }

    #[test]
    fn test_interior_query_is_narrow() {
        let catalog = grid(40);
        let index = RegionIndex::build(&catalog);

        let candidates = index.query(Coord { x: 17.5, y: 23.5 }, 1e-9);
        assert_eq!(candidates.len(), 1);
        assert_eq!(catalog.get(candidates[0]).id, "17-23");

        // Shared corner touches four cells
        assert_eq!(index.query(Coord { x: 17.0, y: 23.0 }, 0.0).len(), 4);
    }

    #[test]
    fn test_far_point_has_no_candidates() {
        let catalog = grid(5);
        let index = RegionIndex::build(&catalog);
        assert!(index.query(Coord { x: 100.0, y: -100.0 }, 1e-9).is_empty());
    }

    #[test]
    fn test_tolerance_widens_query() {
        let catalog = RegionCatalog::from_regions(vec![rect("a", 0.0, 0.0, 1.0, 1.0)]).unwrap();
        let index = RegionIndex::build(&catalog);
        let just_outside = Coord { x: 1.0 + 1e-10, y: 0.5 };
        assert!(index.query(just_outside, 0.0).is_empty());
        assert_eq!(index.query(just_outside, 1e-9).len(), 1);
    }

    #[test]
    fn test_query_order_is_stable() {
        let catalog = grid(8);
        let index = RegionIndex::build(&catalog);
        let p = Coord { x: 4.0, y: 4.0 };
        let first = index.query(p, 1e-9);
        assert!(first.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(first, index.query(p, 1e-9));
    }
}
