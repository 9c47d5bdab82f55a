//! Point-to-region assignment with deterministic tie-breaking.

use std::cmp::Ordering;

use rayon::prelude::*;
use tracing::debug;

use super::catalog::{RegionCatalog, RegionHandle};
use super::geometry::Kernel;
use super::index::RegionIndex;
use crate::models::{Assignment, Containment, Point, PointOutcome};

/// Answers containment queries against a built catalog and index.
///
/// Holds shared references only, so one engine can serve every worker.
#[derive(Clone, Copy)]
pub struct AssignmentEngine<'a> {
    catalog: &'a RegionCatalog,
    index: &'a RegionIndex,
    kernel: Kernel,
}

impl<'a> AssignmentEngine<'a> {
    pub fn new(catalog: &'a RegionCatalog, index: &'a RegionIndex, kernel: Kernel) -> Self {
        Self {
            catalog,
            index,
            kernel,
        }
    }

    pub fn catalog(&self) -> &'a RegionCatalog {
        self.catalog
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Assign a single point.
    ///
    /// Several matches are ordered by: `Inside` before `OnBoundary`, then
    /// smaller bounding-box area, then region id, then load order. The first
    /// one is chosen and `match_count` records how many there were.
    pub fn assign_point(&self, point: &Point) -> PointOutcome {
        let p = point.validate()?;

        let mut matches: Vec<(Containment, RegionHandle)> = self
            .index
            .query(p, self.kernel.epsilon())
            .into_iter()
            .filter_map(|handle| {
                let region = self.catalog.get(handle);
                let containment = self.kernel.contains_multi(&region.geometry, p);
                containment.is_match().then_some((containment, handle))
            })
            .collect();

        matches.sort_by(|a, b| self.tie_break(a, b));

        let Some(&(containment, chosen)) = matches.first() else {
            debug!("Point {} ({}, {}) is outside all regions", point.id, p.x, p.y);
            return Ok(Assignment::unmatched(point.id.clone()));
        };

        if matches.len() > 1 {
            debug!(
                "Point {} ({}, {}) matched {} regions, chose {}",
                point.id,
                p.x,
                p.y,
                matches.len(),
                self.catalog.get(chosen).id
            );
        }

        Ok(Assignment {
            point_id: point.id.clone(),
            matched_region_id: Some(self.catalog.get(chosen).id.clone()),
            match_count: matches.len(),
            containment: Some(containment),
            matches: matches
                .iter()
                .map(|(_, handle)| self.catalog.get(*handle).id.clone())
                .collect(),
        })
    }

    /// Assign every point on the current rayon pool, preserving input order
    pub fn assign_batch(&self, points: &[Point]) -> Vec<PointOutcome> {
        points.par_iter().map(|p| self.assign_point(p)).collect()
    }

    fn tie_break(
        &self,
        (ca, ha): &(Containment, RegionHandle),
        (cb, hb): &(Containment, RegionHandle),
    ) -> Ordering {
        let (ra, rb) = (self.catalog.get(*ha), self.catalog.get(*hb));
        ca.cmp(cb)
            .then_with(|| ra.bbox_area().total_cmp(&rb.bbox_area()))
            .then_with(|| ra.id.cmp(&rb.id))
            .then_with(|| ha.cmp(hb))
    }
}
