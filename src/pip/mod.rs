//! Point-in-Polygon (PIP) region assignment.
//!
//! Loads region boundaries into an immutable catalog, indexes their
//! bounding boxes in an R-tree, and assigns points to the enclosing region.

mod batch;
mod catalog;
mod engine;
mod geometry;
mod index;

pub use batch::{BatchOptions, BatchOutput, BatchRunner, DEFAULT_CHUNK_SIZE};
pub use catalog::{Region, RegionCatalog, RegionHandle, RegionSource, DEFAULT_ID_FIELD};
pub use engine::AssignmentEngine;
pub use geometry::{Kernel, DEFAULT_EPSILON};
pub use index::{IndexedRegion, RegionIndex};
