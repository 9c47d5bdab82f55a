//! Core data models for point assignment.

pub mod assignment;
pub mod point;

pub use assignment::{
    Assignment, BatchSummary, Containment, MatchStatus, OutcomeStatus, PointOutcome,
    NO_MATCH_CODE,
};
pub use point::{Point, PointRecord};
