//! Assignment results and batch accounting.

use serde::{Deserialize, Serialize};

use crate::error::PointError;

/// Code emitted for points outside every region.
pub const NO_MATCH_CODE: &str = "NA";

/// Kernel classification of a point against a region.
///
/// Ordered by match preference: `Inside` wins over `OnBoundary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Containment {
    Inside,
    OnBoundary,
    Outside,
}

impl Containment {
    /// Inclusive match semantics: boundary points count
    pub fn is_match(&self) -> bool {
        !matches!(self, Containment::Outside)
    }
}

/// How a point resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    Unmatched,
    Ambiguous,
    /// Rejected before querying; only produced from a [`PointOutcome`]
    Invalid,
}

/// Result of assigning one point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub point_id: String,

    /// Chosen region, `None` when outside all regions
    pub matched_region_id: Option<String>,

    /// Number of regions that matched (inside or on boundary)
    pub match_count: usize,

    /// Classification of the chosen region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub containment: Option<Containment>,

    /// Every matching region id, in tie-break order (chosen first)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub matches: Vec<String>,
}

impl Assignment {
    pub fn unmatched(point_id: impl Into<String>) -> Self {
        Self {
            point_id: point_id.into(),
            matched_region_id: None,
            match_count: 0,
            containment: None,
            matches: Vec::new(),
        }
    }

    pub fn status(&self) -> MatchStatus {
        match self.match_count {
            0 => MatchStatus::Unmatched,
            1 => MatchStatus::Matched,
            _ => MatchStatus::Ambiguous,
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        self.match_count > 1
    }

    /// Region id, or [`NO_MATCH_CODE`]
    pub fn region_code(&self) -> &str {
        self.matched_region_id.as_deref().unwrap_or(NO_MATCH_CODE)
    }
}

/// Per-point outcome of a batch: an assignment, or the reason it was rejected.
pub type PointOutcome = Result<Assignment, PointError>;

/// Status of a whole outcome, rejected points included.
pub trait OutcomeStatus {
    fn status(&self) -> MatchStatus;
}

impl OutcomeStatus for PointOutcome {
    fn status(&self) -> MatchStatus {
        match self {
            Ok(assignment) => assignment.status(),
            Err(_) => MatchStatus::Invalid,
        }
    }
}

/// Counts of batch outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub matched: usize,
    pub unmatched: usize,
    pub ambiguous: usize,
    pub invalid: usize,
    /// Records passed through without coordinates
    pub skipped: usize,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &PointOutcome) {
        match outcome.status() {
            MatchStatus::Matched => self.matched += 1,
            MatchStatus::Unmatched => self.unmatched += 1,
            MatchStatus::Ambiguous => self.ambiguous += 1,
            MatchStatus::Invalid => self.invalid += 1,
        }
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn merge(&mut self, other: &BatchSummary) {
        self.matched += other.matched;
        self.unmatched += other.unmatched;
        self.ambiguous += other.ambiguous;
        self.invalid += other.invalid;
        self.skipped += other.skipped;
    }

    pub fn total(&self) -> usize {
        self.matched + self.unmatched + self.ambiguous + self.invalid + self.skipped
    }
}

impl<'a> FromIterator<&'a PointOutcome> for BatchSummary {
    fn from_iter<I: IntoIterator<Item = &'a PointOutcome>>(iter: I) -> Self {
        let mut summary = BatchSummary::default();
        for outcome in iter {
            summary.record(outcome);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(count: usize) -> Assignment {
        Assignment {
            point_id: "p".to_string(),
            matched_region_id: (count > 0).then(|| "42003".to_string()),
            match_count: count,
            containment: (count > 0).then_some(Containment::Inside),
            matches: Vec::new(),
        }
    }

    #[test]
    fn test_status_from_match_count() {
        assert_eq!(assignment(0).status(), MatchStatus::Unmatched);
        assert_eq!(assignment(1).status(), MatchStatus::Matched);
        assert_eq!(assignment(3).status(), MatchStatus::Ambiguous);
        assert!(assignment(2).is_ambiguous());
    }

    #[test]
    fn test_outcome_status_covers_rejected_points() {
        let rejected: PointOutcome = Err(PointError::InvalidPoint {
            id: "bad".to_string(),
            x: 0.0,
            y: f64::INFINITY,
        });
        assert_eq!(rejected.status(), MatchStatus::Invalid);

        let matched: PointOutcome = Ok(assignment(1));
        assert_eq!(matched.status(), MatchStatus::Matched);
        let ambiguous: PointOutcome = Ok(assignment(2));
        assert_eq!(ambiguous.status(), MatchStatus::Ambiguous);

        assert_eq!(
            serde_json::to_string(&MatchStatus::Invalid).unwrap(),
            "\"invalid\""
        );
    }

    #[test]
    fn test_unmatched_code() {
        let a = Assignment::unmatched("p");
        assert_eq!(a.region_code(), NO_MATCH_CODE);
        assert_eq!(assignment(1).region_code(), "42003");
    }

    #[test]
    fn test_containment_preference_order() {
        assert!(Containment::Inside < Containment::OnBoundary);
        assert!(Containment::OnBoundary.is_match());
        assert!(!Containment::Outside.is_match());
    }

    #[test]
    fn test_summary_counts() {
        let outcomes: Vec<PointOutcome> = vec![
            Ok(assignment(1)),
            Ok(assignment(0)),
            Ok(assignment(2)),
            Err(PointError::InvalidPoint {
                id: "bad".to_string(),
                x: f64::NAN,
                y: 0.0,
            }),
        ];
        let mut summary: BatchSummary = outcomes.iter().collect();
        summary.record_skipped();

        assert_eq!(summary.matched, 1);
        assert_eq!(summary.unmatched, 1);
        assert_eq!(summary.ambiguous, 1);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.total(), 5);
    }
}
