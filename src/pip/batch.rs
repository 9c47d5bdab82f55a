//! Chunked, parallel batch execution with cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::engine::AssignmentEngine;
use crate::models::{BatchSummary, Point, PointOutcome};

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Points per independently scheduled chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Worker threads; all cores when unset
    #[serde(default)]
    pub workers: Option<usize>,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: None,
        }
    }
}

/// Outcomes of a batch run.
#[derive(Debug)]
pub struct BatchOutput {
    /// One outcome per input point, in input order. After cancellation,
    /// only the leading run of fully completed chunks.
    pub outcomes: Vec<PointOutcome>,
    pub summary: BatchSummary,
    pub cancelled: bool,
}

/// Runs batches on a dedicated worker pool.
pub struct BatchRunner {
    pool: ThreadPool,
    chunk_size: usize,
}

impl BatchRunner {
    pub fn new(options: &BatchOptions) -> Result<Self, ThreadPoolBuildError> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("assign-{}", i));
        if let Some(workers) = options.workers {
            builder = builder.num_threads(workers);
        }
        let pool = builder.build()?;

        info!(
            "Batch runner ready: {} workers, chunks of {}",
            pool.current_num_threads(),
            options.chunk_size.max(1)
        );

        Ok(Self {
            pool,
            chunk_size: options.chunk_size.max(1),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Assign `points`, checking `cancel` before each chunk starts.
    ///
    /// A chunk that has started always finishes. Chunks are never emitted
    /// partially, and nothing after the first skipped chunk is emitted.
    pub fn run(
        &self,
        engine: &AssignmentEngine<'_>,
        points: &[Point],
        cancel: Option<&AtomicBool>,
    ) -> BatchOutput {
        let chunk_size = self.chunk_size;

        let chunks: Vec<Option<Vec<PointOutcome>>> = self.pool.install(|| {
            points
                .par_chunks(chunk_size)
                .enumerate()
                .map(|(i, chunk)| {
                    if cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
                        return None;
                    }
                    let outcomes: Vec<PointOutcome> =
                        chunk.iter().map(|p| engine.assign_point(p)).collect();
                    debug!("Chunk {} complete ({} points)", i, chunk.len());
                    Some(outcomes)
                })
                .collect()
        });

        let (outcomes, cancelled) = leading_chunks(chunks, points.len());

        let summary: BatchSummary = outcomes.iter().collect();
        for rejected in outcomes.iter().filter_map(|o| o.as_ref().err()) {
            warn!("{}", rejected);
        }
        if cancelled {
            warn!(
                "Batch cancelled after {} of {} points",
                outcomes.len(),
                points.len()
            );
        }

        BatchOutput {
            outcomes,
            summary,
            cancelled,
        }
    }
}

/// Concatenate chunks up to the first skipped one. The flag is set when a
/// chunk was skipped, even if later chunks completed.
fn leading_chunks(
    chunks: Vec<Option<Vec<PointOutcome>>>,
    capacity: usize,
) -> (Vec<PointOutcome>, bool) {
    let mut outcomes = Vec::with_capacity(capacity);
    for chunk in chunks {
        match chunk {
            Some(chunk) => outcomes.extend(chunk),
            None => return (outcomes, true),
        }
    }
    (outcomes, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pip::{Kernel, RegionCatalog, RegionIndex};
    use geo::{LineString, MultiPolygon, Polygon};
    use std::thread;
    use std::time::Duration;

    fn catalog() -> RegionCatalog {
        let cells = (0..10).map(|i| {
            let x = i as f64;
            let ring = LineString::from(vec![(x, 0.0), (x + 1.0, 0.0), (x + 1.0, 1.0), (x, 1.0)]);
            (
                format!("cell-{}", i),
                MultiPolygon::new(vec![Polygon::new(ring, vec![])]),
            )
        });
        RegionCatalog::from_regions(cells).unwrap()
    }

    fn points(n: usize) -> Vec<Point> {
        (0..n)
            .map(|i| Point::new(format!("p{}", i), (i % 97) as f64 * 0.11 + 0.005, 0.5))
            .collect()
    }

    #[test]
    fn test_chunked_run_matches_direct_assignment() {
        let catalog = catalog();
        let index = RegionIndex::build(&catalog);
        let engine = AssignmentEngine::new(&catalog, &index, Kernel::default());
        let runner = BatchRunner::new(&BatchOptions {
            chunk_size: 7,
            workers: Some(3),
        })
        .unwrap();

        let points = points(250);
        let output = runner.run(&engine, &points, None);

        assert!(!output.cancelled);
        assert_eq!(output.outcomes, engine.assign_batch(&points));
        assert_eq!(output.summary.total(), 250);
    }

    #[test]
    fn test_invalid_points_do_not_abort_batch() {
        let catalog = catalog();
        let index = RegionIndex::build(&catalog);
        let engine = AssignmentEngine::new(&catalog, &index, Kernel::default());
        let runner = BatchRunner::new(&BatchOptions::default()).unwrap();

        let mut points = points(10);
        points[3] = Point::new("bad", 0.5, f64::NAN);
        let output = runner.run(&engine, &points, None);

        assert_eq!(output.outcomes.len(), 10);
        assert!(output.outcomes[3].is_err());
        assert_eq!(output.summary.invalid, 1);
        assert_eq!(output.summary.matched + output.summary.unmatched, 9);
    }

    #[test]
    fn test_cancelled_before_start_emits_nothing() {
        let catalog = catalog();
        let index = RegionIndex::build(&catalog);
        let engine = AssignmentEngine::new(&catalog, &index, Kernel::default());
        let runner = BatchRunner::new(&BatchOptions {
            chunk_size: 4,
            workers: Some(2),
        })
        .unwrap();

        let cancel = AtomicBool::new(true);
        let output = runner.run(&engine, &points(40), Some(&cancel));

        assert!(output.cancelled);
        assert!(output.outcomes.is_empty());
        assert_eq!(output.summary, BatchSummary::default());
    }

    #[test]
    fn test_completed_chunks_after_a_skipped_one_are_dropped() {
        let catalog = catalog();
        let index = RegionIndex::build(&catalog);
        let engine = AssignmentEngine::new(&catalog, &index, Kernel::default());
        let direct = engine.assign_batch(&points(12));

        let chunks: Vec<Option<Vec<PointOutcome>>> = vec![
            Some(direct[0..4].to_vec()),
            Some(direct[4..8].to_vec()),
            None,
            Some(direct[8..12].to_vec()),
        ];
        let (outcomes, cancelled) = leading_chunks(chunks, 12);

        assert!(cancelled);
        assert_eq!(outcomes, direct[..8].to_vec());

        let all = vec![Some(direct[..6].to_vec()), Some(direct[6..].to_vec())];
        assert_eq!(leading_chunks(all, 12), (direct.clone(), false));
    }

    #[test]
    fn test_cancel_mid_run_emits_whole_chunk_prefix() {
        let catalog = catalog();
        let index = RegionIndex::build(&catalog);
        let engine = AssignmentEngine::new(&catalog, &index, Kernel::default());
        let chunk_size = 16;
        let runner = BatchRunner::new(&BatchOptions {
            chunk_size,
            workers: Some(1),
        })
        .unwrap();

        let points = points(200_000);
        let direct = engine.assign_batch(&points);
        let cancel = AtomicBool::new(false);

        // Wherever the flag lands, the output must be a whole-chunk prefix
        let output = thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(5));
                cancel.store(true, Ordering::Relaxed);
            });
            runner.run(&engine, &points, Some(&cancel))
        });

        let emitted = output.outcomes.len();
        assert_eq!(emitted % chunk_size, 0);
        assert_eq!(output.outcomes, direct[..emitted].to_vec());
        assert_eq!(output.summary.total(), emitted);
        assert_eq!(output.cancelled, emitted < points.len());
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        let runner = BatchRunner::new(&BatchOptions {
            chunk_size: 0,
            workers: Some(1),
        })
        .unwrap();
        assert_eq!(runner.chunk_size(), 1);
    }
}
