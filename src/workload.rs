//! Workload driver: owns the cursor state machine and the four traffic
//! operations, wired into a weighted scheduler.
//!
//! The keyspace is filled in order, lowest value first. Queries verify that
//! every expected value in a window comes back, in order, with no gaps or
//! duplicates; a mismatch is fatal. The driver is a correctness probe, not a
//! resilient service, so store failures propagate unretried.

use crate::config::WorkloadConfig;
use crate::error::{Error, Result};
use crate::keyspace::{self, ClientId, Document, Mutation, PointTarget, RangeQuery};
use crate::range::{expected_result_count, ValueRange};
use crate::scheduler::{CancelToken, Scheduler};
use crate::store::{SortOrder, StoreClient};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// High-water cursors for the three mutating operations. Owned by one driver
/// instance; `updated` and `deleted` never pass `inserted - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursors {
    /// Next value to insert; everything below it exists (minus deletions).
    pub inserted: i64,
    /// Next value to update; advances by 2, touching the even lattice.
    pub updated: i64,
    /// Next value to delete; advances by 2, touching only the odd lattice,
    /// which sparsity-1 query verification never inspects.
    pub deleted: i64,
}

impl Default for Cursors {
    fn default() -> Self {
        Self {
            inserted: 0,
            updated: 0,
            deleted: 1,
        }
    }
}

/// Picks the sub-range a query inspects out of the full inserted range.
pub type QueryDistribution = Box<dyn FnMut(&mut StdRng, ValueRange) -> ValueRange + Send>;

/// Default distribution: the whole range while it is small, otherwise a
/// window of exactly `max_window` values at a uniformly random offset.
pub fn window_distribution(max_window: i64) -> QueryDistribution {
    Box::new(move |rng, full| {
        if full.size() <= max_window {
            return full;
        }
        let start = rng.random_range(0..full.high - max_window);
        ValueRange::from_pair(start, start + max_window)
    })
}

struct WorkloadState<S> {
    store: S,
    cursors: Cursors,
    client_id: ClientId,
    config: WorkloadConfig,
    query_dist: QueryDistribution,
}

impl<S: StoreClient> WorkloadState<S> {
    fn query(&mut self, rng: &mut StdRng) -> Result<()> {
        let full = ValueRange::from_pair(0, self.cursors.inserted);
        let range = (self.query_dist)(rng, full).align_even();
        let query = RangeQuery::build(
            self.client_id,
            self.config.shard_key_mix,
            self.config.index_mix,
            range,
            self.config.sparsity,
        );

        let step = 1i64 << self.config.sparsity;
        let expected = expected_result_count(range, self.config.sparsity);
        let mut next_value = range.low;
        let mut found = 0i64;

        let mut results = self.store.find(&query, SortOrder::Ascending)?;
        while let Some(doc) = results.next()? {
            if i64::from(doc.value) != next_value {
                return Err(Error::Verification(format!(
                    "range [{}, {}): expected value {next_value}, got {}",
                    range.low, range.high, doc.value
                )));
            }
            next_value += step;
            found += 1;
        }

        if found != expected {
            return Err(Error::Verification(format!(
                "range [{}, {}): expected {expected} documents, got {found}",
                range.low, range.high
            )));
        }

        debug!(low = range.low, high = range.high, found, "query verified");
        Ok(())
    }

    fn insert(&mut self, rng: &mut StdRng) -> Result<()> {
        let doc = Document::generate(
            rng,
            self.client_id,
            self.config.id_mode,
            self.cursors.inserted,
        );
        self.store.insert(doc)?;
        self.cursors.inserted += 1;
        Ok(())
    }

    fn update(&mut self, _rng: &mut StdRng) -> Result<()> {
        // Never race ahead of inserts.
        if self.cursors.updated >= self.cursors.inserted - 1 {
            return Ok(());
        }
        let target = self.point_target(self.cursors.updated);
        self.store.update(&target, Mutation::MarkUpdated)?;
        self.cursors.updated += 2;
        Ok(())
    }

    fn delete(&mut self, _rng: &mut StdRng) -> Result<()> {
        if self.cursors.deleted >= self.cursors.inserted - 1 {
            return Ok(());
        }
        let target = self.point_target(self.cursors.deleted);
        self.store.remove(&target)?;
        self.cursors.deleted += 2;
        Ok(())
    }

    fn point_target(&self, value: i64) -> PointTarget {
        PointTarget::build(
            self.client_id,
            self.config.shard_key_mix,
            self.config.index_mix,
            keyspace::wrap(value),
        )
    }
}

/// Drives query/insert/update/delete traffic against one store, verifying
/// query results as it goes.
pub struct WorkloadDriver<S: StoreClient> {
    scheduler: Scheduler<WorkloadState<S>>,
    state: WorkloadState<S>,
    rng: StdRng,
}

impl<S: StoreClient> WorkloadDriver<S> {
    pub fn new(store: S, config: WorkloadConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let client_id = ClientId::mint(&mut rng);

        let mut scheduler: Scheduler<WorkloadState<S>> = Scheduler::new(config.report_every);
        scheduler.register("query", config.weights.query, Box::new(|state, rng| state.query(rng)));
        scheduler.register("insert", config.weights.insert, Box::new(|state, rng| state.insert(rng)));
        scheduler.register("update", config.weights.update, Box::new(|state, rng| state.update(rng)));
        scheduler.register("delete", config.weights.delete, Box::new(|state, rng| state.delete(rng)));

        let query_dist = window_distribution(config.max_window);
        Ok(Self {
            scheduler,
            state: WorkloadState {
                store,
                cursors: Cursors::default(),
                client_id,
                config,
                query_dist,
            },
            rng,
        })
    }

    /// Replace the query range distribution.
    pub fn with_query_distribution(mut self, dist: QueryDistribution) -> Self {
        self.state.query_dist = dist;
        self
    }

    /// Run until the token is cancelled.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<()> {
        let pace = self.state.config.pace;
        self.scheduler
            .run(&mut self.state, &mut self.rng, cancel, pace)
    }

    /// Run a bounded number of scheduler ticks.
    pub fn run_ticks(&mut self, ticks: u64) -> Result<()> {
        self.scheduler
            .run_ticks(&mut self.state, &mut self.rng, ticks)
    }

    pub fn query_once(&mut self) -> Result<()> {
        self.state.query(&mut self.rng)
    }

    pub fn insert_once(&mut self) -> Result<()> {
        self.state.insert(&mut self.rng)
    }

    pub fn update_once(&mut self) -> Result<()> {
        self.state.update(&mut self.rng)
    }

    pub fn delete_once(&mut self) -> Result<()> {
        self.state.delete(&mut self.rng)
    }

    pub fn cursors(&self) -> Cursors {
        self.state.cursors
    }

    pub fn client_id(&self) -> ClientId {
        self.state.client_id
    }

    /// Per-operation invocation counts, in registration order.
    pub fn op_counts(&self) -> Vec<(&'static str, u64)> {
        self.scheduler.counts()
    }

    pub fn ticks(&self) -> u64 {
        self.scheduler.ticks()
    }
}
