//! Weighted random dispatch shared by the workload and chaos drivers.
//!
//! Operations are registered as an ordered list of `(name, weight, closure)`
//! entries. Each tick draws uniformly from `[0, total_weight)` and walks the
//! cumulative weight table in registration order, so relative frequencies are
//! defined by the table's own total rather than a fixed percentage scale.

use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Cooperative stop flag shared between a driver loop and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// An operation invoked by the scheduler. Side effects live entirely inside
/// the closure; the scheduler only selects, invokes, and counts.
pub type Operation<C> = Box<dyn FnMut(&mut C, &mut StdRng) -> Result<()> + Send>;

struct Entry<C> {
    name: &'static str,
    /// Exclusive upper bound of this entry's slice of the cumulative table.
    bound: u64,
    count: u64,
    op: Operation<C>,
}

/// Weighted random operation scheduler over a driver-owned context `C`.
pub struct Scheduler<C> {
    entries: Vec<Entry<C>>,
    total_weight: u64,
    ticks: u64,
    report_every: u64,
}

impl<C> Scheduler<C> {
    /// `report_every` controls how often accumulated counts are logged;
    /// zero disables status reports.
    pub fn new(report_every: u64) -> Self {
        Self {
            entries: Vec::new(),
            total_weight: 0,
            ticks: 0,
            report_every,
        }
    }

    /// Append an operation. Registration order is the iteration contract:
    /// the cumulative table is walked in exactly this order. A zero weight
    /// keeps the entry in the table but it is never selected.
    pub fn register(&mut self, name: &'static str, weight: u64, op: Operation<C>) {
        self.total_weight += weight;
        self.entries.push(Entry {
            name,
            bound: self.total_weight,
            count: 0,
            op,
        });
    }

    /// Select one operation by weight, invoke it, and count the invocation.
    /// Returns the name of the operation that ran.
    pub fn tick(&mut self, ctx: &mut C, rng: &mut StdRng) -> Result<&'static str> {
        if self.total_weight == 0 {
            return Err(Error::Config(
                "scheduler has no operations with positive weight".to_string(),
            ));
        }

        let draw = rng.random_range(0..self.total_weight);
        let idx = match self.entries.iter().position(|e| draw < e.bound) {
            Some(idx) => idx,
            None => {
                return Err(Error::Config(
                    "cumulative weight table is inconsistent".to_string(),
                ))
            }
        };

        let name = {
            let entry = &mut self.entries[idx];
            (entry.op)(ctx, rng)?;
            entry.count += 1;
            entry.name
        };

        self.ticks += 1;
        if self.report_every != 0 && self.ticks % self.report_every == 0 {
            let counts = self.counts();
            info!(ticks = self.ticks, ?counts, "scheduler status");
        }

        Ok(name)
    }

    /// Run a bounded number of ticks; used by tests and the soak binary.
    pub fn run_ticks(&mut self, ctx: &mut C, rng: &mut StdRng, ticks: u64) -> Result<()> {
        for _ in 0..ticks {
            self.tick(ctx, rng)?;
        }
        Ok(())
    }

    /// Run until cancelled, sleeping `pace` between ticks. The loop is
    /// synchronous: one operation completes before the next draw.
    pub fn run(
        &mut self,
        ctx: &mut C,
        rng: &mut StdRng,
        cancel: &CancelToken,
        pace: Duration,
    ) -> Result<()> {
        while !cancel.is_cancelled() {
            self.tick(ctx, rng)?;
            if !pace.is_zero() {
                std::thread::sleep(pace);
            }
        }
        Ok(())
    }

    /// Per-operation invocation counts, in registration order.
    pub fn counts(&self) -> Vec<(&'static str, u64)> {
        self.entries.iter().map(|e| (e.name, e.count)).collect()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn tick_invokes_and_counts_by_weight() {
        let mut scheduler: Scheduler<u64> = Scheduler::new(0);
        scheduler.register("inc", 1, Box::new(|ctx, _| {
            *ctx += 1;
            Ok(())
        }));

        let mut rng = StdRng::seed_from_u64(1);
        let mut ctx = 0u64;
        for _ in 0..10 {
            assert_eq!(scheduler.tick(&mut ctx, &mut rng).unwrap(), "inc");
        }
        assert_eq!(ctx, 10);
        assert_eq!(scheduler.counts(), vec![("inc", 10)]);
        assert_eq!(scheduler.ticks(), 10);
    }

    #[test]
    fn zero_weight_entry_is_never_selected() {
        let mut scheduler: Scheduler<()> = Scheduler::new(0);
        scheduler.register("live", 3, Box::new(|_, _| Ok(())));
        scheduler.register("dead", 0, Box::new(|_, _| panic!("selected zero-weight entry")));
        scheduler.register("also_live", 2, Box::new(|_, _| Ok(())));

        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..500 {
            scheduler.tick(&mut (), &mut rng).unwrap();
        }

        let counts = scheduler.counts();
        assert_eq!(counts[1], ("dead", 0));
        assert_eq!(counts[0].1 + counts[2].1, 500);
    }

    #[test]
    fn zero_total_weight_is_a_config_error() {
        let mut scheduler: Scheduler<()> = Scheduler::new(0);
        scheduler.register("dead", 0, Box::new(|_, _| Ok(())));

        let mut rng = StdRng::seed_from_u64(3);
        let err = scheduler.tick(&mut (), &mut rng).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn operation_error_propagates_out_of_tick() {
        let mut scheduler: Scheduler<()> = Scheduler::new(0);
        scheduler.register("fail", 1, Box::new(|_, _| {
            Err(Error::Store("backend unreachable".to_string()))
        }));

        let mut rng = StdRng::seed_from_u64(4);
        let err = scheduler.tick(&mut (), &mut rng).unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        // A failed invocation is not counted.
        assert_eq!(scheduler.counts(), vec![("fail", 0)]);
    }

    #[test]
    fn run_honors_a_pre_cancelled_token() {
        let mut scheduler: Scheduler<()> = Scheduler::new(0);
        scheduler.register("op", 1, Box::new(|_, _| Ok(())));

        let cancel = CancelToken::new();
        cancel.cancel();

        let mut rng = StdRng::seed_from_u64(5);
        scheduler
            .run(&mut (), &mut rng, &cancel, Duration::ZERO)
            .unwrap();
        assert_eq!(scheduler.ticks(), 0);
    }

    #[test]
    fn run_stops_when_cancelled_from_another_thread() {
        let cancel = CancelToken::new();
        let canceller = cancel.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        let mut scheduler: Scheduler<()> = Scheduler::new(0);
        scheduler.register("spin", 1, Box::new(|_, _| Ok(())));

        let mut rng = StdRng::seed_from_u64(6);
        scheduler
            .run(&mut (), &mut rng, &cancel, Duration::from_millis(1))
            .unwrap();
        handle.join().unwrap();
        assert!(scheduler.ticks() > 0);
    }
}
