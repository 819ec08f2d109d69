//! Chaos driver: periodically triggers disruptive administrative actions
//! against the cluster, sharing the weighted-dispatch design of the workload
//! driver.
//!
//! Chaos is cluster-wide by intent: a routing-cache flush or forced leader
//! change hits every concurrently-running workload instance, not just data
//! scoped to one client.

use crate::config::ChaosConfig;
use crate::error::{Error, Result};
use crate::scheduler::{CancelToken, Scheduler};
use crate::store::{AdminClient, AdminCommand, CoordinationLog, Notification, NotificationId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::SystemTime;
use tracing::{info, warn};

struct ChaosState<S> {
    store: S,
    config: ChaosConfig,
}

impl<S: AdminClient + CoordinationLog> ChaosState<S> {
    /// Drop cached routing metadata on every routing-tier node. Failures here
    /// are not expected and propagate.
    fn flush_routing_cache(&mut self, _rng: &mut StdRng) -> Result<()> {
        let routers = self.store.list_routers()?;
        info!(routers = routers.len(), "flushing routing caches");
        for endpoint in &routers {
            self.store
                .run_admin(endpoint, AdminCommand::FlushRoutingCache)?;
        }
        Ok(())
    }

    /// Force a leader election on a random partition group, bracketed by a
    /// notification record in the coordination collection.
    fn force_leader_change(&mut self, rng: &mut StdRng) -> Result<()> {
        let groups = self.store.list_partition_groups()?;
        if groups.is_empty() {
            return Err(Error::Store("no partition groups registered".to_string()));
        }
        let group = &groups[rng.random_range(0..groups.len())];

        let note_id = NotificationId(rng.random());
        self.store.append(Notification {
            id: note_id,
            action: "force_leader_change".to_string(),
            group: group.id.clone(),
            at: SystemTime::now(),
        })?;

        info!(group = %group.id, primary = %group.primary, "stepping down leader");
        let command = AdminCommand::StepDown {
            seconds: self.config.step_down_seconds,
            force: true,
        };
        // The command usually severs the connection as a side effect of the
        // leader stepping down, so an error here is the expected outcome.
        match self.store.run_admin(&group.primary, command) {
            Ok(()) => info!(group = %group.id, "step-down returned without error"),
            Err(err) => warn!(group = %group.id, %err, "step-down severed the connection"),
        }

        if !self.config.quiesce.is_zero() {
            std::thread::sleep(self.config.quiesce);
        }

        self.store.clear(note_id)?;
        Ok(())
    }
}

/// Drives disruptive administrative operations against the cluster.
pub struct ChaosDriver<S: AdminClient + CoordinationLog> {
    scheduler: Scheduler<ChaosState<S>>,
    state: ChaosState<S>,
    rng: StdRng,
}

impl<S: AdminClient + CoordinationLog> ChaosDriver<S> {
    pub fn new(store: S, config: ChaosConfig) -> Result<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut scheduler: Scheduler<ChaosState<S>> = Scheduler::new(config.report_every);
        scheduler.register(
            "flush_routing_cache",
            config.weights.flush_routing_cache,
            Box::new(|state, rng| state.flush_routing_cache(rng)),
        );
        scheduler.register(
            "force_leader_change",
            config.weights.force_leader_change,
            Box::new(|state, rng| state.force_leader_change(rng)),
        );

        Ok(Self {
            scheduler,
            state: ChaosState { store, config },
            rng,
        })
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

    /// Per-operation invocation counts, in registration order.
    pub fn op_counts(&self) -> Vec<(&'static str, u64)> {
        self.scheduler.counts()
    }

    pub fn ticks(&self) -> u64 {
        self.scheduler.ticks()
    }
}
