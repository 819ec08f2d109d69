//! Client traits for the external store under test.
//!
//! The harness never speaks a wire protocol itself; it drives whatever client
//! these traits are implemented over. [`MemoryStore`] is the in-process
//! implementation used by the integration tests and the soak binary.

use crate::error::Result;
use crate::keyspace::{Document, Mutation, PointTarget, RangeQuery};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

pub mod memory;

pub use memory::{MemoryStore, StepDownBehavior};

/// Sort direction for [`StoreClient::find`], over the logical value field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Blocking cursor protocol over a result set. `Ok(None)` once exhausted.
pub trait DocumentStream {
    fn next(&mut self) -> Result<Option<Document>>;
}

/// Data-plane operations against the collection under test.
pub trait StoreClient {
    fn insert(&self, doc: Document) -> Result<()>;

    /// Apply `mutation` to every document matching `target`.
    fn update(&self, target: &PointTarget, mutation: Mutation) -> Result<()>;

    /// Remove every document matching `target`.
    fn remove(&self, target: &PointTarget) -> Result<()>;

    fn find(&self, query: &RangeQuery, order: SortOrder) -> Result<Box<dyn DocumentStream>>;
}

/// Network address of a cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint(pub String);

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One replicated partition group and its current leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionGroup {
    pub id: String,
    pub primary: Endpoint,
}

/// Administrative commands the chaos driver issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// Drop cached routing metadata on a routing-tier node.
    FlushRoutingCache,
    /// Ask the current leader of a partition group to step down.
    StepDown { seconds: u64, force: bool },
}

impl AdminCommand {
    pub fn name(&self) -> &'static str {
        match self {
            AdminCommand::FlushRoutingCache => "flush_routing_cache",
            AdminCommand::StepDown { .. } => "step_down",
        }
    }
}

/// Control-plane view of the cluster: registries plus the administrative
/// command channel.
pub trait AdminClient {
    /// All known routing-tier endpoints.
    fn list_routers(&self) -> Result<Vec<Endpoint>>;

    /// All known partition groups with their current primaries.
    fn list_partition_groups(&self) -> Result<Vec<PartitionGroup>>;

    /// Errors from [`AdminCommand::StepDown`] are an expected outcome of the
    /// command itself (the connection may be severed) and callers tolerate
    /// them; any other failure propagates.
    fn run_admin(&self, endpoint: &Endpoint, command: AdminCommand) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub u64);

/// Before/after record published around a disruptive action so concurrent
/// runs can see the disruption coming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub action: String,
    pub group: String,
    pub at: SystemTime,
}

/// Shared coordination collection: append and remove-by-id only.
pub trait CoordinationLog {
    fn append(&self, note: Notification) -> Result<()>;
    fn clear(&self, id: NotificationId) -> Result<()>;
}
