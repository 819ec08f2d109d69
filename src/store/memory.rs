//! In-memory store implementing the data-plane, control-plane, and
//! coordination traits. Backs the integration tests and the soak binary;
//! handles clone-share one state so a driver and an observer can look at the
//! same cluster.

use super::{
    AdminClient, AdminCommand, CoordinationLog, DocumentStream, Endpoint, Notification,
    NotificationId, PartitionGroup, SortOrder, StoreClient,
};
use crate::error::{Error, Result};
use crate::keyspace::{ClientId, Document, Mutation, PointTarget, RangeQuery};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// How the in-memory cluster reacts to a step-down command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDownBehavior {
    /// Fail the command, emulating the severed connection a real leader
    /// election produces.
    SeverConnection,
    /// Acknowledge cleanly.
    Acknowledge,
}

#[derive(Default)]
struct MemoryState {
    documents: Vec<Document>,
    routers: Vec<Endpoint>,
    groups: Vec<PartitionGroup>,
    notifications: HashMap<NotificationId, Notification>,
    admin_journal: Vec<(Endpoint, AdminCommand)>,
    update_calls: u64,
    remove_calls: u64,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryState>>,
    step_down: StepDownBehavior,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryState::default())),
            step_down: StepDownBehavior::SeverConnection,
        }
    }

    /// A store with populated router and partition-group registries.
    pub fn with_cluster(routers: Vec<Endpoint>, groups: Vec<PartitionGroup>) -> Self {
        let store = Self::new();
        {
            let mut state = store.inner.write();
            state.routers = routers;
            state.groups = groups;
        }
        store
    }

    pub fn with_step_down_behavior(mut self, behavior: StepDownBehavior) -> Self {
        self.step_down = behavior;
        self
    }

    pub fn document_count(&self) -> usize {
        self.inner.read().documents.len()
    }

    /// Snapshot of all documents, in insertion order.
    pub fn documents(&self) -> Vec<Document> {
        self.inner.read().documents.clone()
    }

    /// Remove one client's document by exact value, bypassing the predicate
    /// path. Returns whether anything was removed.
    pub fn remove_value(&self, client_id: ClientId, value: i32) -> bool {
        let mut state = self.inner.write();
        let before = state.documents.len();
        state
            .documents
            .retain(|d| !(d.client_id == client_id && d.value == value));
        state.documents.len() != before
    }

    /// Every administrative command issued so far, in order.
    pub fn admin_journal(&self) -> Vec<(Endpoint, AdminCommand)> {
        self.inner.read().admin_journal.clone()
    }

    pub fn notification_count(&self) -> usize {
        self.inner.read().notifications.len()
    }

    pub fn update_calls(&self) -> u64 {
        self.inner.read().update_calls
    }

    pub fn remove_calls(&self) -> u64 {
        self.inner.read().remove_calls
    }
}

struct VecStream {
    docs: std::vec::IntoIter<Document>,
}

impl DocumentStream for VecStream {
    fn next(&mut self) -> Result<Option<Document>> {
        Ok(self.docs.next())
    }
}

impl StoreClient for MemoryStore {
    fn insert(&self, doc: Document) -> Result<()> {
        self.inner.write().documents.push(doc);
        Ok(())
    }

    fn update(&self, target: &PointTarget, mutation: Mutation) -> Result<()> {
        let mut state = self.inner.write();
        state.update_calls += 1;
        for doc in state.documents.iter_mut().filter(|d| target.matches(d)) {
            match mutation {
                Mutation::MarkUpdated => doc.updated = true,
            }
        }
        Ok(())
    }

    fn remove(&self, target: &PointTarget) -> Result<()> {
        let mut state = self.inner.write();
        state.remove_calls += 1;
        state.documents.retain(|d| !target.matches(d));
        Ok(())
    }

    fn find(&self, query: &RangeQuery, order: SortOrder) -> Result<Box<dyn DocumentStream>> {
        let mut matched: Vec<Document> = self
            .inner
            .read()
            .documents
            .iter()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();
        matched.sort_by_key(|d| d.value);
        if order == SortOrder::Descending {
            matched.reverse();
        }
        Ok(Box::new(VecStream {
            docs: matched.into_iter(),
        }))
    }
}

impl AdminClient for MemoryStore {
    fn list_routers(&self) -> Result<Vec<Endpoint>> {
        Ok(self.inner.read().routers.clone())
    }

    fn list_partition_groups(&self) -> Result<Vec<PartitionGroup>> {
        Ok(self.inner.read().groups.clone())
    }

    fn run_admin(&self, endpoint: &Endpoint, command: AdminCommand) -> Result<()> {
        self.inner
            .write()
            .admin_journal
            .push((endpoint.clone(), command));

        match command {
            AdminCommand::FlushRoutingCache => Ok(()),
            AdminCommand::StepDown { .. } => match self.step_down {
                StepDownBehavior::Acknowledge => Ok(()),
                StepDownBehavior::SeverConnection => Err(Error::Admin {
                    endpoint: endpoint.to_string(),
                    command: command.name().to_string(),
                    message: "connection reset by peer".to_string(),
                }),
            },
        }
    }
}

impl CoordinationLog for MemoryStore {
    fn append(&self, note: Notification) -> Result<()> {
        self.inner.write().notifications.insert(note.id, note);
        Ok(())
    }

    fn clear(&self, id: NotificationId) -> Result<()> {
        self.inner.write().notifications.remove(&id);
        Ok(())
    }
}
