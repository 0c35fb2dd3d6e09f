use crate::model::{Node, Timestamp, Workunit};
use crate::status::{derive_status, ConnectionMode, NodeStatus};
use std::collections::HashMap;

/// Current nodes and work units, plus running aggregates.
///
/// Every mutation goes through this API so `threadcount` always equals the
/// sum of `threads` over the stored nodes. `nodecount` is the map size.
#[derive(Debug, Clone, Default)]
pub struct FleetStore {
    nodes: HashMap<String, Node>,
    workunits: HashMap<String, Workunit>,
    threadcount: u64,
}

impl FleetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn workunit(&self, id: &str) -> Option<&Workunit> {
        self.workunits.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn workunits(&self) -> impl Iterator<Item = &Workunit> {
        self.workunits.values()
    }

    /// Node ids in a stable order, for listings.
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn nodecount(&self) -> usize {
        self.nodes.len()
    }

    pub fn threadcount(&self) -> u64 {
        self.threadcount
    }

    pub fn workunit_count(&self) -> usize {
        self.workunits.len()
    }

    pub fn status(&self, id: &str, mode: ConnectionMode, now: Timestamp) -> NodeStatus {
        derive_status(self.nodes.get(id), mode, now)
    }

    /// Insert or replace a node; returns the previous record.
    pub fn upsert_node(&mut self, node: Node) -> Option<Node> {
        let previous = self.nodes.insert(node.id.clone(), node.clone());
        let old_threads = previous.as_ref().map(|prev| u64::from(prev.threads)).unwrap_or(0);
        self.threadcount = self.threadcount - old_threads + u64::from(node.threads);
        previous
    }

    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let removed = self.nodes.remove(id)?;
        self.threadcount -= u64::from(removed.threads);
        Some(removed)
    }

    /// Swap in a full node set. Work units are dropped with the old state.
    pub fn replace_nodes(&mut self, nodes: HashMap<String, Node>) {
        self.threadcount = nodes.values().map(|node| u64::from(node.threads)).sum();
        self.nodes = nodes;
        self.workunits.clear();
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.workunits.clear();
        self.threadcount = 0;
    }

    pub fn clear_workunits(&mut self) {
        self.workunits.clear();
    }

    pub fn upsert_workunit(&mut self, unit: Workunit) -> Option<Workunit> {
        self.workunits.insert(unit.id.clone(), unit)
    }

    pub fn remove_workunit(&mut self, id: &str) -> Option<Workunit> {
        self.workunits.remove(id)
    }

    /// Count one more active unit on `node_id`. False if the node is unknown.
    pub fn attach(&mut self, node_id: &str) -> bool {
        match self.nodes.get_mut(node_id) {
            Some(node) => {
                node.assigned = node.assigned.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Count one fewer active unit on `node_id`, never going below zero.
    pub fn detach(&mut self, node_id: &str) -> bool {
        match self.nodes.get_mut(node_id) {
            Some(node) => {
                if node.assigned == 0 {
                    tracing::debug!(event = "assigned_underflow", node_id);
                }
                node.assigned = node.assigned.saturating_sub(1);
                true
            }
            None => false,
        }
    }

    pub fn mark_work_seen(&mut self, node_id: &str, at: Timestamp) -> bool {
        match self.nodes.get_mut(node_id) {
            Some(node) => {
                node.seenwork = Some(at);
                true
            }
            None => false,
        }
    }
}
