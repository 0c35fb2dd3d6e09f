use crate::clock::{SkewCorrector, TimeSource};
use crate::events::{FleetEvent, FleetObserver};
use crate::model::{Node, Timestamp};
use crate::store::FleetStore;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot decode failed: {0}")]
    Decode(String),
    #[error("snapshot is not an object of node records")]
    NotAnObject,
    #[error("snapshot source failed: {0}")]
    Source(String),
}

/// A full point-in-time node listing from the polled source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub nodes: HashMap<String, Node>,
    /// Delivery time stamped by the server, if it sent one.
    pub server_time: Option<Timestamp>,
    /// Ids of records that could not be read and were left out.
    pub rejected: Vec<String>,
}

impl Snapshot {
    /// Decode a JSON object mapping node id to node record.
    pub fn from_json(body: &[u8], server_time: Option<Timestamp>) -> Result<Self, SnapshotError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|err| SnapshotError::Decode(err.to_string()))?;
        let Value::Object(records) = value else {
            return Err(SnapshotError::NotAnObject);
        };

        let mut nodes = HashMap::with_capacity(records.len());
        let mut rejected = Vec::new();
        for (id, record) in records {
            match serde_json::from_value::<Node>(record) {
                Ok(mut node) => {
                    node.id = id.clone();
                    nodes.insert(id, node);
                }
                Err(err) => {
                    tracing::warn!(event = "snapshot_record_rejected", node_id = %id, error = %err);
                    rejected.push(id);
                }
            }
        }
        Ok(Self {
            nodes,
            server_time,
            rejected,
        })
    }
}

/// Replace every node with the snapshot's, drop all work units, and adopt
/// the snapshot's clock reference.
pub fn apply_snapshot<C: TimeSource>(
    store: &mut FleetStore,
    clock: &mut SkewCorrector<C>,
    snapshot: Snapshot,
    observer: &mut dyn FleetObserver,
) {
    if let Some(server_time) = snapshot.server_time {
        clock.set_reference(server_time);
    }
    store.replace_nodes(snapshot.nodes);
    tracing::debug!(
        event = "snapshot_applied",
        nodecount = store.nodecount(),
        threadcount = store.threadcount(),
        rejected = snapshot.rejected.len()
    );
    observer.notify(FleetEvent::BulkRefresh);
}
