use crate::display::{node_key, resolve_node_id};
use crate::model::Timestamp;
use crate::status::{ConnectionMode, NodeStatus};
use crate::store::FleetStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A physical room and the nodes racked in it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Where each node lives, room by room, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityMap {
    #[serde(default)]
    rooms: Vec<Room>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    pub name: String,
    pub counts: HashMap<NodeStatus, usize>,
}

impl RoomSummary {
    pub fn count(&self, status: NodeStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

impl FacilityMap {
    pub fn new(rooms: Vec<Room>) -> Self {
        Self { rooms }
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Room holding `node`, which may be a node id or an element id.
    /// The first room listing the node wins; an exact id match is tried
    /// before the element id is reduced.
    pub fn room_of(&self, node: &str) -> Option<&str> {
        self.find_room(node)
            .or_else(|| self.find_room(node_key(node)))
            .map(|room| room.name.as_str())
    }

    fn find_room(&self, id: &str) -> Option<&Room> {
        self.rooms
            .iter()
            .find(|room| room.nodes.iter().any(|member| member == id))
    }

    /// Per-room status counts. Listed nodes the store does not know count
    /// as missing.
    pub fn summarize(
        &self,
        store: &FleetStore,
        mode: ConnectionMode,
        now: Timestamp,
    ) -> Vec<RoomSummary> {
        self.rooms
            .iter()
            .map(|room| {
                let mut counts = HashMap::new();
                for member in &room.nodes {
                    let status = store.status(resolve_node_id(store, member), mode, now);
                    *counts.entry(status).or_insert(0) += 1;
                }
                RoomSummary {
                    name: room.name.clone(),
                    counts,
                }
            })
            .collect()
    }
}
