use crate::model::Timestamp;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Node,
}

/// Health of the update channel, for connection indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Streaming,
    /// The stream reported an error; it may still recover on its own.
    Degraded,
    Polling,
}

/// Notifications for presentation consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetEvent {
    /// Re-derive and redisplay this one entity (it may have been removed).
    EntityChanged { kind: EntityKind, id: String },
    /// Re-derive everything and drop displayed entities no longer stored.
    BulkRefresh,
    /// A finished work unit yielded a throughput sample.
    PlotSample {
        at: Timestamp,
        value: f64,
        duration: f64,
        node_id: String,
    },
    Connection { state: ConnectionState },
}

impl FleetEvent {
    pub fn node_changed(id: impl Into<String>) -> Self {
        FleetEvent::EntityChanged {
            kind: EntityKind::Node,
            id: id.into(),
        }
    }

    pub fn connection(state: ConnectionState) -> Self {
        FleetEvent::Connection { state }
    }
}

/// Receives notifications synchronously, in mutation order.
pub trait FleetObserver {
    fn notify(&mut self, event: FleetEvent);
}

impl FleetObserver for Vec<FleetEvent> {
    fn notify(&mut self, event: FleetEvent) {
        self.push(event);
    }
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl FleetObserver for NullObserver {
    fn notify(&mut self, _event: FleetEvent) {}
}
