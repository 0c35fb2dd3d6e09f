use crate::model::{Node, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Staleness threshold for contact and work evidence.
pub const EXPIRY_SECS: f64 = 600.0;

/// Which update channel currently owns the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    Polling,
    Streaming,
}

impl ConnectionMode {
    pub fn is_streaming(self) -> bool {
        matches!(self, ConnectionMode::Streaming)
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionMode::Polling => "polling",
            ConnectionMode::Streaming => "streaming",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Missing,
    NotResponding,
    ExtendedIdle,
    Online,
    Working,
}

impl NodeStatus {
    pub const ALL: [NodeStatus; 5] = [
        NodeStatus::Working,
        NodeStatus::Missing,
        NodeStatus::NotResponding,
        NodeStatus::ExtendedIdle,
        NodeStatus::Online,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Missing => "missing",
            NodeStatus::NotResponding => "notresponding",
            NodeStatus::ExtendedIdle => "extendedidle",
            NodeStatus::Online => "online",
            NodeStatus::Working => "working",
        }
    }

    /// Human-facing name shown in listings.
    pub fn label(&self) -> &'static str {
        match self {
            NodeStatus::Missing => "Offline",
            NodeStatus::NotResponding => "Not responding",
            NodeStatus::ExtendedIdle => "Does not compute",
            NodeStatus::Online => "Ready",
            NodeStatus::Working => "Computing",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "missing" => Ok(NodeStatus::Missing),
            "notresponding" | "not-responding" | "not_responding" => Ok(NodeStatus::NotResponding),
            "extendedidle" | "extended-idle" | "extended_idle" => Ok(NodeStatus::ExtendedIdle),
            "online" => Ok(NodeStatus::Online),
            "working" => Ok(NodeStatus::Working),
            other => Err(format!("Unknown status: {other}")),
        }
    }
}

fn expired(evidence: Option<Timestamp>, now: Timestamp) -> bool {
    evidence.is_some_and(|at| now - at > EXPIRY_SECS)
}

/// Classify a node from its stored evidence. First matching rule wins.
///
/// Without a stream, silence is the only sign of a dead node, so contact
/// age is checked; with one, loss of contact arrives as an explicit delete.
/// A polled node that is neither stale nor idle-for-long is presumed to be
/// working, whatever its `assigned` count says.
pub fn derive_status(node: Option<&Node>, mode: ConnectionMode, now: Timestamp) -> NodeStatus {
    let Some(node) = node else {
        return NodeStatus::Missing;
    };
    if !mode.is_streaming() && expired(node.seen, now) {
        return NodeStatus::NotResponding;
    }
    if expired(node.seenwork, now) {
        return NodeStatus::ExtendedIdle;
    }
    if mode.is_streaming() && node.assigned == 0 {
        return NodeStatus::Online;
    }
    NodeStatus::Working
}
