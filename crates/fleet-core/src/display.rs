//! Small helpers shared by presentation consumers.

use crate::model::Node;
use crate::status::{ConnectionMode, NodeStatus};
use crate::store::FleetStore;

/// Node id carried by a presentation element id such as `listing-n1`.
///
/// Everything after the last `-` is the node id; an id without a `-` is
/// returned unchanged.
pub fn node_key(element_id: &str) -> &str {
    match element_id.rfind('-') {
        Some(idx) => &element_id[idx + 1..],
        None => element_id,
    }
}

/// Stored node id for `id`, which may be a node id or an element id.
///
/// A stored node id is used as is, so ids such as `rack-07` stay intact;
/// only ids the store does not hold are reduced with [`node_key`].
pub fn resolve_node_id<'a>(store: &FleetStore, id: &'a str) -> &'a str {
    if store.node(id).is_some() {
        id
    } else {
        node_key(id)
    }
}

/// Share of a working node's capacity in use, in `0.0..=1.0`.
///
/// Only meaningful while streaming, where `assigned` is tracked live.
pub fn load_fraction(node: &Node, status: NodeStatus, mode: ConnectionMode) -> Option<f64> {
    if !mode.is_streaming() || status != NodeStatus::Working || node.threads == 0 {
        return None;
    }
    let fraction = f64::from(node.assigned) / f64::from(node.threads);
    Some(fraction.clamp(0.0, 1.0))
}
