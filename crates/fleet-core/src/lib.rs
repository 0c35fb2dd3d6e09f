//! Live-status engine for a compute-worker fleet.
//!
//! Keeps an in-memory model of worker nodes and work units consistent under
//! two mutually exclusive update channels (polled snapshots and a pushed
//! delta stream), derives each node's operational status, and buffers a
//! sliding window of throughput samples for plotting. Presentation layers
//! consume [`FleetEvent`]s and read the [`FleetStore`]; nothing in this crate
//! performs I/O.

pub mod clock;
pub mod delta;
pub mod display;
pub mod events;
pub mod facility;
pub mod model;
pub mod plot;
pub mod session;
pub mod snapshot;
pub mod status;
pub mod store;
pub mod wire;

pub use clock::{ManualClock, SkewCorrector, SystemClock, TimeSource};
pub use delta::apply_delta;
pub use display::{load_fraction, node_key, resolve_node_id};
pub use events::{ConnectionState, EntityKind, FleetEvent, FleetObserver};
pub use facility::{FacilityMap, Room, RoomSummary};
pub use model::{Node, Timestamp, Workunit};
pub use plot::{PlotBuffer, PlotFrame, PlotGeometry, PlotSample, PlotSegment, PlotUpdate};
pub use session::{PollAction, Session};
pub use snapshot::{apply_snapshot, Snapshot, SnapshotError};
pub use status::{derive_status, ConnectionMode, NodeStatus, EXPIRY_SECS};
pub use store::FleetStore;
pub use wire::{parse_stream_line, ItemType, StreamLine, Verb, WireError};
