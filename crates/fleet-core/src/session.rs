use crate::clock::{SkewCorrector, TimeSource};
use crate::delta::apply_delta;
use crate::display::{load_fraction, resolve_node_id};
use crate::events::{ConnectionState, FleetEvent, FleetObserver};
use crate::model::Timestamp;
use crate::plot::{PlotBuffer, PlotFrame, PlotGeometry, PlotUpdate};
use crate::snapshot::{self, Snapshot, SnapshotError};
use crate::status::{ConnectionMode, NodeStatus};
use crate::store::FleetStore;
use crate::wire::{parse_stream_line, StreamLine};

/// What the driver should do on a poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    /// Fetch a snapshot and hand it to [`Session::apply_snapshot`].
    Fetch,
    /// The stream is live; statuses were re-evaluated, nothing to fetch.
    RefreshOnly,
}

/// One live view of the fleet: the store, the corrected clock, the active
/// update channel and the throughput plot, plus the consumer notified of
/// every change.
///
/// All handlers run to completion and never return errors; bad input is
/// logged and dropped.
pub struct Session<C, O> {
    store: FleetStore,
    clock: SkewCorrector<C>,
    mode: ConnectionMode,
    connection: ConnectionState,
    plot: PlotBuffer,
    observer: O,
}

impl<C: TimeSource, O: FleetObserver> Session<C, O> {
    /// Starts in polling mode with an empty store and a stopped plot.
    pub fn new(clock: C, geometry: PlotGeometry, observer: O) -> Self {
        Self {
            store: FleetStore::new(),
            clock: SkewCorrector::new(clock),
            mode: ConnectionMode::Polling,
            connection: ConnectionState::Polling,
            plot: PlotBuffer::new(geometry),
            observer,
        }
    }

    pub fn store(&self) -> &FleetStore {
        &self.store
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn clock(&self) -> &SkewCorrector<C> {
        &self.clock
    }

    pub fn plot(&self) -> &PlotBuffer {
        &self.plot
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn now(&self) -> Timestamp {
        self.clock.corrected_now()
    }

    fn set_connection(&mut self, state: ConnectionState) {
        if self.connection != state {
            tracing::info!(event = "connection_state", from = ?self.connection, to = ?state);
            self.connection = state;
            self.observer.notify(FleetEvent::connection(state));
        }
    }

    /// A stream connection attempt is under way.
    pub fn on_stream_connecting(&mut self) {
        self.set_connection(ConnectionState::Connecting);
    }

    /// The stream is open: it now owns the store, which restarts empty.
    pub fn on_stream_open(&mut self) {
        self.mode = ConnectionMode::Streaming;
        self.store.clear();
        self.clock.reset();
        self.observer.notify(FleetEvent::BulkRefresh);
        self.set_connection(ConnectionState::Streaming);
    }

    /// Handle one stream message. Returns the plot change when the message
    /// completed a timed work unit while plotting.
    pub fn on_stream_message(&mut self, line: &str) -> Option<PlotUpdate> {
        if !self.mode.is_streaming() {
            tracing::debug!(event = "stream_message_while_polling");
            return None;
        }
        let parsed = match parse_stream_line(line) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::debug!(event = "stream_line_dropped", error = %err);
                return None;
            }
        };
        let message = match parsed {
            StreamLine::Date(server_now) => {
                self.clock.set_reference(server_now);
                return None;
            }
            StreamLine::Delta(message) => message,
        };
        let delta = match message.decode() {
            Ok(delta) => delta,
            Err(err) => {
                tracing::debug!(
                    event = "stream_payload_dropped",
                    verb = %message.verb,
                    item_type = %message.item_type,
                    id = %message.id,
                    error = %err
                );
                return None;
            }
        };
        if self.connection == ConnectionState::Degraded {
            self.set_connection(ConnectionState::Streaming);
        }
        let now = self.now();
        let sample = apply_delta(&mut self.store, delta, now, &mut self.observer)?;
        Some(self.plot.record(sample))
    }

    /// The stream reported an error. Every error is reported as degraded.
    /// While the stream is still retrying nothing else changes; otherwise the
    /// session falls back to polling and the driver should fetch a snapshot.
    pub fn on_stream_error(&mut self, recovering: bool) -> Option<PollAction> {
        self.set_connection(ConnectionState::Degraded);
        if !self.mode.is_streaming() {
            // Never opened: nothing to tear down, polling carries on.
            tracing::debug!(event = "stream_error_while_polling", recovering);
            if recovering {
                return None;
            }
            self.set_connection(ConnectionState::Polling);
            return Some(PollAction::Fetch);
        }
        if recovering {
            tracing::warn!(event = "stream_degraded");
            return None;
        }
        tracing::warn!(event = "stream_abandoned");
        Some(self.disconnect())
    }

    /// Leave streaming mode. Work units are stream-only and are dropped, and
    /// the plot stops.
    pub fn disconnect(&mut self) -> PollAction {
        if self.mode.is_streaming() {
            self.mode = ConnectionMode::Polling;
            self.store.clear_workunits();
            self.plot.stop();
            self.observer.notify(FleetEvent::BulkRefresh);
        }
        self.set_connection(ConnectionState::Polling);
        PollAction::Fetch
    }

    pub fn on_poll_tick(&mut self) -> PollAction {
        match self.mode {
            ConnectionMode::Streaming => {
                // Nothing new arrives, but seen/seenwork may have expired.
                self.observer.notify(FleetEvent::BulkRefresh);
                PollAction::RefreshOnly
            }
            ConnectionMode::Polling => PollAction::Fetch,
        }
    }

    /// Replace the store from a polled snapshot. Ignored while streaming,
    /// since the stream owns the store then.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        if self.mode.is_streaming() {
            tracing::debug!(event = "snapshot_ignored_while_streaming");
            return;
        }
        snapshot::apply_snapshot(&mut self.store, &mut self.clock, snapshot, &mut self.observer);
        self.set_connection(ConnectionState::Polling);
    }

    /// A fetch failed; keep the current state until the next tick.
    pub fn on_snapshot_error(&mut self, err: &SnapshotError) {
        tracing::warn!(event = "snapshot_failed", error = %err);
    }

    /// Start plotting. Only possible while streaming.
    pub fn plot_start(&mut self) -> bool {
        if !self.mode.is_streaming() {
            return false;
        }
        let now = self.now();
        self.plot.start(now);
        true
    }

    pub fn plot_stop(&mut self) {
        self.plot.stop();
    }

    /// Periodic plot tick; returns how many pixels to scroll.
    pub fn plot_tick(&mut self) -> u32 {
        let now = self.now();
        self.plot.slide(now)
    }

    pub fn plot_frame(&mut self) -> PlotFrame {
        let now = self.now();
        self.plot.frame(now)
    }

    /// Status of a node, by node id or element id.
    pub fn status(&self, id: &str) -> NodeStatus {
        let key = resolve_node_id(&self.store, id);
        self.store.status(key, self.mode, self.now())
    }

    /// Busy share of a working node while streaming.
    pub fn load(&self, id: &str) -> Option<f64> {
        let key = resolve_node_id(&self.store, id);
        let node = self.store.node(key)?;
        load_fraction(node, self.store.status(key, self.mode, self.now()), self.mode)
    }
}
