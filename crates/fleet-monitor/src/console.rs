use fleet_core::{
    EntityKind, FacilityMap, FleetEvent, FleetObserver, NodeStatus, Session, TimeSource,
};
use std::collections::BTreeSet;
use std::fmt::Write;
use tracing::info;

/// Collects notifications between two redraws of the console view.
#[derive(Debug, Default)]
pub struct ConsoleObserver {
    refresh_pending: bool,
    changed: BTreeSet<String>,
}

impl ConsoleObserver {
    /// True once after any bulk refresh.
    pub fn take_refresh(&mut self) -> bool {
        std::mem::take(&mut self.refresh_pending)
    }

    /// Node ids changed since the last call, in id order.
    pub fn take_changed(&mut self) -> Vec<String> {
        std::mem::take(&mut self.changed).into_iter().collect()
    }
}

impl FleetObserver for ConsoleObserver {
    fn notify(&mut self, event: FleetEvent) {
        match event {
            FleetEvent::EntityChanged {
                kind: EntityKind::Node,
                id,
            } => {
                if !self.refresh_pending {
                    self.changed.insert(id);
                }
            }
            FleetEvent::BulkRefresh => {
                self.refresh_pending = true;
                self.changed.clear();
            }
            FleetEvent::PlotSample {
                value,
                duration,
                node_id,
                ..
            } => info!(event = "throughput", node_id = %node_id, items_per_sec = value, duration_secs = duration),
            FleetEvent::Connection { state } => info!(event = "connection", state = ?state),
        }
    }
}

/// One line per node for a single change.
pub fn node_line<C, O>(session: &Session<C, O>, id: &str) -> String
where
    C: TimeSource,
    O: FleetObserver,
{
    let status = session.status(id);
    let Some(node) = session.store().node(id) else {
        return format!("{id:<16} {:<16} {:>7}  {}", "-", "-", status.label());
    };
    let mut line = format!(
        "{:<16} {:<16} {:>7}  {}",
        node.id,
        node.name,
        node.threads,
        status.label()
    );
    if let Some(load) = session.load(id) {
        let _ = write!(line, " ({:.0}% busy)", load * 100.0);
    }
    line
}

/// Full listing: every node, the fleet totals, then the per-room counts.
pub fn render_table<C, O>(session: &Session<C, O>, facility: &FacilityMap) -> String
where
    C: TimeSource,
    O: FleetObserver,
{
    let store = session.store();
    let mut out = String::new();
    let _ = writeln!(out, "{:<16} {:<16} {:>7}  STATUS", "NODE", "NAME", "THREADS");
    for id in store.node_ids() {
        let _ = writeln!(out, "{}", node_line(session, &id));
    }
    let _ = writeln!(
        out,
        "nodes: {}  threads: {}  workunits: {}  mode: {}",
        store.nodecount(),
        store.threadcount(),
        store.workunit_count(),
        session.mode()
    );
    for room in facility.summarize(store, session.mode(), session.now()) {
        let counts: Vec<String> = NodeStatus::ALL
            .iter()
            .filter(|status| room.count(**status) > 0)
            .map(|status| format!("{} {}", room.count(*status), status.label()))
            .collect();
        let _ = writeln!(out, "[{}] {}", room.name, counts.join(", "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{ManualClock, PlotGeometry, Room};

    fn session() -> Session<ManualClock, ConsoleObserver> {
        let mut session = Session::new(
            ManualClock::at(1_700_000_000.0),
            PlotGeometry::default(),
            ConsoleObserver::default(),
        );
        session.on_stream_open();
        session
    }

    #[test]
    fn bulk_refresh_supersedes_pending_node_changes() {
        let mut observer = ConsoleObserver::default();
        observer.notify(FleetEvent::node_changed("n2"));
        observer.notify(FleetEvent::node_changed("n1"));
        assert_eq!(observer.take_changed(), vec!["n1".to_string(), "n2".to_string()]);

        observer.notify(FleetEvent::node_changed("n3"));
        observer.notify(FleetEvent::BulkRefresh);
        observer.notify(FleetEvent::node_changed("n4"));
        assert!(observer.take_refresh());
        assert!(!observer.take_refresh());
        assert!(observer.take_changed().is_empty());
    }

    #[test]
    fn node_line_shows_load_while_streaming() {
        let mut session = session();
        session.on_stream_message("CREATE WORKER n1 {\"name\": \"alpha\", \"threads\": 4}");
        session.on_stream_message("CREATE WORKUNIT w1 {\"worker\": \"n1\"}");
        let line = node_line(&session, "n1");
        assert!(line.starts_with("n1"));
        assert!(line.contains("alpha"));
        assert!(line.ends_with("Computing (25% busy)"));
        assert!(node_line(&session, "n9").ends_with("Offline"));
    }

    #[test]
    fn table_shows_hyphenated_nodes_with_their_status() {
        let mut session = session();
        session.on_stream_message("CREATE WORKER rack-07 {\"threads\": 4}");
        session.on_stream_message("CREATE WORKUNIT w1 {\"worker\": \"rack-07\"}");
        let facility = FacilityMap::new(vec![Room {
            name: "cage".to_string(),
            nodes: vec!["rack-07".to_string()],
        }]);

        let table = render_table(&session, &facility);
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[1].starts_with("rack-07"));
        assert!(lines[1].ends_with("Computing (25% busy)"));
        assert_eq!(lines[3], "[cage] 1 Computing");
    }

    #[test]
    fn table_lists_nodes_totals_and_rooms() {
        let mut session = session();
        session.on_stream_message("CREATE WORKER n1 {\"threads\": 4}");
        session.on_stream_message("CREATE WORKER n2 {\"threads\": 2}");
        let facility = FacilityMap::new(vec![Room {
            name: "lab".to_string(),
            nodes: vec!["n1".to_string(), "n3".to_string()],
        }]);

        let table = render_table(&session, &facility);
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("NODE"));
        assert!(lines[1].starts_with("n1"));
        assert!(lines[2].starts_with("n2"));
        assert_eq!(lines[3], "nodes: 2  threads: 6  workunits: 0  mode: streaming");
        assert_eq!(lines[4], "[lab] 1 Offline, 1 Ready");
    }
}
