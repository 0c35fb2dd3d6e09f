use crate::events::{FleetEvent, FleetObserver};
use crate::model::Timestamp;
use crate::plot::PlotSample;
use crate::store::FleetStore;
use crate::wire::{Delta, Verb, COMPLETION_MARKER};

/// Apply one decoded delta to the store.
///
/// Returns the throughput sample produced when a tracked work unit with a
/// recorded start leaves its worker; the caller feeds it to the plot.
/// CREATE is the only event that attaches a unit to its node, so replaying
/// a CREATE counts the unit twice.
pub fn apply_delta(
    store: &mut FleetStore,
    delta: Delta,
    now: Timestamp,
    observer: &mut dyn FleetObserver,
) -> Option<PlotSample> {
    match delta {
        Delta::UpsertWorker(node) => {
            let id = node.id.clone();
            let previous = store.upsert_node(node);
            tracing::debug!(
                event = "worker_upsert",
                node_id = %id,
                created = previous.is_none(),
                threadcount = store.threadcount()
            );
            observer.notify(FleetEvent::node_changed(id));
            None
        }
        Delta::DeleteWorker { id } => {
            // Units on this worker stay until the source deletes them.
            if store.remove_node(&id).is_none() {
                tracing::debug!(event = "worker_delete_unknown", node_id = %id);
            }
            observer.notify(FleetEvent::node_changed(id));
            None
        }
        Delta::UpsertWorkunit { verb, unit } => {
            let worker = unit.worker.clone();
            tracing::debug!(event = "workunit_upsert", workunit_id = %unit.id, verb = %verb);
            store.upsert_workunit(unit);
            // Consumers only hear about the node the unit runs on.
            if verb == Verb::Create {
                if let Some(worker) = worker {
                    if store.attach(&worker) {
                        observer.notify(FleetEvent::node_changed(worker));
                    }
                }
            }
            None
        }
        Delta::DeleteWorkunit { id, completion } => {
            let Some(unit) = store.remove_workunit(&id) else {
                tracing::debug!(event = "workunit_delete_unknown", workunit_id = %id);
                return None;
            };
            let worker = unit.worker.clone()?;

            if store.node(&worker).is_some() {
                if completion == COMPLETION_MARKER {
                    store.mark_work_seen(&worker, now);
                }
                store.detach(&worker);
                observer.notify(FleetEvent::node_changed(worker.clone()));
            }

            let start = unit.recorded_start()?;
            let nitems = unit.nitems?;
            let duration = now - start;
            if duration <= 0.0 {
                tracing::debug!(event = "throughput_skipped", workunit_id = %id, duration);
                return None;
            }
            let sample = PlotSample {
                at: now,
                value: nitems / duration,
                duration,
                node_id: worker,
            };
            observer.notify(FleetEvent::PlotSample {
                at: sample.at,
                value: sample.value,
                duration: sample.duration,
                node_id: sample.node_id.clone(),
            });
            Some(sample)
        }
    }
}
