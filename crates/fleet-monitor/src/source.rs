use chrono::Utc;
use fleet_core::{Snapshot, SnapshotError};
use std::path::Path;

/// Read the polled node listing.
///
/// The file lives on this host, so its delivery time is the local clock at
/// the moment the read completes.
pub async fn fetch_snapshot(path: &Path) -> Result<Snapshot, SnapshotError> {
    let body = tokio::fs::read(path)
        .await
        .map_err(|err| SnapshotError::Source(format!("{}: {err}", path.display())))?;
    let delivered_at = Utc::now().timestamp_millis() as f64 / 1000.0;
    Snapshot::from_json(&body, Some(delivered_at))
}
