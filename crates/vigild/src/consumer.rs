//! Consumer side of the pipeline: status reporting and frame snapshots.

use crate::engine::{FrameMailbox, Notification};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use vigil_core::{Status, ThreatLevel};
use vigil_hw::Frame;

/// Minimum spacing between snapshot writes.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

/// Drain notifications until every sender is gone.
///
/// Status changes log at info, steady state at debug. When `snapshot_path`
/// is set, the latest published frame is written there as PNG at most once
/// per [`SNAPSHOT_INTERVAL`].
pub async fn run(
    mut rx: mpsc::Receiver<Notification>,
    mailbox: Arc<FrameMailbox>,
    snapshot_path: Option<PathBuf>,
) {
    let mut last: Option<(Status, ThreatLevel)> = None;
    let mut last_snapshot: Option<Instant> = None;

    while let Some(note) = rx.recv().await {
        let current = (note.status(), note.threat_level());
        if last != Some(current) {
            tracing::info!(
                camera = note.camera_index,
                status = %current.0,
                threat = %current.1,
                gaze = note.gaze_summary(),
                fps = note.fps,
                "status changed"
            );
            last = Some(current);
        } else {
            tracing::debug!(
                status = %current.0,
                gaze = note.gaze_summary(),
                fps = note.fps,
                face = note.face_detected(),
                "frame"
            );
        }

        let Some(path) = snapshot_path.as_ref() else {
            continue;
        };
        if last_snapshot.is_some_and(|t| t.elapsed() < SNAPSHOT_INTERVAL) {
            continue;
        }
        last_snapshot = Some(Instant::now());

        // The mailbox may already hold a newer frame than the notification.
        let snapshot = match mailbox.latest() {
            Ok(snapshot) => snapshot,
            Err(_) => Arc::clone(&note.snapshot),
        };
        let path = path.clone();
        let written =
            tokio::task::spawn_blocking(move || write_snapshot(&snapshot.frame, &path)).await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "snapshot write failed"),
            Err(e) => tracing::warn!(error = %e, "snapshot task failed"),
        }
    }

    tracing::debug!("consumer exiting");
}

/// Write an RGB8 frame as PNG.
pub fn write_snapshot(frame: &Frame, path: &Path) -> Result<()> {
    let image = image::RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
        .context("frame buffer does not match its dimensions")?;
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
