//! Non-blocking alert dispatch.
//!
//! The producer hands alert kinds to a bounded queue; a dedicated thread
//! turns them into tones. A full queue drops the alert, and a sink that
//! cannot play leaves the system silent. Neither ever reaches the producer.

use std::time::Duration;
use tokio::sync::mpsc;
use vigil_core::AlertKind;
use vigil_hw::{Tone, ToneSink};

/// Alerts waiting to be played before new ones are dropped.
const ALERT_QUEUE_DEPTH: usize = 8;

/// Map an alert kind to its tone. `None` for [`AlertKind::None`].
pub fn alert_tone(kind: AlertKind, base: Duration) -> Option<Tone> {
    match kind {
        AlertKind::None => None,
        AlertKind::Standard => Some(Tone::new(800, base)),
        AlertKind::Warning => Some(Tone::new(1200, base * 2)),
        AlertKind::Critical => Some(Tone::new(1500, base * 3)),
    }
}

/// Clone-safe handle to the alert thread.
#[derive(Clone)]
pub struct AlertDispatcher {
    tx: mpsc::Sender<Tone>,
    base: Duration,
}

impl AlertDispatcher {
    /// Spawn the alert thread around `sink`. The thread exits once every
    /// handle has been dropped.
    pub fn spawn(sink: Box<dyn ToneSink>, base: Duration) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::channel::<Tone>(ALERT_QUEUE_DEPTH);

        std::thread::Builder::new()
            .name("vigil-alerts".into())
            .spawn(move || {
                tracing::debug!("alert thread started");
                let mut silenced = false;
                while let Some(tone) = rx.blocking_recv() {
                    match sink.play(tone) {
                        Ok(()) => silenced = false,
                        Err(e) if !silenced => {
                            tracing::warn!(error = %e, "alert tone unavailable; continuing silently");
                            silenced = true;
                        }
                        Err(e) => tracing::debug!(error = %e, "alert tone unavailable"),
                    }
                }
                tracing::debug!("alert thread exiting");
            })?;

        Ok(Self { tx, base })
    }

    /// Queue the tone for `kind` without waiting.
    pub fn dispatch(&self, kind: AlertKind) {
        let Some(tone) = alert_tone(kind, self.base) else {
            return;
        };
        if let Err(e) = self.tx.try_send(tone) {
            tracing::trace!(%kind, error = %e, "alert dropped");
        }
    }
}
