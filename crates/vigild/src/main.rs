use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use vigil_hw::{ConsoleBeeper, V4lBackend};

mod alert;
mod config;
mod consumer;
mod engine;
mod provider;

use alert::AlertDispatcher;
use engine::{Monitor, MonitorState, Notification};

/// Notifications buffered for the consumer before the producer starts dropping them.
const NOTIFY_QUEUE_DEPTH: usize = 4;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("vigild starting");

    let config = config::Config::from_env()?;
    tracing::info!(
        camera = config.monitor.camera_index,
        target_fps = config.monitor.target_fps,
        sidecar = ?config.landmark_command,
        "configuration loaded"
    );

    let provider = provider::open_sidecar(&config.landmark_command).with_context(|| {
        format!("failed to start landmark sidecar {:?}", config.landmark_command)
    })?;
    let alerts = AlertDispatcher::spawn(
        Box::new(ConsoleBeeper::new(config.beep_device.clone())),
        config.monitor.alert_base(),
    )
    .context("failed to spawn alert thread")?;

    let (tx, rx) = mpsc::channel::<Notification>(NOTIFY_QUEUE_DEPTH);
    let observer = move |note: Notification| {
        if tx.try_send(note).is_err() {
            tracing::trace!("consumer busy; notification dropped");
        }
    };

    let mut monitor = Monitor::new(
        config.monitor.clone(),
        Arc::new(V4lBackend),
        provider,
        alerts,
        Arc::new(observer),
    );

    let consumer = tokio::spawn(consumer::run(
        rx,
        monitor.mailbox(),
        config.snapshot_path.clone(),
    ));

    // A missing camera is not fatal; SIGUSR1 can cycle to another one.
    if let Err(e) = monitor.start() {
        tracing::warn!(error = %e, "monitoring not started");
    }

    let stop = monitor.stop_handle();
    let mut cycle = signal(SignalKind::user_defined1()).context("failed to install SIGUSR1 handler")?;
    let mut toggle = signal(SignalKind::user_defined2()).context("failed to install SIGUSR2 handler")?;

    tracing::info!("vigild ready");

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                // Let the producer wind down while we leave the loop.
                stop.stop();
                result?;
                break;
            }
            _ = cycle.recv() => {
                // Cycling joins the producer thread; keep it off the async workers.
                match tokio::task::block_in_place(|| monitor.cycle_camera()) {
                    Ok(index) => tracing::info!(camera = index, "now using camera"),
                    Err(e) => tracing::warn!(error = %e, "camera cycle failed"),
                }
            }
            _ = toggle.recv() => {
                tokio::task::block_in_place(|| match monitor.state() {
                    MonitorState::Running => {
                        tracing::info!(fps = monitor.fps(), "pausing monitoring");
                        monitor.stop();
                    }
                    MonitorState::Idle => {
                        if let Err(e) = monitor.start() {
                            tracing::warn!(error = %e, "monitoring not started");
                        }
                    }
                });
            }
        }
    }

    tracing::info!("vigild shutting down");
    tokio::task::block_in_place(|| monitor.stop());
    // Dropping the monitor drops the last notification sender.
    drop(monitor);
    consumer.await.context("consumer task failed")?;

    Ok(())
}
