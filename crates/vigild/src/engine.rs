//! Monitoring engine: camera session lifecycle and the capture/classify loop.
//!
//! The producer runs on a dedicated OS thread. It shares exactly one mutable
//! slot with the consumer, the [`FrameMailbox`], and polls a single atomic
//! running flag once per iteration. Stopping is cooperative: the in-flight
//! frame finishes, the next one never starts.

use crate::alert::AlertDispatcher;
use crate::config::MonitorConfig;
use crate::provider::LandmarkProvider;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use vigil_core::{Analyzer, ClassificationResult, LandmarkFrame, Status, ThreatLevel};
use vigil_hw::{CameraBackend, CameraError, CaptureDevice, Frame};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("monitor is already running")]
    AlreadyRunning,
    #[error("camera unavailable: {0}")]
    CameraUnavailable(#[from] CameraError),
    #[error("no frame has been produced yet")]
    NoFrameYet,
    #[error("failed to spawn producer thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
}

/// One processed frame and what was concluded from it.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub frame: Frame,
    pub result: ClassificationResult,
    pub face_detected: bool,
    /// Processed-frame counter for the session that produced it.
    pub sequence: u64,
}

/// Single-slot, last-write-wins mailbox between producer and consumer.
///
/// The lock covers only the pointer swap, so readers see either the old
/// snapshot or the new one, never a mix.
#[derive(Debug, Default)]
pub struct FrameMailbox {
    slot: Mutex<Option<Arc<FrameSnapshot>>>,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: Arc<FrameSnapshot>) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    pub fn latest(&self) -> Result<Arc<FrameSnapshot>, EngineError> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(EngineError::NoFrameYet)
    }
}

/// Sent to the consumer every `notify_stride` processed frames.
#[derive(Debug, Clone)]
pub struct Notification {
    pub snapshot: Arc<FrameSnapshot>,
    pub fps: u32,
    pub camera_index: u32,
}

impl Notification {
    pub fn face_detected(&self) -> bool {
        self.snapshot.face_detected
    }

    pub fn status(&self) -> Status {
        self.snapshot.result.status
    }

    pub fn threat_level(&self) -> ThreatLevel {
        self.snapshot.result.threat_level
    }

    pub fn gaze_summary(&self) -> &str {
        &self.snapshot.result.gaze_summary
    }
}

/// Receives notifications on the producer thread. Must hand off quickly.
pub trait FrameObserver: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<F> FrameObserver for F
where
    F: Fn(Notification) + Send + Sync,
{
    fn notify(&self, notification: Notification) {
        self(notification)
    }
}

/// Clears the running flag from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Skips frames that arrive sooner than `min_interval` after the last admitted one.
#[derive(Debug)]
struct FrameThrottle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl FrameThrottle {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}

/// Rolling frames-per-second estimate over fixed windows.
#[derive(Debug)]
struct FpsCounter {
    window: Duration,
    window_start: Option<Instant>,
    count: u32,
}

impl FpsCounter {
    fn new(window: Duration) -> Self {
        Self {
            window,
            window_start: None,
            count: 0,
        }
    }

    /// Count one frame. Returns the window's total when a window closes.
    fn tick(&mut self, now: Instant) -> Option<u32> {
        self.count += 1;
        let start = *self.window_start.get_or_insert(now);
        if now.saturating_duration_since(start) < self.window {
            return None;
        }
        let fps = self.count;
        self.count = 0;
        self.window_start = Some(now);
        Some(fps)
    }
}

/// Everything the producer thread owns for one session.
struct Producer {
    camera: Box<dyn CaptureDevice>,
    provider: Arc<Mutex<Box<dyn LandmarkProvider>>>,
    analyzer: Analyzer,
    alerts: AlertDispatcher,
    mailbox: Arc<FrameMailbox>,
    observer: Arc<dyn FrameObserver>,
    running: Arc<AtomicBool>,
    fps: Arc<AtomicU32>,
    throttle: FrameThrottle,
    fps_counter: FpsCounter,
    notify_stride: u64,
}

impl Producer {
    /// Run until stopped or the camera closes; hands the camera back for release.
    fn run(mut self) -> Box<dyn CaptureDevice> {
        let camera_index = self.camera.index();
        let mut processed: u64 = 0;
        tracing::info!(camera = camera_index, "producer started");

        while self.running.load(Ordering::Acquire) && self.camera.is_open() {
            let frame = match self.camera.read() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::trace!(error = %e, "frame read failed; skipping");
                    continue;
                }
            };

            let now = Instant::now();
            if !self.throttle.admit(now) {
                continue;
            }

            let landmarks = self.detect(&frame);
            let result = self.analyzer.analyze(landmarks.as_ref());
            self.alerts.dispatch(result.alert_kind);

            processed += 1;
            let snapshot = Arc::new(FrameSnapshot {
                frame,
                result,
                face_detected: landmarks.as_ref().is_some_and(LandmarkFrame::is_complete),
                sequence: processed,
            });
            self.mailbox.publish(Arc::clone(&snapshot));

            if let Some(fps) = self.fps_counter.tick(now) {
                self.fps.store(fps, Ordering::Relaxed);
                tracing::debug!(fps, "frame rate");
            }

            if processed % self.notify_stride == 0 {
                self.observer.notify(Notification {
                    snapshot,
                    fps: self.fps.load(Ordering::Relaxed),
                    camera_index,
                });
            }
        }

        if !self.camera.is_open() {
            tracing::warn!(camera = camera_index, "camera closed; producer exiting");
        }
        self.running.store(false, Ordering::Release);
        tracing::info!(camera = camera_index, processed, "producer exiting");
        self.camera
    }

    /// Ask the provider for a mesh. Provider failures count as no face.
    fn detect(&self, frame: &Frame) -> Option<LandmarkFrame> {
        let mut provider = self.provider.lock().unwrap_or_else(PoisonError::into_inner);
        match provider.detect(frame) {
            Ok(landmarks) => landmarks,
            Err(e) => {
                tracing::debug!(error = %e, "landmark provider failed; treating as no face");
                None
            }
        }
    }
}

/// Owns the camera session lifecycle: `Idle -> Running -> Idle`.
pub struct Monitor {
    config: MonitorConfig,
    backend: Arc<dyn CameraBackend>,
    provider: Arc<Mutex<Box<dyn LandmarkProvider>>>,
    alerts: AlertDispatcher,
    observer: Arc<dyn FrameObserver>,
    mailbox: Arc<FrameMailbox>,
    running: Arc<AtomicBool>,
    fps: Arc<AtomicU32>,
    device_index: u32,
    producer: Option<JoinHandle<Box<dyn CaptureDevice>>>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        backend: Arc<dyn CameraBackend>,
        provider: Box<dyn LandmarkProvider>,
        alerts: AlertDispatcher,
        observer: Arc<dyn FrameObserver>,
    ) -> Self {
        Self {
            device_index: config.camera_index,
            config,
            backend,
            provider: Arc::new(Mutex::new(provider)),
            alerts,
            observer,
            mailbox: Arc::new(FrameMailbox::new()),
            running: Arc::new(AtomicBool::new(false)),
            fps: Arc::new(AtomicU32::new(0)),
            producer: None,
        }
    }

    pub fn state(&self) -> MonitorState {
        if self.producer.is_some() && self.running.load(Ordering::Acquire) {
            MonitorState::Running
        } else {
            MonitorState::Idle
        }
    }

    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    /// Most recent FPS estimate; 0 while idle.
    pub fn fps(&self) -> u32 {
        self.fps.load(Ordering::Relaxed)
    }

    pub fn mailbox(&self) -> Arc<FrameMailbox> {
        Arc::clone(&self.mailbox)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Open the current camera and spawn the producer.
    ///
    /// A camera that fails to open leaves the monitor idle and usable.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.state() == MonitorState::Running {
            return Err(EngineError::AlreadyRunning);
        }
        // A producer that exited on its own (camera closed, external stop)
        // still holds the camera until joined.
        self.reap();

        let camera = self.backend.open(self.device_index).map_err(|e| {
            tracing::warn!(camera = self.device_index, error = %e, "camera unavailable");
            EngineError::CameraUnavailable(e)
        })?;

        let producer = Producer {
            camera,
            provider: Arc::clone(&self.provider),
            analyzer: Analyzer::new(self.config.detection),
            alerts: self.alerts.clone(),
            mailbox: Arc::clone(&self.mailbox),
            observer: Arc::clone(&self.observer),
            running: Arc::clone(&self.running),
            fps: Arc::clone(&self.fps),
            throttle: FrameThrottle::new(self.config.frame_interval()),
            fps_counter: FpsCounter::new(self.config.fps_window()),
            notify_stride: self.config.notify_stride.max(1),
        };

        self.running.store(true, Ordering::Release);
        let handle = std::thread::Builder::new()
            .name("vigil-producer".into())
            .spawn(move || producer.run())
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                EngineError::Spawn(e)
            })?;
        self.producer = Some(handle);

        tracing::info!(camera = self.device_index, "monitoring started");
        Ok(())
    }

    /// Stop the producer and release the camera. No-op when idle.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if self.reap() {
            tracing::info!(camera = self.device_index, "monitoring stopped");
        }
    }

    /// Move to the next camera that opens, restarting if we were running.
    ///
    /// Returns the new index. If nothing in range opens, the monitor is left
    /// idle on its previous index.
    pub fn cycle_camera(&mut self) -> Result<u32, EngineError> {
        let was_running = self.state() == MonitorState::Running;
        self.stop();

        let next = vigil_hw::probe(
            self.backend.as_ref(),
            self.device_index,
            self.config.probe_range,
        )
        .map_err(|e| {
            tracing::warn!(error = %e, "no camera available while cycling");
            EngineError::CameraUnavailable(e)
        })?;

        tracing::info!(from = self.device_index, to = next, "camera cycled");
        self.device_index = next;

        if was_running {
            self.start()?;
        }
        Ok(next)
    }

    /// Join an existing producer and release its camera. Returns whether
    /// there was one.
    fn reap(&mut self) -> bool {
        let Some(handle) = self.producer.take() else {
            return false;
        };
        match handle.join() {
            Ok(mut camera) => camera.release(),
            Err(_) => tracing::error!("producer thread panicked; camera dropped"),
        }
        self.fps.store(0, Ordering::Relaxed);
        true
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}
