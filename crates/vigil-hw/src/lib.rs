//! vigil-hw — Hardware abstraction for camera capture and alert tones.
//!
//! Provides V4L2-based camera sessions behind a small capture trait, pixel
//! conversion to RGB8, and console-speaker tone output.

pub mod beeper;
pub mod camera;
pub mod frame;

pub use beeper::{BeepError, ConsoleBeeper, Tone, ToneSink};
pub use camera::{probe, CameraBackend, CameraError, CaptureDevice, V4lBackend};
pub use frame::Frame;
