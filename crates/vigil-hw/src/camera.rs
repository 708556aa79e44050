//! Camera sessions: the capture seam, V4L2 capture via the `v4l` crate, and
//! device probing.

use crate::frame::{self, Frame};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
/// Upper bound on a single dequeue, so a stalled device cannot pin the producer.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);
/// Highest `/dev/videoN` index scanned by [`Camera::list_devices`].
const MAX_LISTED_DEVICES: u32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("device closed")]
    Closed,
    #[error("no camera opened in indices 0..{range} (starting after {start})")]
    NoDeviceInRange { start: u32, range: u32 },
}

/// An open capture session.
pub trait CaptureDevice: Send {
    /// Device index this session was opened with.
    fn index(&self) -> u32;
    /// Read one frame. Errors are per-frame; the session stays usable.
    fn read(&mut self) -> Result<Frame, CameraError>;
    fn is_open(&self) -> bool;
    /// Release the device. Further reads fail with [`CameraError::Closed`].
    fn release(&mut self);
}

/// Opens capture sessions by small integer index.
pub trait CameraBackend: Send + Sync {
    fn open(&self, index: u32) -> Result<Box<dyn CaptureDevice>, CameraError>;
}

/// Find the first index that opens, starting after `current` and wrapping
/// within `0..range`. Each candidate is opened once and released immediately.
pub fn probe(backend: &dyn CameraBackend, current: u32, range: u32) -> Result<u32, CameraError> {
    for offset in 0..range {
        let candidate = (current.wrapping_add(1).wrapping_add(offset)) % range;
        match backend.open(candidate) {
            Ok(mut device) => {
                device.release();
                tracing::debug!(index = candidate, "probe: camera available");
                return Ok(candidate);
            }
            Err(e) => {
                tracing::debug!(index = candidate, error = %e, "probe: camera unavailable");
            }
        }
    }
    Err(CameraError::NoDeviceInRange {
        start: current,
        range,
    })
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: u32,
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
}

/// [`CameraBackend`] for `/dev/videoN` devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct V4lBackend;

impl CameraBackend for V4lBackend {
    fn open(&self, index: u32) -> Result<Box<dyn CaptureDevice>, CameraError> {
        Ok(Box::new(Camera::open(index)?))
    }
}

/// V4L2 camera with a persistent mmap stream.
///
/// The stream holds its own handle to the device, so the session stays open
/// until [`CaptureDevice::release`] drops it.
pub struct Camera {
    stream: Option<MmapStream<'static>>,
    index: u32,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open `/dev/video{index}`, negotiate a format and start streaming.
    pub fn open(index: u32) -> Result<Self, CameraError> {
        let device_path = format!("/dev/video{index}");
        if !Path::new(&device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path));
        }

        let device = Device::with_path(&device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = %device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            return Err(CameraError::StreamingNotSupported);
        }

        // Ask for YUYV; accept GREY if that is all the driver offers.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = CAPTURE_WIDTH;
        fmt.height = CAPTURE_HEIGHT;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV or GREY)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        let mut stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;
        stream.set_timeout(DEQUEUE_TIMEOUT);

        Ok(Self {
            stream: Some(stream),
            index,
            width: negotiated.width,
            height: negotiated.height,
            device_path,
            fourcc,
            pixel_format,
        })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for index in 0..MAX_LISTED_DEVICES {
            let path = format!("/dev/video{index}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps
                .capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE)
            {
                continue;
            }
            devices.push(DeviceInfo {
                index,
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl CaptureDevice for Camera {
    fn index(&self) -> u32 {
        self.index
    }

    fn read(&mut self) -> Result<Frame, CameraError> {
        let stream = self.stream.as_mut().ok_or(CameraError::Closed)?;
        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        let sequence = meta.sequence;

        let data = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height),
            PixelFormat::Grey => frame::grey_to_rgb(buf, self.width, self.height),
        }
        .map_err(|e| CameraError::CaptureFailed(format!("pixel conversion failed: {e}")))?;

        Ok(Frame {
            data,
            width: self.width,
            height: self.height,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            tracing::info!(device = %self.device_path, "camera released");
        }
    }
}

impl std::fmt::Debug for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera")
            .field("device_path", &self.device_path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("fourcc", &self.fourcc)
            .field("open", &self.stream.is_some())
            .finish()
    }
}
