//! Landmark provider seam.
//!
//! Landmark detection runs outside this process. Every processed frame is
//! handed to a provider, which answers with zero or one face mesh for that
//! frame.
//!
//! The production provider is a sidecar child process. Per frame it receives
//! a header line `"<width> <height> <sequence>\n"` on stdin followed by
//! `width * height * 3` bytes of packed RGB8, and must answer with one JSON
//! line on stdout:
//!
//! ```text
//! {"sequence": 42, "landmarks": null}
//! {"sequence": 43, "landmarks": [{"x": 0.41, "y": 0.37, "z": -0.01}, ...]}
//! ```
//!
//! A reply whose `sequence` is not the one just sent is rejected, so a mesh is
//! never paired with a frame it was not computed from.

use serde::Deserialize;
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use thiserror::Error;
use vigil_core::{mesh_from_points, LandmarkError, LandmarkFrame, LandmarkPoint};
use vigil_hw::Frame;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("landmark sidecar I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Record(#[from] LandmarkError),
    #[error("landmark sidecar closed its output")]
    Closed,
    #[error("landmark reply for frame {received}, expected frame {sent}")]
    OutOfSync { sent: u32, received: u32 },
}

/// Produces a face mesh for a frame. `Ok(None)` means no face was found.
pub trait LandmarkProvider: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkFrame>, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct Reply {
    sequence: u32,
    #[serde(default)]
    landmarks: Option<Vec<LandmarkPoint>>,
}

/// Request/reply framing over any byte pipe pair.
pub struct FrameLink<W, R> {
    writer: W,
    reader: R,
    line: String,
    closed: bool,
}

impl<W: Write, R: BufRead> FrameLink<W, R> {
    pub fn new(writer: W, reader: R) -> Self {
        Self {
            writer,
            reader,
            line: String::new(),
            closed: false,
        }
    }

    fn send(&mut self, frame: &Frame) -> io::Result<()> {
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.data.len() != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame has {} bytes, expected {expected}", frame.data.len()),
            ));
        }
        writeln!(self.writer, "{} {} {}", frame.width, frame.height, frame.sequence)?;
        self.writer.write_all(&frame.data)?;
        self.writer.flush()
    }

    fn receive(&mut self, sent: u32) -> Result<Option<LandmarkFrame>, ProviderError> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            self.closed = true;
            tracing::warn!("landmark sidecar closed its output; no further faces");
            return Err(ProviderError::Closed);
        }
        let reply: Reply = serde_json::from_str(self.line.trim())
            .map_err(|e| LandmarkError::Malformed(e.to_string()))?;
        if reply.sequence != sent {
            return Err(ProviderError::OutOfSync {
                sent,
                received: reply.sequence,
            });
        }
        Ok(mesh_from_points(reply.landmarks)?)
    }
}

impl<W: Write + Send, R: BufRead + Send> LandmarkProvider for FrameLink<W, R> {
    fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkFrame>, ProviderError> {
        if self.closed {
            return Err(ProviderError::Closed);
        }
        self.send(frame)?;
        self.receive(frame.sequence)
    }
}

/// Landmark model running as a child process, fed frames over its stdin.
pub struct SidecarProvider {
    child: Child,
    link: FrameLink<ChildStdin, BufReader<ChildStdout>>,
}

impl SidecarProvider {
    /// Spawn `command` with piped stdin/stdout. Its stderr is inherited.
    pub fn spawn(mut command: Command) -> io::Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            // Unreachable with piped stdio, but never leave a child behind.
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::other("sidecar pipes unavailable"));
        };
        tracing::info!(pid = child.id(), "landmark sidecar started");
        Ok(Self {
            child,
            link: FrameLink::new(stdin, BufReader::new(stdout)),
        })
    }
}

impl LandmarkProvider for SidecarProvider {
    fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkFrame>, ProviderError> {
        self.link.detect(frame)
    }
}

impl Drop for SidecarProvider {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!(error = %e, "landmark sidecar already exited");
        }
        match self.child.wait() {
            Ok(status) => tracing::info!(%status, "landmark sidecar stopped"),
            Err(e) => tracing::warn!(error = %e, "failed to reap landmark sidecar"),
        }
    }
}

/// Start the sidecar named by `argv` (program followed by its arguments).
pub fn open_sidecar(argv: &[String]) -> io::Result<Box<dyn LandmarkProvider>> {
    let Some((program, args)) = argv.split_first() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty landmark command",
        ));
    };
    let mut command = Command::new(program);
    command.args(args);
    Ok(Box::new(SidecarProvider::spawn(command)?))
}
