//! Audible alert tones through the Linux console speaker.
//!
//! Issues `KDMKTONE` on a console device. The kernel starts the tone and
//! returns immediately; [`ConsoleBeeper::play`] then holds for the tone's
//! duration so back-to-back tones do not cut each other off.

use std::os::unix::io::AsRawFd;
use std::time::Duration;
use thiserror::Error;

/// `KDMKTONE` from `<linux/kd.h>`: start a tone for a given number of ticks.
const KDMKTONE: libc::c_ulong = 0x4B30;

/// PIT input clock; the tone period is expressed in ticks of this clock.
const CLOCK_TICK_RATE: u32 = 1_193_180;

/// Default console device for tone output.
pub const DEFAULT_BEEP_DEVICE: &str = "/dev/console";

/// A single tone: pitch and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration: Duration,
}

impl Tone {
    pub fn new(frequency_hz: u32, duration: Duration) -> Self {
        Self {
            frequency_hz,
            duration,
        }
    }
}

#[derive(Debug, Error)]
pub enum BeepError {
    #[error("frequency {0} Hz out of range")]
    InvalidFrequency(u32),
    #[error("failed to open tone device: {0}")]
    Open(std::io::Error),
    #[error("KDMKTONE ioctl failed: {0}")]
    Ioctl(std::io::Error),
}

/// Something that can play a tone. Implementations may block for the tone's
/// duration; callers run them off the hot path.
pub trait ToneSink: Send {
    fn play(&self, tone: Tone) -> Result<(), BeepError>;
}

/// Plays tones on a Linux virtual console.
#[derive(Debug, Clone)]
pub struct ConsoleBeeper {
    device_path: String,
}

impl ConsoleBeeper {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }

    /// Device path tones are sent to.
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

impl Default for ConsoleBeeper {
    fn default() -> Self {
        Self::new(DEFAULT_BEEP_DEVICE)
    }
}

impl ToneSink for ConsoleBeeper {
    fn play(&self, tone: Tone) -> Result<(), BeepError> {
        let arg = kdmktone_arg(tone)?;

        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(&self.device_path)
            .map_err(BeepError::Open)?;

        // SAFETY:
        // - fd is valid for the lifetime of `file`
        // - KDMKTONE takes its argument by value; no memory is shared with the kernel
        let ret = unsafe { libc::ioctl(file.as_raw_fd(), KDMKTONE, arg) };
        if ret < 0 {
            return Err(BeepError::Ioctl(std::io::Error::last_os_error()));
        }

        tracing::trace!(
            device = %self.device_path,
            frequency_hz = tone.frequency_hz,
            duration_ms = tone.duration.as_millis() as u64,
            "tone started"
        );
        std::thread::sleep(tone.duration);
        Ok(())
    }
}

/// Pack a tone into the `KDMKTONE` argument: duration (ms) in the high 16
/// bits, PIT divisor in the low 16 bits.
fn kdmktone_arg(tone: Tone) -> Result<libc::c_ulong, BeepError> {
    if tone.frequency_hz == 0 || tone.frequency_hz > CLOCK_TICK_RATE {
        return Err(BeepError::InvalidFrequency(tone.frequency_hz));
    }
    let divisor = (CLOCK_TICK_RATE / tone.frequency_hz).min(0xFFFF) as libc::c_ulong;
    let millis = tone.duration.as_millis().min(0xFFFF) as libc::c_ulong;
    Ok((millis << 16) | divisor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdmktone_arg_packing() {
        let arg = kdmktone_arg(Tone::new(800, Duration::from_millis(200))).unwrap();
        assert_eq!(arg >> 16, 200);
        assert_eq!(arg & 0xFFFF, 1491);
    }

    #[test]
    fn test_kdmktone_arg_clamps_duration() {
        let arg = kdmktone_arg(Tone::new(1500, Duration::from_secs(600))).unwrap();
        assert_eq!(arg >> 16, 0xFFFF);
    }

    #[test]
    fn test_zero_frequency_rejected() {
        assert!(matches!(
            kdmktone_arg(Tone::new(0, Duration::from_millis(10))),
            Err(BeepError::InvalidFrequency(0))
        ));
    }

    #[test]
    fn test_missing_device_reports_open_error() {
        let beeper = ConsoleBeeper::new("/nonexistent/vigil-console");
        let err = beeper
            .play(Tone::new(800, Duration::from_millis(1)))
            .unwrap_err();
        assert!(matches!(err, BeepError::Open(_)));
    }
}
