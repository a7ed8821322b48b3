//! Output sink that plays nothing but drains at a real-time rate.
//!
//! Installed when no device could be opened so the driving loop keeps its
//! normal audio-clocked pacing.

use std::time::Instant;

use super::{AudioError, DeviceFormat, OutputDevice};

pub const SILENT_DEVICE_NAME: &str = "Silent";

pub struct SilentSink {
    format: DeviceFormat,
    queued_frames: f64,
    last_drain: Instant,
}

impl SilentSink {
    pub fn new(format: DeviceFormat) -> Self {
        Self {
            format,
            queued_frames: 0.0,
            last_drain: Instant::now(),
        }
    }

    fn drain(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_drain).as_secs_f64();
        self.last_drain = now;
        self.queued_frames = (self.queued_frames - elapsed * f64::from(self.format.sample_rate)).max(0.0);
    }
}

impl OutputDevice for SilentSink {
    fn name(&self) -> &str {
        SILENT_DEVICE_NAME
    }

    fn format(&self) -> DeviceFormat {
        self.format
    }

    fn queue(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        self.drain(Instant::now());
        self.queued_frames += (samples.len() / self.format.channels.max(1) as usize) as f64;
        Ok(())
    }

    fn queued_bytes(&mut self) -> usize {
        self.drain(Instant::now());
        self.queued_frames.ceil() as usize * self.format.frame_bytes()
    }

    fn clear(&mut self) {
        self.queued_frames = 0.0;
    }
}
