//! Audio pipeline: native-rate core output in, device-rate volume-scaled
//! samples out, with the device queue exposed as a pacing signal.

pub mod cpal_backend;
pub mod resampler;
pub mod silent;

use std::time::Duration;

use thiserror::Error;

pub use cpal_backend::CpalBackend;
pub use resampler::Resampler;
pub use silent::SilentSink;

use crate::emulator::{NATIVE_CHANNELS, NATIVE_SAMPLE_RATE};

/// Device name meaning "whatever the platform picks".
pub const DEFAULT_DEVICE_NAME: &str = "[System Default]";
/// Full-scale mixing level; a volume of 100 maps here.
pub const MIX_MAX_VOLUME: i32 = 128;
/// Accepted range for the backpressure target. Output queues are sized to
/// hold the upper bound plus a frame.
pub const MIN_BUFFER_TARGET: Duration = Duration::from_millis(1);
pub const MAX_BUFFER_TARGET: Duration = Duration::from_secs(2);
/// Format assumed by the silent fallback sink.
const FALLBACK_FORMAT: DeviceFormat = DeviceFormat {
    sample_rate: 48_000,
    channels: 2,
    sample_width: 2,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("failed to create resampler: {0}")]
    ResamplerCreationFailed(String),
    #[error("audio stream failed: {0}")]
    StreamFailed(String),
}

/// Negotiated output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Bytes per sample in the device's native encoding.
    pub sample_width: usize,
}

pub fn clamp_buffer_target(target: Duration) -> Duration {
    target.clamp(MIN_BUFFER_TARGET, MAX_BUFFER_TARGET)
}

impl DeviceFormat {
    pub fn frame_bytes(&self) -> usize {
        self.sample_width * self.channels as usize
    }

    /// Playback time represented by `bytes` of queued device data.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let frame_bytes = self.frame_bytes();
        if frame_bytes == 0 || self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = bytes / frame_bytes;
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate))
    }
}

/// An open playback queue.
///
/// `queue` takes interleaved samples already converted to the device's rate
/// and channel count.
pub trait OutputDevice {
    fn name(&self) -> &str;
    fn format(&self) -> DeviceFormat;
    fn queue(&mut self, samples: &[i16]) -> Result<(), AudioError>;
    /// Bytes queued but not yet played, in the device's native encoding.
    fn queued_bytes(&mut self) -> usize;
    fn clear(&mut self);
}

/// Platform audio layer able to enumerate and open output devices.
pub trait AudioBackend: Send {
    fn device_names(&self) -> Vec<String>;
    /// Opens the named device, or the platform default for `None`.
    fn open(&mut self, name: Option<&str>) -> Result<Box<dyn OutputDevice>, AudioError>;
}

/// Scales samples in place by a `[0, 100]` volume.
///
/// The volume maps linearly onto `[0, MIX_MAX_VOLUME]`; 100 leaves samples
/// untouched and 0 silences them.
pub fn apply_volume(samples: &mut [i16], volume: u8) {
    let mix = i32::from(volume.min(100)) * MIX_MAX_VOLUME / 100;
    if mix == MIX_MAX_VOLUME {
        return;
    }
    for s in samples {
        *s = (i32::from(*s) * mix / MIX_MAX_VOLUME).clamp(i16::MIN.into(), i16::MAX.into()) as i16;
    }
}

struct OpenOutput {
    device: Box<dyn OutputDevice>,
    resampler: Resampler,
    /// Opened through the platform default rather than by name.
    is_default: bool,
}

pub struct AudioPipeline {
    backend: Box<dyn AudioBackend>,
    output: Option<OpenOutput>,
    configured: bool,
    volume: u8,
    scratch: Vec<i16>,
}

impl AudioPipeline {
    /// Creates a pipeline with nothing open. Call [`AudioPipeline::open`]
    /// before queueing audio.
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend,
            output: None,
            configured: false,
            volume: 100,
            scratch: Vec::new(),
        }
    }

    pub fn device_names(&self) -> Vec<String> {
        self.backend.device_names()
    }

    /// Opens `name` (or the platform default) at `volume`.
    ///
    /// The sentinel [`DEFAULT_DEVICE_NAME`] and names not currently present
    /// both select the default device. Any open device is released first. On
    /// failure a silent sink paced at real time takes its place and the
    /// error is returned; the pipeline stays usable.
    pub fn open(&mut self, name: &str, volume: u8) -> Result<(), AudioError> {
        self.close();
        self.volume = volume.min(100);

        let requested = if name == DEFAULT_DEVICE_NAME || name.is_empty() {
            None
        } else if self.backend.device_names().iter().any(|n| n == name) {
            Some(name)
        } else {
            tracing::warn!("Audio device {:?} not found, using the default device", name);
            None
        };

        let opened = self.backend.open(requested).and_then(|device| {
            let format = device.format();
            let resampler = Resampler::new(
                NATIVE_SAMPLE_RATE,
                NATIVE_CHANNELS,
                format.sample_rate,
                format.channels,
            )?;
            Ok(OpenOutput {
                device,
                resampler,
                is_default: requested.is_none(),
            })
        });

        match opened {
            Ok(output) => {
                tracing::info!(device = output.device.name(), "audio device opened");
                self.output = Some(output);
                self.configured = true;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Audio unavailable, continuing silently: {}", e);
                self.install_silent_sink();
                Err(e)
            }
        }
    }

    fn install_silent_sink(&mut self) {
        self.configured = false;
        self.output = Resampler::new(
            NATIVE_SAMPLE_RATE,
            NATIVE_CHANNELS,
            FALLBACK_FORMAT.sample_rate,
            FALLBACK_FORMAT.channels,
        )
        .ok()
        .map(|resampler| OpenOutput {
            device: Box::new(SilentSink::new(FALLBACK_FORMAT)),
            resampler,
            is_default: false,
        });
    }

    /// Releases the current device, if any.
    pub fn close(&mut self) {
        if let Some(mut output) = self.output.take() {
            output.device.clear();
            tracing::debug!(device = output.device.name(), "audio device closed");
        }
        self.configured = false;
    }

    /// Feeds one frame of interleaved native-rate stereo samples.
    pub fn queue(&mut self, native: &[i16]) -> Result<(), AudioError> {
        let Some(output) = self.output.as_mut() else {
            return Ok(());
        };

        output.resampler.put(native);
        if output.resampler.available() == 0 {
            return Ok(());
        }

        self.scratch.clear();
        output.resampler.get(&mut self.scratch);
        apply_volume(&mut self.scratch, self.volume);
        output.device.queue(&self.scratch)
    }

    /// Buffered but unplayed audio.
    pub fn queued_duration(&mut self) -> Duration {
        match self.output.as_mut() {
            Some(output) => {
                let bytes = output.device.queued_bytes();
                output.device.format().duration_of(bytes)
            }
            None => Duration::ZERO,
        }
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Drops everything queued on the device and in the resampler.
    pub fn clear(&mut self) {
        if let Some(output) = self.output.as_mut() {
            output.resampler.clear();
            output.device.clear();
        }
    }

    /// Name to persist for the device in use: the requested name, or
    /// [`DEFAULT_DEVICE_NAME`] when the default was opened. `None` while
    /// unconfigured.
    pub fn opened_device_name(&self) -> Option<&str> {
        self.output
            .as_ref()
            .filter(|_| self.configured)
            .map(|o| {
                if o.is_default {
                    DEFAULT_DEVICE_NAME
                } else {
                    o.device.name()
                }
            })
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn format(&self) -> Option<DeviceFormat> {
        self.output.as_ref().map(|o| o.device.format())
    }
}
