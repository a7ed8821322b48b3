//! Contract between the runtime and the emulation core.
//!
//! The core itself (CPU, PPU, APU) lives outside this crate. The runtime only
//! needs to hand it a joypad bitmask, ask it to run for a sample budget, and
//! occasionally reset it or move state blobs in and out.

use std::path::Path;

use crate::input::Joypad;

/// Native output rate of the core, in stereo samples per second.
pub const NATIVE_SAMPLE_RATE: u32 = 2_097_152;
/// Samples the core produces for one video frame.
pub const SAMPLES_PER_FRAME: u32 = 35_112;
/// Extra samples the core may overshoot a budget by before it yields.
pub const AUDIO_BUFFER_OVERHEAD: u32 = 2_064;
/// Channels in the native audio stream.
pub const NATIVE_CHANNELS: u16 = 2;

pub const VIDEO_WIDTH: usize = 160;
pub const VIDEO_HEIGHT: usize = 144;
/// Bytes per packed RGBA pixel.
pub const BYTES_PER_PIXEL: usize = 4;
pub const VIDEO_BUFFER_LEN: usize = VIDEO_WIDTH * VIDEO_HEIGHT * BYTES_PER_PIXEL;

/// Interleaved i16 capacity the audio buffer needs for one `run_for` call.
pub const AUDIO_BUFFER_LEN: usize =
    (SAMPLES_PER_FRAME + AUDIO_BUFFER_OVERHEAD) as usize * NATIVE_CHANNELS as usize;

/// Result of a single [`EmulationCore::run_for`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Stereo samples actually produced. May differ from the requested budget.
    pub samples_elapsed: u32,
    /// True when a video frame finished during this run.
    pub frame_completed: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    #[error("failed to load ROM: {0}")]
    LoadRom(String),
    #[error("failed to load BIOS: {0}")]
    LoadBios(String),
    #[error("state rejected by core")]
    StateRejected,
    #[error("{0}")]
    Other(String),
}

/// Narrow frame-advance contract implemented by the external core.
///
/// The core reads the joypad bitmask set by [`EmulationCore::set_joypad`]
/// whenever it polls input during the next `run_for` call.
pub trait EmulationCore: Send {
    /// Core revision shown next to the checksum after a reset.
    fn revision(&self) -> u32;

    fn load_rom(&mut self, path: &Path) -> Result<(), CoreError>;

    /// Hands a validated BIOS image to the core.
    fn load_bios(&mut self, image: &[u8]) -> Result<(), CoreError>;

    fn set_joypad(&mut self, joypad: Joypad);

    /// Runs until either a video frame completes or `sample_budget` samples
    /// have been produced. `video` receives packed RGBA pixels and `audio`
    /// interleaved stereo samples.
    fn run_for(&mut self, sample_budget: u32, video: &mut [u8], audio: &mut [i16]) -> RunOutcome;

    /// Performs the internal reset, keeping the machine silent for
    /// `stall_samples` afterwards.
    fn reset(&mut self, stall_samples: u32);

    /// Serializes the machine, embedding `preview` as the snapshot image.
    fn save_state(&mut self, preview: &[u8]) -> Result<Vec<u8>, CoreError>;

    /// Restores a machine from the full bytes of a quicksave file, header
    /// included, as produced by [`EmulationCore::save_state`].
    fn load_state(&mut self, state: &[u8]) -> Result<(), CoreError>;
}
