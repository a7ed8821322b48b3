use std::{path::PathBuf, time::Duration};

use crate::audio::{AudioError, DEFAULT_DEVICE_NAME};
use crate::input::{BindingSet, InputEvent};
use crate::settings::Settings;

/// Capacity of the event hand-off queue between the pump and the loop.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bindings: BindingSet,
    pub audio_device_name: String,
    pub volume: u8,
    pub buffer_target: Duration,
    /// Carried through to [`Settings`] snapshots; gamepad selection happens
    /// in the event pump.
    pub joystick_name: String,
    /// Fixed seed for reset jitter. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
    /// Reject boot ROMs that are not the expected image.
    pub verify_bios: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl RuntimeConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            bindings: settings.bindings.clone(),
            audio_device_name: settings.audio_device_name.clone(),
            volume: settings.volume,
            buffer_target: settings.buffer_target(),
            joystick_name: settings.joystick_name.clone(),
            rng_seed: None,
            verify_bios: true,
        }
    }
}

/// Something the driving loop announces to the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeNotification {
    RomLoaded { title: String, checksum: String },
    SlotSelected { slot: u32 },
    StateSaved { slot: u32 },
    StateLoaded { slot: u32 },
    StateIoFailed { slot: u32, error: String },
    ResetCompleted { revision: u32, checksum: String },
    AudioInitFailed { error: String },
}

impl RuntimeNotification {
    /// Short status line shown over the game screen.
    pub fn message(&self) -> String {
        match self {
            RuntimeNotification::RomLoaded { title, .. } => title.clone(),
            RuntimeNotification::SlotSelected { slot } => format!("State {slot}"),
            RuntimeNotification::StateSaved { slot } => format!("State {slot} saved"),
            RuntimeNotification::StateLoaded { slot } => format!("State {slot} loaded"),
            RuntimeNotification::StateIoFailed { .. } => "Failure".to_string(),
            RuntimeNotification::ResetCompleted { revision, checksum } => {
                format!("Reset r{revision} {checksum}")
            }
            RuntimeNotification::AudioInitFailed { .. } => "Audio unavailable".to_string(),
        }
    }
}

/// Receives notifications from the runtime thread.
pub trait RuntimeEventSender: Send {
    /// Returns `false` once the receiving side has gone away.
    fn send(&self, notification: RuntimeNotification) -> bool;
}

impl RuntimeEventSender for crossbeam_channel::Sender<RuntimeNotification> {
    fn send(&self, notification: RuntimeNotification) -> bool {
        crossbeam_channel::Sender::send(self, notification).is_ok()
    }
}

/// External window/UI layer that also sees every raw input event.
pub trait EventDispatcher: Send {
    /// Returns `false` to stop the runtime.
    fn dispatch(&mut self, event: &InputEvent) -> bool;
}

/// Item carried by the event hand-off queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    Input(InputEvent),
    Quit,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("runtime control channel disconnected")]
    ControlChannelDisconnected,
    #[error("runtime did not respond in time for {op}")]
    ControlTimeout { op: &'static str },
    #[error("failed to start runtime thread: {0}")]
    ThreadSpawnFailed(String),
    #[error("failed to load ROM: {path}: {error}")]
    RomLoadFailed { path: PathBuf, error: String },
    #[error("failed to load BIOS: {path}: {error}")]
    BiosLoadFailed { path: PathBuf, error: String },
    #[error("state file {path}: {error}")]
    StateIoFailed { path: PathBuf, error: String },
    #[error("no ROM and BIOS loaded")]
    CoreNotReady,
    #[error(transparent)]
    Audio(#[from] AudioError),
}

pub(crate) fn default_device_label(opened: Option<&str>) -> String {
    opened.unwrap_or(DEFAULT_DEVICE_NAME).to_string()
}

pub(crate) const CONTROL_REPLY_TIMEOUT: Duration = Duration::from_secs(2);
pub(crate) const LOAD_REPLY_TIMEOUT: Duration = Duration::from_secs(10);
/// How long the loop waits for work while nothing can be emulated.
pub(crate) const IDLE_WAIT: Duration = Duration::from_millis(10);
