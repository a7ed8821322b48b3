use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::cartridge::Cartridge;
use crate::reset::ResetPhase;

/// State the runtime thread publishes for lock-free reads by handles.
pub(crate) struct RuntimeState {
    pub(crate) paused: AtomicBool,
    pub(crate) running: AtomicBool,
    pub(crate) ready: AtomicBool,
    pub(crate) reset_phase: AtomicU8,
    pub(crate) slot: AtomicU32,
    pub(crate) joypad: AtomicU8,
    pub(crate) cartridge: Mutex<Option<Cartridge>>,
    pub(crate) slot_preview: Mutex<Option<Vec<u8>>>,
    /// Display deadline of the slot overlay.
    pub(crate) slot_overlay_until: Mutex<Option<Instant>>,
    pub(crate) audio_device: Mutex<Option<String>>,
}

impl RuntimeState {
    pub(crate) fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            running: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            reset_phase: AtomicU8::new(encode_phase(ResetPhase::Idle)),
            slot: AtomicU32::new(crate::quicksave::MIN_SLOT),
            joypad: AtomicU8::new(0),
            cartridge: Mutex::new(None),
            slot_preview: Mutex::new(None),
            slot_overlay_until: Mutex::new(None),
            audio_device: Mutex::new(None),
        }
    }

    pub(crate) fn set_reset_phase(&self, phase: ResetPhase) {
        self.reset_phase.store(encode_phase(phase), Ordering::Release);
    }

    pub(crate) fn reset_phase(&self) -> ResetPhase {
        match self.reset_phase.load(Ordering::Acquire) {
            1 => ResetPhase::FadingToBlack,
            2 => ResetPhase::Stalling,
            3 => ResetPhase::JustCompleted,
            _ => ResetPhase::Idle,
        }
    }
}

fn encode_phase(phase: ResetPhase) -> u8 {
    match phase {
        ResetPhase::Idle => 0,
        ResetPhase::FadingToBlack => 1,
        ResetPhase::Stalling => 2,
        ResetPhase::JustCompleted => 3,
    }
}
