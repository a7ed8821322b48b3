use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::emulator::{BYTES_PER_PIXEL, RunOutcome, SAMPLES_PER_FRAME, VIDEO_BUFFER_LEN};

/// Carries the sample shortfall or excess of one `run_for` call into the
/// next call's budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCarry {
    overflow: u32,
}

impl FrameCarry {
    /// Sample budget for the next `run_for` call.
    pub fn budget(&self) -> u32 {
        SAMPLES_PER_FRAME.saturating_sub(self.overflow)
    }

    pub fn overflow(&self) -> u32 {
        self.overflow
    }

    /// Folds one run into the carry. A completed frame, or a carry that has
    /// grown to a whole frame, starts the next budget from scratch.
    pub fn record(&mut self, outcome: RunOutcome) {
        self.overflow = self.overflow.saturating_add(outcome.samples_elapsed);
        if outcome.frame_completed || self.overflow >= SAMPLES_PER_FRAME {
            self.overflow = 0;
        }
    }
}

/// Blends `pixels` toward black by `alpha` (0 = untouched, 255 = black).
/// Alpha channels are left as they are.
pub fn apply_fade(pixels: &mut [u8], alpha: u8) {
    if alpha == 0 {
        return;
    }
    let keep = 255 - u16::from(alpha);
    for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
        for c in &mut px[..3] {
            *c = (u16::from(*c) * keep / 255) as u8;
        }
    }
}

/// Latest completed frame, readable from any thread.
pub(crate) struct PublishedFrame {
    pixels: Mutex<Vec<u8>>,
    seq: AtomicU64,
}

impl PublishedFrame {
    pub(crate) fn new() -> Self {
        Self {
            pixels: Mutex::new(vec![0; VIDEO_BUFFER_LEN]),
            seq: AtomicU64::new(0),
        }
    }

    /// Replaces the published frame with `video`, faded by `alpha`.
    pub(crate) fn publish(&self, video: &[u8], alpha: u8) -> u64 {
        {
            let mut pixels = self.pixels.lock();
            pixels.clear();
            pixels.extend_from_slice(video);
            apply_fade(&mut pixels, alpha);
        }
        self.seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Copies the frame into `out`, returning its sequence number.
    pub(crate) fn copy_into(&self, out: &mut [u8]) -> u64 {
        let pixels = self.pixels.lock();
        let n = out.len().min(pixels.len());
        out[..n].copy_from_slice(&pixels[..n]);
        self.seq.load(Ordering::Acquire)
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }
}
