//! Stand-in core for exercising the driving loop without real emulation.

use std::path::Path;

use gbsr_runtime::{
    emulator::{CoreError, EmulationCore, RunOutcome, VIDEO_HEIGHT, VIDEO_WIDTH},
    input::Joypad,
    quicksave::{HEADER_LEN, PREVIEW_HEIGHT, PREVIEW_WIDTH, QuicksaveEnvelope, SIGNATURE, VERSION},
};

/// Produces silence and a scrolling gradient, and round-trips its frame
/// counter through quicksaves.
#[derive(Debug, Default)]
pub struct BlankCore {
    frame: u64,
    joypad: Joypad,
    stall: u32,
}

impl BlankCore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmulationCore for BlankCore {
    fn revision(&self) -> u32 {
        0
    }

    fn load_rom(&mut self, _path: &Path) -> Result<(), CoreError> {
        self.frame = 0;
        Ok(())
    }

    fn load_bios(&mut self, _image: &[u8]) -> Result<(), CoreError> {
        Ok(())
    }

    fn set_joypad(&mut self, joypad: Joypad) {
        if joypad != self.joypad {
            tracing::debug!(?joypad, "joypad");
        }
        self.joypad = joypad;
    }

    fn run_for(&mut self, sample_budget: u32, video: &mut [u8], audio: &mut [i16]) -> RunOutcome {
        let produced = (sample_budget as usize * 2).min(audio.len());
        audio[..produced].fill(0);

        if self.stall > 0 {
            self.stall = self.stall.saturating_sub(sample_budget);
            video.fill(0);
        } else {
            let shift = self.frame as usize;
            for (i, px) in video.chunks_exact_mut(4).enumerate() {
                let (x, y) = (i % VIDEO_WIDTH, i / VIDEO_WIDTH);
                let shade = ((x + y + shift) % VIDEO_HEIGHT * 255 / VIDEO_HEIGHT) as u8;
                px.copy_from_slice(&[shade, shade, shade, 0xFF]);
            }
        }

        self.frame += 1;
        RunOutcome {
            samples_elapsed: sample_budget,
            frame_completed: true,
        }
    }

    fn reset(&mut self, stall_samples: u32) {
        self.frame = 0;
        self.stall = stall_samples;
    }

    fn save_state(&mut self, preview: &[u8]) -> Result<Vec<u8>, CoreError> {
        let mut snapshot = Vec::with_capacity(PREVIEW_WIDTH * PREVIEW_HEIGHT * 4);
        for y in 0..PREVIEW_HEIGHT {
            for x in 0..PREVIEW_WIDTH {
                let i = (y * 4 * VIDEO_WIDTH + x * 4) * 4;
                let px = preview
                    .get(i..i + 4)
                    .ok_or_else(|| CoreError::Other("preview too small".into()))?;
                snapshot.extend_from_slice(px);
            }
        }

        let len = snapshot.len();
        let mut out = Vec::with_capacity(HEADER_LEN + len + 8);
        out.extend_from_slice(&[
            SIGNATURE,
            VERSION,
            0,
            (len >> 16) as u8,
            (len >> 8) as u8,
            len as u8,
        ]);
        out.extend_from_slice(&snapshot);
        out.extend_from_slice(&self.frame.to_le_bytes());
        Ok(out)
    }

    fn load_state(&mut self, state: &[u8]) -> Result<(), CoreError> {
        let envelope =
            QuicksaveEnvelope::parse(state.to_vec()).map_err(|_| CoreError::StateRejected)?;
        let body = &envelope.bytes()[HEADER_LEN + envelope.snapshot().len()..];
        let frame: [u8; 8] = body.try_into().map_err(|_| CoreError::StateRejected)?;
        self.frame = u64::from_le_bytes(frame);
        Ok(())
    }
}
