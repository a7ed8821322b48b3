//! Reset sequence: a randomized fade to black, a fixed stall, then a core reset.
//!
//! Time is measured in native audio samples, the same unit the driving loop
//! advances the core by.

use rand::Rng;

use crate::emulator::SAMPLES_PER_FRAME;

/// Fixed part of the fade duration.
pub const FADE_BASE_SAMPLES: u32 = 1_234_567;
/// Samples the core is held in reset once the fade finishes.
pub const STALL_SAMPLES: u32 = 101 * (2 << 14);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPhase {
    #[default]
    Idle,
    FadingToBlack,
    Stalling,
    /// The core was reset this frame; reported once, then back to `Idle`.
    JustCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetAction {
    /// Reset the core, keeping it stalled for `stall_samples`.
    ResetCore { stall_samples: u32 },
}

#[derive(Debug, Clone, Default)]
pub struct ResetMachine {
    phase: ResetPhase,
    fade_total: u32,
    fade_remaining: u32,
    stall_remaining: u32,
}

impl ResetMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ResetPhase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == ResetPhase::Idle
    }

    /// Starts a reset with a random jitter in `[0, SAMPLES_PER_FRAME)`.
    ///
    /// Returns `false` without changing anything when a reset is already in
    /// progress.
    pub fn begin<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        let jitter = rng.random_range(0..SAMPLES_PER_FRAME);
        self.begin_with_jitter(jitter)
    }

    pub fn begin_with_jitter(&mut self, jitter: u32) -> bool {
        if self.phase != ResetPhase::Idle {
            return false;
        }

        self.phase = ResetPhase::FadingToBlack;
        self.fade_total = FADE_BASE_SAMPLES + jitter;
        self.fade_remaining = self.fade_total;
        self.stall_remaining = 0;
        tracing::debug!(fade_samples = self.fade_total, "reset started");
        true
    }

    /// Counts `elapsed` samples of emulated time off the active phase's budget.
    ///
    /// The core reset is requested on the step that exhausts the fade. The
    /// step that exhausts the stall moves to `JustCompleted`, and the step
    /// after that returns to `Idle`.
    pub fn advance(&mut self, elapsed: u32) -> Option<ResetAction> {
        match self.phase {
            ResetPhase::Idle => None,
            ResetPhase::FadingToBlack => {
                self.fade_remaining = self.fade_remaining.saturating_sub(elapsed);
                if self.fade_remaining > 0 {
                    return None;
                }
                self.stall_remaining = STALL_SAMPLES;
                self.phase = ResetPhase::Stalling;
                Some(ResetAction::ResetCore {
                    stall_samples: STALL_SAMPLES,
                })
            }
            ResetPhase::Stalling => {
                self.stall_remaining = self.stall_remaining.saturating_sub(elapsed);
                if self.stall_remaining == 0 {
                    self.phase = ResetPhase::JustCompleted;
                }
                None
            }
            ResetPhase::JustCompleted => {
                self.phase = ResetPhase::Idle;
                None
            }
        }
    }

    /// Fade progress in `[0, 1]`. Stays at 1 until the sequence completes.
    pub fn fade_progress(&self) -> f32 {
        match self.phase {
            ResetPhase::Idle => 0.0,
            ResetPhase::FadingToBlack => {
                let passed = self.fade_total - self.fade_remaining;
                (passed as f32 / self.fade_total as f32).clamp(0.0, 1.0)
            }
            ResetPhase::Stalling | ResetPhase::JustCompleted => 1.0,
        }
    }

    /// Black overlay alpha for the current fade progress, truncated.
    pub fn overlay_alpha(&self) -> u8 {
        (255.0 * self.fade_progress()) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn stall_budget_matches_constant() {
        assert_eq!(STALL_SAMPLES, 3_309_568);
    }

    #[test]
    fn random_fade_stays_within_one_frame_of_base() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..64 {
            let mut machine = ResetMachine::new();
            assert!(machine.begin(&mut rng));
            assert!(machine.fade_total >= FADE_BASE_SAMPLES);
            assert!(machine.fade_total < FADE_BASE_SAMPLES + SAMPLES_PER_FRAME);
        }
    }

    #[test]
    fn second_begin_is_ignored() {
        let mut machine = ResetMachine::new();
        assert!(machine.begin_with_jitter(10));
        machine.advance(1000);
        assert!(!machine.begin_with_jitter(0));
        assert_eq!(machine.fade_total, FADE_BASE_SAMPLES + 10);
        assert_eq!(machine.fade_remaining, FADE_BASE_SAMPLES + 10 - 1000);
    }

    #[test]
    fn full_sequence_resets_once_and_returns_to_idle() {
        let mut machine = ResetMachine::new();
        machine.begin_with_jitter(0);

        let mut resets = 0;
        let mut steps = 0;
        while machine.phase() != ResetPhase::JustCompleted {
            if machine.advance(SAMPLES_PER_FRAME).is_some() {
                resets += 1;
                assert_eq!(machine.phase(), ResetPhase::Stalling);
            }
            steps += 1;
            assert!(steps < 1000);
        }
        assert_eq!(resets, 1);
        assert_eq!(machine.fade_progress(), 1.0);

        assert_eq!(machine.advance(SAMPLES_PER_FRAME), None);
        assert!(machine.is_idle());
        assert_eq!(machine.overlay_alpha(), 0);
    }

    #[test]
    fn fade_progress_is_monotonic() {
        let mut machine = ResetMachine::new();
        machine.begin_with_jitter(500);
        let mut last = 0.0;
        while machine.phase() == ResetPhase::FadingToBlack {
            machine.advance(SAMPLES_PER_FRAME / 3);
            let progress = machine.fade_progress();
            assert!(progress >= last);
            assert!(progress <= 1.0);
            last = progress;
        }
        assert_eq!(machine.overlay_alpha(), 255);
    }

    #[test]
    fn overlay_alpha_truncates_partial_steps() {
        let mut machine = ResetMachine::new();
        machine.begin_with_jitter(0);
        // 864_197 / 1_234_567 of the fade is 178.5 alpha steps.
        machine.advance(864_197);
        assert_eq!(machine.overlay_alpha(), 178);
    }
}
