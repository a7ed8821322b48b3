//! Streaming sample-rate and channel conversion for interleaved 16-bit PCM.
//!
//! Downsampling averages every input frame that falls into an output period
//! (the native rate is tens of times higher than any device rate, so point
//! sampling would alias badly). Upsampling interpolates linearly between
//! neighbouring input frames. Phase is carried across calls, so feeding a
//! stream in arbitrary chunks produces the same output as feeding it at once.

use super::AudioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Passthrough,
    Decimate,
    Interpolate,
}

#[derive(Debug, Clone)]
pub struct Resampler {
    input_rate: u32,
    output_rate: u32,
    input_channels: u16,
    output_channels: u16,
    mode: Mode,
    /// Output-rate units accumulated since the last emitted frame.
    phase: u64,
    sum: [i64; 2],
    count: u32,
    prev: [i16; 2],
    pending: Vec<i16>,
}

impl Resampler {
    /// Creates a converter from `input_rate`/`input_channels` to
    /// `output_rate`/`output_channels`. Input must be mono or stereo.
    pub fn new(
        input_rate: u32,
        input_channels: u16,
        output_rate: u32,
        output_channels: u16,
    ) -> Result<Self, AudioError> {
        if input_rate == 0 || output_rate == 0 {
            return Err(AudioError::ResamplerCreationFailed(format!(
                "invalid sample rates {input_rate} -> {output_rate}"
            )));
        }
        if !(1..=2).contains(&input_channels) || output_channels == 0 {
            return Err(AudioError::ResamplerCreationFailed(format!(
                "unsupported channel layout {input_channels} -> {output_channels}"
            )));
        }

        let mode = if input_rate == output_rate {
            Mode::Passthrough
        } else if output_rate < input_rate {
            Mode::Decimate
        } else {
            Mode::Interpolate
        };

        Ok(Self {
            input_rate,
            output_rate,
            input_channels,
            output_channels,
            mode,
            phase: 0,
            sum: [0; 2],
            count: 0,
            prev: [0; 2],
            pending: Vec::new(),
        })
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn output_channels(&self) -> u16 {
        self.output_channels
    }

    /// Feeds interleaved input samples. A trailing partial frame is ignored.
    pub fn put(&mut self, samples: &[i16]) {
        let stride = self.input_channels as usize;
        for frame in samples.chunks_exact(stride) {
            let frame = [frame[0], frame[stride - 1]];
            match self.mode {
                Mode::Passthrough => self.emit(frame),
                Mode::Decimate => self.decimate(frame),
                Mode::Interpolate => self.interpolate(frame),
            }
        }
    }

    /// Number of converted samples waiting to be read.
    pub fn available(&self) -> usize {
        self.pending.len()
    }

    /// Moves every converted sample into `out`, returning how many were moved.
    pub fn get(&mut self, out: &mut Vec<i16>) -> usize {
        let n = self.pending.len();
        out.append(&mut self.pending);
        n
    }

    /// Drops partial state and anything not yet read.
    pub fn clear(&mut self) {
        self.phase = 0;
        self.sum = [0; 2];
        self.count = 0;
        self.prev = [0; 2];
        self.pending.clear();
    }

    fn decimate(&mut self, frame: [i16; 2]) {
        self.sum[0] += i64::from(frame[0]);
        self.sum[1] += i64::from(frame[1]);
        self.count += 1;
        self.phase += u64::from(self.output_rate);

        if self.phase >= u64::from(self.input_rate) {
            self.phase -= u64::from(self.input_rate);
            let n = i64::from(self.count);
            let averaged = [(self.sum[0] / n) as i16, (self.sum[1] / n) as i16];
            self.sum = [0; 2];
            self.count = 0;
            self.emit(averaged);
        }
    }

    fn interpolate(&mut self, frame: [i16; 2]) {
        let out_rate = u64::from(self.output_rate);
        while self.phase < out_rate {
            let t = self.phase as f32 / out_rate as f32;
            let lerp = |a: i16, b: i16| (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round() as i16;
            let value = [lerp(self.prev[0], frame[0]), lerp(self.prev[1], frame[1])];
            self.emit(value);
            self.phase += u64::from(self.input_rate);
        }
        self.phase -= out_rate;
        self.prev = frame;
    }

    fn emit(&mut self, [left, right]: [i16; 2]) {
        match self.output_channels {
            1 => self
                .pending
                .push(((i32::from(left) + i32::from(right)) / 2) as i16),
            n => {
                self.pending.push(left);
                self.pending.push(right);
                for _ in 2..n {
                    self.pending.push(right);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain(r: &mut Resampler) -> Vec<i16> {
        let mut out = Vec::new();
        r.get(&mut out);
        out
    }

    #[test]
    fn resample_identity_copies_input() {
        let mut r = Resampler::new(48_000, 2, 48_000, 2).unwrap();
        let src = [100i16, -100, 200, -200, 300, -300];
        r.put(&src);
        assert_eq!(r.available(), src.len());
        assert_eq!(drain(&mut r), src);
        assert_eq!(r.available(), 0);
    }

    #[test]
    fn resample_down_96k_to_48k_halves_frame_count() {
        let mut r = Resampler::new(96_000, 2, 48_000, 2).unwrap();
        let src: Vec<i16> = (0..1600).flat_map(|i| [i as i16, -(i as i16)]).collect();
        r.put(&src);
        let out = drain(&mut r);
        assert_eq!(out.len() / 2, 800);
        // Each output frame averages two neighbouring inputs.
        assert_eq!(&out[..4], &[0, 0, 2, -2]);
    }

    #[test]
    fn native_rate_to_48k_yields_expected_frames_per_second() {
        let mut r = Resampler::new(2_097_152, 2, 48_000, 2).unwrap();
        let second = vec![1000i16; 2_097_152 * 2];
        r.put(&second);
        let out = drain(&mut r);
        assert_eq!(out.len() / 2, 48_000);
        assert!(out.iter().all(|&s| s == 1000));
    }

    #[test]
    fn upsample_doubles_frames_and_interpolates() {
        let mut r = Resampler::new(24_000, 2, 48_000, 2).unwrap();
        r.put(&[0, 0, 100, 100, 200, 200]);
        let out = drain(&mut r);
        assert_eq!(out.len() / 2, 6);
        assert_eq!(&out[..8], &[0, 0, 0, 0, 0, 0, 50, 50]);
    }

    #[test]
    fn channel_mapping_mono_and_surround() {
        let mut mono = Resampler::new(48_000, 2, 48_000, 1).unwrap();
        mono.put(&[100, 300]);
        assert_eq!(drain(&mut mono), [200]);

        let mut surround = Resampler::new(48_000, 2, 48_000, 4).unwrap();
        surround.put(&[1, 2]);
        assert_eq!(drain(&mut surround), [1, 2, 2, 2]);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        assert!(matches!(
            Resampler::new(0, 2, 48_000, 2),
            Err(AudioError::ResamplerCreationFailed(_))
        ));
        assert!(Resampler::new(48_000, 2, 48_000, 0).is_err());
        assert!(Resampler::new(48_000, 3, 48_000, 2).is_err());
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_output(
            samples in prop::collection::vec(any::<i16>(), 0..2048),
            split in 0usize..1024,
            out_rate in prop::sample::select(vec![22_050u32, 44_100, 48_000, 96_000]),
        ) {
            let samples = &samples[..samples.len() & !1];
            let split = (split * 2).min(samples.len());

            let mut whole = Resampler::new(44_100, 2, out_rate, 2).unwrap();
            whole.put(samples);

            let mut parts = Resampler::new(44_100, 2, out_rate, 2).unwrap();
            parts.put(&samples[..split]);
            parts.put(&samples[split..]);

            prop_assert_eq!(drain(&mut whole), drain(&mut parts));
        }
    }
}
