//! Playback through cpal, fed by a lock-free ring buffer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use cpal::{
    SampleFormat,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use ringbuf::{
    HeapRb,
    traits::{Consumer, Producer, Split},
};

use super::{AudioBackend, AudioError, DeviceFormat, MAX_BUFFER_TARGET, OutputDevice};

/// Room past the largest buffer target, well over one frame of audio.
const RING_HEADROOM: Duration = Duration::from_millis(250);
/// Samples the callback pops per chunk.
const SCRATCH_SAMPLES: usize = 4096;

/// Ring length in samples for `format`. It always holds the largest
/// accepted buffer target plus a frame, so the queue can reach the target.
pub(crate) fn ring_capacity(format: &DeviceFormat) -> usize {
    let seconds = (MAX_BUFFER_TARGET + RING_HEADROOM).as_secs_f64();
    let frames = (seconds * f64::from(format.sample_rate)).ceil() as usize;
    (frames * format.channels as usize).max(1)
}

/// Consumer half of the ring buffer, owned by the stream callback.
struct RingReader {
    consumer: ringbuf::HeapCons<i16>,
    queued: Arc<AtomicUsize>,
    clear_flag: Arc<AtomicBool>,
    scratch: Vec<i16>,
}

impl RingReader {
    /// Fills `data` from the ring, converting each sample and padding any
    /// shortfall with `silence`.
    fn fill<T: Copy>(&mut self, data: &mut [T], convert: impl Fn(i16) -> T, silence: T) {
        if self.clear_flag.swap(false, Ordering::AcqRel) {
            let dropped = self.consumer.clear();
            self.queued.fetch_sub(dropped, Ordering::AcqRel);
        }

        // The scratch buffer is never grown here; large requests go in chunks.
        let mut filled = 0;
        while filled < data.len() {
            let want = (data.len() - filled).min(self.scratch.len());
            let popped = self.consumer.pop_slice(&mut self.scratch[..want]);
            self.queued.fetch_sub(popped, Ordering::AcqRel);

            for (dst, &s) in data[filled..filled + popped].iter_mut().zip(&self.scratch) {
                *dst = convert(s);
            }
            filled += popped;
            if popped < want {
                break;
            }
        }
        data[filled..].fill(silence);
    }
}

/// Audio backend over the platform's default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn device_names(&self) -> Vec<String> {
        let host = cpal::default_host();
        match host.output_devices() {
            Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
            Err(e) => {
                tracing::warn!("Failed to enumerate output devices: {}", e);
                Vec::new()
            }
        }
    }

    fn open(&mut self, name: Option<&str>) -> Result<Box<dyn OutputDevice>, AudioError> {
        let host = cpal::default_host();
        let device = match name {
            Some(wanted) => host
                .output_devices()
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().is_ok_and(|n| n == wanted)),
            None => host.default_output_device(),
        }
        .ok_or_else(|| {
            AudioError::DeviceUnavailable(name.unwrap_or("default output").to_string())
        })?;

        Ok(Box::new(CpalOutput::open(device)?))
    }
}

/// An open cpal output stream.
pub struct CpalOutput {
    name: String,
    format: DeviceFormat,
    producer: ringbuf::HeapProd<i16>,
    /// Samples pushed but not yet consumed by the callback.
    queued: Arc<AtomicUsize>,
    clear_flag: Arc<AtomicBool>,
    _stream: cpal::Stream,
}

impl CpalOutput {
    fn open(device: cpal::Device) -> Result<Self, AudioError> {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let format = DeviceFormat {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
            sample_width: sample_format.sample_size(),
        };

        let (producer, consumer) = HeapRb::<i16>::new(ring_capacity(&format)).split();

        let queued = Arc::new(AtomicUsize::new(0));
        let clear_flag = Arc::new(AtomicBool::new(false));

        let mut reader = RingReader {
            consumer,
            queued: queued.clone(),
            clear_flag: clear_flag.clone(),
            scratch: vec![0; SCRATCH_SAMPLES],
        };
        let err_fn = |err| tracing::error!("Audio stream error: {}", err);

        let stream = match sample_format {
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| reader.fill(data, |s| s, 0),
                err_fn,
                None,
            ),
            SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    reader.fill(data, |s| f32::from(s) / 32768.0, 0.0)
                },
                err_fn,
                None,
            ),
            SampleFormat::U16 => device.build_output_stream(
                &config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    reader.fill(data, |s| (i32::from(s) + 32768) as u16, 32768)
                },
                err_fn,
                None,
            ),
            other => {
                return Err(AudioError::StreamFailed(format!(
                    "unsupported sample format: {other:?}"
                )));
            }
        }
        .map_err(|e| AudioError::StreamFailed(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamFailed(e.to_string()))?;

        tracing::info!(
            device = %name,
            rate = format.sample_rate,
            channels = format.channels,
            ?sample_format,
            "audio stream started"
        );

        Ok(Self {
            name,
            format,
            producer,
            queued,
            clear_flag,
            _stream: stream,
        })
    }
}

impl OutputDevice for CpalOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> DeviceFormat {
        self.format
    }

    fn queue(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        // Count first so the callback never sees more popped than queued.
        self.queued.fetch_add(samples.len(), Ordering::AcqRel);
        let pushed = self.producer.push_slice(samples);
        if pushed < samples.len() {
            self.queued.fetch_sub(samples.len() - pushed, Ordering::AcqRel);
            tracing::debug!("Audio buffer overflow: dropped {} samples", samples.len() - pushed);
        }
        Ok(())
    }

    fn queued_bytes(&mut self) -> usize {
        self.queued.load(Ordering::Acquire) * self.format.sample_width
    }

    fn clear(&mut self) {
        self.clear_flag.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::{NATIVE_SAMPLE_RATE, SAMPLES_PER_FRAME};

    fn reader(capacity: usize) -> (ringbuf::HeapProd<i16>, RingReader) {
        let (producer, consumer) = HeapRb::<i16>::new(capacity).split();
        let reader = RingReader {
            consumer,
            queued: Arc::new(AtomicUsize::new(0)),
            clear_flag: Arc::new(AtomicBool::new(false)),
            scratch: vec![0; SCRATCH_SAMPLES],
        };
        (producer, reader)
    }

    #[test]
    fn ring_holds_largest_target_plus_a_frame() {
        let format = DeviceFormat {
            sample_rate: 48_000,
            channels: 2,
            sample_width: 2,
        };
        let held = format.duration_of(ring_capacity(&format) * format.sample_width);
        let frame = Duration::from_secs_f64(
            f64::from(SAMPLES_PER_FRAME) / f64::from(NATIVE_SAMPLE_RATE),
        );
        assert!(held >= MAX_BUFFER_TARGET + frame);
    }

    #[test]
    fn large_callback_buffers_fill_in_chunks() {
        let (mut producer, mut reader) = reader(16_384);
        let samples: Vec<i16> = (0..6000).map(|i| (i % 1000) as i16 + 1).collect();
        assert_eq!(producer.push_slice(&samples), samples.len());
        reader.queued.store(samples.len(), Ordering::Release);

        let mut out = vec![-1i32; 3 * SCRATCH_SAMPLES];
        reader.fill(&mut out, i32::from, 0);

        assert_eq!(reader.scratch.len(), SCRATCH_SAMPLES);
        assert_eq!(reader.queued.load(Ordering::Acquire), 0);
        assert!(out[..6000].iter().zip(&samples).all(|(&o, &s)| o == i32::from(s)));
        assert!(out[6000..].iter().all(|&o| o == 0));
    }
}
