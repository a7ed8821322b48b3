#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use gbsr_runtime::{
    audio::{AudioBackend, AudioError, DeviceFormat, OutputDevice, SilentSink},
    emulator::{CoreError, EmulationCore, RunOutcome, VIDEO_HEIGHT, VIDEO_WIDTH},
    input::Joypad,
    quicksave::{HEADER_LEN, QuicksaveEnvelope, SIGNATURE, VERSION},
};

pub const TEST_DEVICE: &str = "Test Speakers";
pub const REVISION: u32 = 3;

/// What the fake core has been asked to do, shared with the test body.
#[derive(Debug, Default)]
pub struct CoreLog {
    pub frames: u64,
    pub joypads: Vec<Joypad>,
    pub resets: Vec<u32>,
    pub loaded_frames: Vec<u64>,
}

/// Core that "renders" its frame counter into the video buffer and stores it
/// after the preview in saved states.
pub struct FakeCore {
    log: Arc<Mutex<CoreLog>>,
}

impl FakeCore {
    pub fn new() -> (Self, Arc<Mutex<CoreLog>>) {
        let log = Arc::new(Mutex::new(CoreLog::default()));
        (Self { log: log.clone() }, log)
    }
}

impl EmulationCore for FakeCore {
    fn revision(&self) -> u32 {
        REVISION
    }

    fn load_rom(&mut self, _path: &Path) -> Result<(), CoreError> {
        Ok(())
    }

    fn load_bios(&mut self, _image: &[u8]) -> Result<(), CoreError> {
        Ok(())
    }

    fn set_joypad(&mut self, joypad: Joypad) {
        self.log.lock().unwrap().joypads.push(joypad);
    }

    fn run_for(&mut self, sample_budget: u32, video: &mut [u8], audio: &mut [i16]) -> RunOutcome {
        let mut log = self.log.lock().unwrap();
        log.frames += 1;
        video.fill((log.frames % 251) as u8);
        audio[..sample_budget as usize * 2].fill(0);
        RunOutcome {
            samples_elapsed: sample_budget,
            frame_completed: true,
        }
    }

    fn reset(&mut self, stall_samples: u32) {
        self.log.lock().unwrap().resets.push(stall_samples);
    }

    fn save_state(&mut self, preview: &[u8]) -> Result<Vec<u8>, CoreError> {
        let snapshot = downscale(preview);
        let len = snapshot.len();
        let mut out = vec![
            SIGNATURE,
            VERSION,
            0,
            (len >> 16) as u8,
            (len >> 8) as u8,
            len as u8,
        ];
        out.extend_from_slice(&snapshot);
        out.extend_from_slice(&self.log.lock().unwrap().frames.to_le_bytes());
        Ok(out)
    }

    fn load_state(&mut self, state: &[u8]) -> Result<(), CoreError> {
        let envelope =
            QuicksaveEnvelope::parse(state.to_vec()).map_err(|_| CoreError::StateRejected)?;
        let body = &envelope.bytes()[HEADER_LEN + envelope.snapshot().len()..];
        let frames = body
            .try_into()
            .map(u64::from_le_bytes)
            .map_err(|_| CoreError::StateRejected)?;
        let mut log = self.log.lock().unwrap();
        log.frames = frames;
        log.loaded_frames.push(frames);
        Ok(())
    }
}

/// Quarter-size nearest-neighbour copy of an RGBA frame.
fn downscale(video: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity((VIDEO_WIDTH / 4) * (VIDEO_HEIGHT / 4) * 4);
    for y in (0..VIDEO_HEIGHT).step_by(4) {
        for x in (0..VIDEO_WIDTH).step_by(4) {
            let i = (y * VIDEO_WIDTH + x) * 4;
            out.extend_from_slice(&video[i..i + 4]);
        }
    }
    out
}

/// Backend with one named device that drains in real time.
pub struct TestBackend {
    pub fail: bool,
    pub opened: Arc<Mutex<Vec<Option<String>>>>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self {
            fail: false,
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

impl AudioBackend for TestBackend {
    fn device_names(&self) -> Vec<String> {
        vec![TEST_DEVICE.to_string()]
    }

    fn open(&mut self, name: Option<&str>) -> Result<Box<dyn OutputDevice>, AudioError> {
        self.opened.lock().unwrap().push(name.map(str::to_owned));
        if self.fail {
            return Err(AudioError::DeviceUnavailable("unplugged".into()));
        }
        Ok(Box::new(NamedSink {
            name: name.unwrap_or(TEST_DEVICE).to_string(),
            inner: SilentSink::new(DeviceFormat {
                sample_rate: 48_000,
                channels: 2,
                sample_width: 2,
            }),
        }))
    }
}

/// Real-time draining sink that reports the name it was opened under.
struct NamedSink {
    name: String,
    inner: SilentSink,
}

impl OutputDevice for NamedSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> DeviceFormat {
        self.inner.format()
    }

    fn queue(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        self.inner.queue(samples)
    }

    fn queued_bytes(&mut self) -> usize {
        self.inner.queued_bytes()
    }

    fn clear(&mut self) {
        self.inner.clear()
    }
}

/// Fresh scratch directory under the system temp dir.
pub fn scratch_dir(name: &str) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("gbsr-{}-{}", name, std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
    }
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(dir)
}

/// Writes a tiny ROM with `title` in its header and a dummy BIOS.
pub fn write_media(dir: &Path, title: &str) -> Result<(PathBuf, PathBuf)> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x134..0x134 + title.len()].copy_from_slice(title.as_bytes());
    let rom_path = dir.join("game.gb");
    std::fs::write(&rom_path, &rom)?;

    let bios_path = dir.join("boot.bin");
    std::fs::write(&bios_path, vec![0u8; 2304])?;
    Ok((rom_path, bios_path))
}

/// Polls `check` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    bail!("condition not met within {timeout:?}")
}
