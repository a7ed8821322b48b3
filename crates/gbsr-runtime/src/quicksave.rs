//! Quicksave files and the state-slot selector.
//!
//! A quicksave starts with a signature byte, a format version byte, one
//! unused byte and a 24-bit big-endian snapshot length, followed by the
//! snapshot pixels and then the core's opaque state. Only the header and
//! snapshot are interpreted here.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::emulator::{VIDEO_HEIGHT, VIDEO_WIDTH};

pub const SIGNATURE: u8 = 0xFF;
pub const VERSION: u8 = 0x02;
pub const HEADER_LEN: usize = 6;
pub const EXTENSION: &str = "gqs";

pub const MIN_SLOT: u32 = 1;
pub const MAX_SLOT: u32 = 100;

pub const PREVIEW_WIDTH: usize = VIDEO_WIDTH >> 2;
pub const PREVIEW_HEIGHT: usize = VIDEO_HEIGHT >> 2;

/// How long the slot overlay stays visible after it changes.
pub const OVERLAY_DURATION: Duration = Duration::from_secs(4);

const GRID_COLUMNS: u32 = 10;
const GRID_MARGIN: u32 = 10;
const GRID_STEP_X: u32 = 11;
const GRID_STEP_Y: u32 = 6;

#[derive(Error, Debug)]
pub enum QuicksaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a quicksave (signature {signature:#04x}, version {version:#04x})")]
    BadHeader { signature: u8, version: u8 },
    #[error("quicksave truncated: snapshot needs {declared} bytes, {available} present")]
    Truncated { declared: usize, available: usize },
}

/// A validated quicksave file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuicksaveEnvelope {
    bytes: Vec<u8>,
    snapshot: Range<usize>,
}

impl QuicksaveEnvelope {
    pub fn parse(bytes: Vec<u8>) -> Result<Self, QuicksaveError> {
        if bytes.len() < HEADER_LEN {
            return Err(match bytes.as_slice() {
                [SIGNATURE, VERSION, ..] => QuicksaveError::Truncated {
                    declared: HEADER_LEN,
                    available: bytes.len(),
                },
                _ => QuicksaveError::BadHeader {
                    signature: bytes.first().copied().unwrap_or(0),
                    version: bytes.get(1).copied().unwrap_or(0),
                },
            });
        }

        let (signature, version) = (bytes[0], bytes[1]);
        if signature != SIGNATURE || version != VERSION {
            return Err(QuicksaveError::BadHeader { signature, version });
        }

        let declared = usize::from(bytes[3]) << 16 | usize::from(bytes[4]) << 8 | usize::from(bytes[5]);
        let available = bytes.len() - HEADER_LEN;
        if declared > available {
            return Err(QuicksaveError::Truncated {
                declared,
                available,
            });
        }

        Ok(Self {
            snapshot: HEADER_LEN..HEADER_LEN + declared,
            bytes,
        })
    }

    pub fn read(path: &Path) -> Result<Self, QuicksaveError> {
        Self::parse(std::fs::read(path)?)
    }

    /// Embedded preview pixels, exactly as long as the header declares.
    pub fn snapshot(&self) -> &[u8] {
        &self.bytes[self.snapshot.clone()]
    }

    /// The whole file, as handed back to the core on load.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Current slot plus the preview read from its file.
#[derive(Debug, Clone)]
pub struct SlotSelector {
    slot: u32,
    rom_dir: PathBuf,
    rom_base: String,
    preview: Option<QuicksaveEnvelope>,
    shown_until: Option<Instant>,
}

impl Default for SlotSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotSelector {
    pub fn new() -> Self {
        Self {
            slot: MIN_SLOT,
            rom_dir: PathBuf::new(),
            rom_base: String::new(),
            preview: None,
            shown_until: None,
        }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Points slot paths at `rom_path`'s directory and base name, then
    /// re-reads the preview.
    ///
    /// The base name is the file name up to its first `.`.
    pub fn set_rom_path(&mut self, rom_path: &Path) {
        self.rom_dir = rom_path.parent().map(Path::to_path_buf).unwrap_or_default();
        let file_name = rom_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.rom_base = match file_name.find('.') {
            Some(dot) => file_name[..dot].to_string(),
            None => file_name,
        };
        self.refresh();
    }

    /// `{rom_dir}/{rom_base}_{slot}.gqs`
    pub fn state_path(&self) -> PathBuf {
        self.rom_dir
            .join(format!("{}_{}.{EXTENSION}", self.rom_base, self.slot))
    }

    /// Moves by `amount` slots, wrapping from 1 to 100 and back, re-reads the
    /// preview and shows the overlay.
    pub fn advance(&mut self, amount: i32) {
        let next = self.slot as i64 + i64::from(amount);
        self.slot = if next < i64::from(MIN_SLOT) {
            MAX_SLOT
        } else if next > i64::from(MAX_SLOT) {
            MIN_SLOT
        } else {
            next as u32
        };
        self.refresh();
        self.show(Instant::now());
    }

    /// Re-reads the current slot's file. Missing or invalid files leave no
    /// preview.
    pub fn refresh(&mut self) {
        let path = self.state_path();
        self.preview = match QuicksaveEnvelope::read(&path) {
            Ok(envelope) => Some(envelope),
            Err(QuicksaveError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::debug!(path = %path.display(), "no preview: {}", e);
                None
            }
        };
    }

    pub fn preview(&self) -> Option<&QuicksaveEnvelope> {
        self.preview.as_ref()
    }

    pub fn show(&mut self, now: Instant) {
        self.shown_until = Some(now + OVERLAY_DURATION);
    }

    /// When the slot overlay should stop being drawn.
    pub fn shown_until(&self) -> Option<Instant> {
        self.shown_until
    }

    pub fn is_shown(&self, now: Instant) -> bool {
        self.shown_until.is_some_and(|until| now < until)
    }

    pub fn preview_origin(&self) -> (u32, u32) {
        preview_origin(self.slot)
    }
}

/// Top-left pixel of `slot`'s preview cell in the slot overlay.
pub fn preview_origin(slot: u32) -> (u32, u32) {
    let index = slot.clamp(MIN_SLOT, MAX_SLOT) - 1;
    (
        (index % GRID_COLUMNS) * GRID_STEP_X + GRID_MARGIN,
        (index / GRID_COLUMNS) * GRID_STEP_Y + GRID_MARGIN,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn envelope(declared: usize, body: usize) -> Vec<u8> {
        let mut bytes = vec![
            SIGNATURE,
            VERSION,
            0,
            (declared >> 16) as u8,
            (declared >> 8) as u8,
            declared as u8,
        ];
        bytes.extend((0..body).map(|i| i as u8));
        bytes
    }

    #[test]
    fn snapshot_has_declared_length() {
        let parsed = QuicksaveEnvelope::parse(envelope(300, 400)).unwrap();
        assert_eq!(parsed.snapshot().len(), 300);
        assert_eq!(parsed.snapshot()[0], 0);
        assert_eq!(parsed.bytes().len(), HEADER_LEN + 400);
    }

    #[test]
    fn wrong_signature_or_version_is_rejected() {
        let mut bad_sig = envelope(0, 0);
        bad_sig[0] = 0xFE;
        assert!(matches!(
            QuicksaveEnvelope::parse(bad_sig),
            Err(QuicksaveError::BadHeader {
                signature: 0xFE,
                ..
            })
        ));

        let mut bad_ver = envelope(0, 0);
        bad_ver[1] = 0x01;
        assert!(matches!(
            QuicksaveEnvelope::parse(bad_ver),
            Err(QuicksaveError::BadHeader { version: 0x01, .. })
        ));
    }

    #[test]
    fn truncated_snapshot_is_rejected() {
        assert!(matches!(
            QuicksaveEnvelope::parse(envelope(100, 99)),
            Err(QuicksaveError::Truncated {
                declared: 100,
                available: 99
            })
        ));
        assert!(QuicksaveEnvelope::parse(vec![SIGNATURE, VERSION, 0]).is_err());
        assert!(QuicksaveEnvelope::parse(Vec::new()).is_err());
    }

    #[test]
    fn slot_wraps_both_ways() {
        let mut slots = SlotSelector::new();
        slots.advance(-1);
        assert_eq!(slots.slot(), MAX_SLOT);
        slots.advance(1);
        assert_eq!(slots.slot(), MIN_SLOT);
        slots.advance(5);
        assert_eq!(slots.slot(), 6);
    }

    #[test]
    fn state_path_uses_name_up_to_first_dot() {
        let mut slots = SlotSelector::new();
        slots.set_rom_path(Path::new("/roms/Pokemon Red.v1.gb"));
        slots.advance(2);
        assert_eq!(
            slots.state_path(),
            Path::new("/roms").join("Pokemon Red_3.gqs")
        );
    }

    #[test]
    fn preview_origin_follows_grid() {
        let mut slots = SlotSelector::new();
        assert_eq!(slots.preview_origin(), (10, 10));
        slots.advance(12);
        // slot 13 -> index 12 -> column 2, row 1
        assert_eq!(slots.preview_origin(), (32, 16));
        assert_eq!(preview_origin(MAX_SLOT), (109, 64));
    }

    #[test]
    fn overlay_expires() {
        let mut slots = SlotSelector::new();
        let now = Instant::now();
        assert!(!slots.is_shown(now));
        slots.show(now);
        assert!(slots.is_shown(now + Duration::from_secs(3)));
        assert!(!slots.is_shown(now + OVERLAY_DURATION));
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            if let Ok(parsed) = QuicksaveEnvelope::parse(bytes.clone()) {
                let declared = usize::from(bytes[3]) << 16 | usize::from(bytes[4]) << 8 | usize::from(bytes[5]);
                prop_assert_eq!(parsed.snapshot().len(), declared);
                prop_assert_eq!(bytes[0], SIGNATURE);
                prop_assert_eq!(bytes[1], VERSION);
            }
        }

        #[test]
        fn well_formed_envelopes_parse(declared in 0usize..512, extra in 0usize..64) {
            let parsed = QuicksaveEnvelope::parse(envelope(declared, declared + extra)).unwrap();
            prop_assert_eq!(parsed.snapshot().len(), declared);
        }
    }
}
