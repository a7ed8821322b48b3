//! Cartridge identification and BIOS validation.

/// Offset of the 16-byte title field in the cartridge header.
const TITLE_OFFSET: usize = 0x134;
const TITLE_LEN: usize = 16;

/// Size in bytes of the expected boot ROM image.
pub const EXPECTED_BIOS_SIZE: usize = 2304;
/// CRC-32 (IEEE) of the expected boot ROM image.
pub const EXPECTED_BIOS_CRC: u32 = 828_843_416;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cartridge {
    pub title: [u8; TITLE_LEN],
    pub crc32: u32,
}

impl Cartridge {
    /// Reads identification data from a raw ROM image.
    ///
    /// Images too short to hold a header get an all-zero title; the checksum
    /// always covers the whole image.
    pub fn from_rom_bytes(rom: &[u8]) -> Self {
        let mut title = [0u8; TITLE_LEN];
        if let Some(src) = rom.get(TITLE_OFFSET..TITLE_OFFSET + TITLE_LEN) {
            title.copy_from_slice(src);
        }

        Self {
            title,
            crc32: crc32fast::hash(rom),
        }
    }

    /// Title with trailing NUL padding removed.
    pub fn title_lossy(&self) -> String {
        let end = self
            .title
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.title.len());
        String::from_utf8_lossy(&self.title[..end]).into_owned()
    }

    /// Checksum as eight uppercase hex digits, most significant nibble first.
    pub fn checksum_hex(&self) -> String {
        format!("{:08X}", self.crc32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BiosError {
    #[error("BIOS must be {EXPECTED_BIOS_SIZE} bytes (got {actual})")]
    WrongSize { actual: usize },
    #[error("BIOS checksum mismatch: expected {EXPECTED_BIOS_CRC:08X}, got {actual:08X}")]
    WrongChecksum { actual: u32 },
}

/// Checks a boot ROM image against the expected size and checksum.
pub fn validate_bios(image: &[u8]) -> Result<(), BiosError> {
    if image.len() != EXPECTED_BIOS_SIZE {
        return Err(BiosError::WrongSize {
            actual: image.len(),
        });
    }

    let actual = crc32fast::hash(image);
    if actual != EXPECTED_BIOS_CRC {
        return Err(BiosError::WrongChecksum { actual });
    }

    Ok(())
}
