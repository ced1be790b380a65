//! iNES ROM loading
//!
//! Turns an iNES file (16-byte header, optional 512-byte trainer, PRG pages,
//! CHR pages) into the [`CartridgeImage`] the core consumes.

use std::fmt;

use nes_core::cartridge::{CartridgeImage, Mirroring, CHR_BANK_SIZE, PRG_BANK_SIZE};
use tracing::{debug, warn};

/// iNES header size
pub const HEADER_SIZE: usize = 16;
const TRAINER_SIZE: usize = 512;
const MAGIC: [u8; 4] = [b'N', b'E', b'S', 0x1A];

/// ROM file rejected before it reaches the core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomError {
    /// Fewer bytes than a header
    TooShort(usize),
    /// Missing "NES\x1A"
    InvalidMagic([u8; 4]),
    /// File ends before the declared trainer/PRG/CHR data
    Truncated { expected: usize, actual: usize },
}

impl fmt::Display for RomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RomError::TooShort(len) => {
                write!(f, "File too short for an iNES header ({} bytes)", len)
            }
            RomError::InvalidMagic(magic) => write!(f, "Invalid iNES magic: {:02X?}", magic),
            RomError::Truncated { expected, actual } => write!(
                f,
                "ROM truncated: header declares {} bytes, file has {}",
                expected, actual
            ),
        }
    }
}

impl std::error::Error for RomError {}

/// iNES header structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InesHeader {
    /// PRG ROM size in 16KB units
    pub prg_rom_size: u8,
    /// CHR ROM size in 8KB units (0 means CHR RAM)
    pub chr_rom_size: u8,
    /// Flags 6: mirroring, battery, trainer, mapper low nibble
    pub flags_6: u8,
    /// Flags 7: mapper high nibble
    pub flags_7: u8,
}

impl InesHeader {
    /// Parse an iNES header from bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, RomError> {
        if bytes.len() < HEADER_SIZE {
            return Err(RomError::TooShort(bytes.len()));
        }

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != MAGIC {
            return Err(RomError::InvalidMagic(magic));
        }

        Ok(Self {
            prg_rom_size: bytes[4],
            chr_rom_size: bytes[5],
            flags_6: bytes[6],
            flags_7: bytes[7],
        })
    }

    pub fn mapper_number(&self) -> u8 {
        (self.flags_7 & 0xF0) | (self.flags_6 >> 4)
    }

    pub fn has_trainer(&self) -> bool {
        (self.flags_6 & 0x04) != 0
    }

    pub fn has_battery(&self) -> bool {
        (self.flags_6 & 0x02) != 0
    }

    /// Four-screen (bit 3) overrides the vertical bit
    pub fn mirroring(&self) -> Mirroring {
        if (self.flags_6 & 0x08) != 0 {
            Mirroring::FourScreen
        } else if (self.flags_6 & 0x01) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        }
    }

    /// Bytes the header says follow it
    pub fn payload_len(&self) -> usize {
        let trainer = if self.has_trainer() { TRAINER_SIZE } else { 0 };
        trainer
            + usize::from(self.prg_rom_size) * PRG_BANK_SIZE
            + usize::from(self.chr_rom_size) * CHR_BANK_SIZE
    }
}

impl fmt::Display for InesHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "iNES header:")?;
        writeln!(
            f,
            "  PRG ROM: {} x 16KB ({} bytes)",
            self.prg_rom_size,
            usize::from(self.prg_rom_size) * PRG_BANK_SIZE
        )?;
        if self.chr_rom_size == 0 {
            writeln!(f, "  CHR:     8KB RAM")?;
        } else {
            writeln!(
                f,
                "  CHR ROM: {} x 8KB ({} bytes)",
                self.chr_rom_size,
                usize::from(self.chr_rom_size) * CHR_BANK_SIZE
            )?;
        }
        writeln!(f, "  Mapper:  {}", self.mapper_number())?;
        writeln!(f, "  Mirroring: {:?}", self.mirroring())?;
        writeln!(f, "  Battery: {}", self.has_battery())?;
        write!(f, "  Trainer: {}", self.has_trainer())
    }
}

/// Split an iNES file into a cartridge image
pub fn parse(data: &[u8]) -> Result<CartridgeImage, RomError> {
    let header = InesHeader::parse(data)?;

    let expected = HEADER_SIZE + header.payload_len();
    if data.len() < expected {
        return Err(RomError::Truncated {
            expected,
            actual: data.len(),
        });
    }
    if data.len() > expected {
        warn!(
            extra = data.len() - expected,
            "ignoring trailing bytes after CHR data"
        );
    }

    let mut offset = HEADER_SIZE;
    if header.has_trainer() {
        offset += TRAINER_SIZE;
    }

    let prg_len = usize::from(header.prg_rom_size) * PRG_BANK_SIZE;
    let prg_rom = data[offset..offset + prg_len].to_vec();
    offset += prg_len;

    let chr_len = usize::from(header.chr_rom_size) * CHR_BANK_SIZE;
    let chr_rom = data[offset..offset + chr_len].to_vec();

    debug!(
        mapper = header.mapper_number(),
        prg = prg_len,
        chr = chr_len,
        "parsed iNES image"
    );

    Ok(CartridgeImage {
        mapper_id: header.mapper_number(),
        prg_banks: header.prg_rom_size,
        chr_banks: header.chr_rom_size,
        mirroring: header.mirroring(),
        has_battery: header.has_battery(),
        prg_rom,
        chr_rom,
    })
}
