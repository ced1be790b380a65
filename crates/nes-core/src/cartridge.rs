//! Cartridge and mapper support
//!
//! The core receives an already-parsed [`CartridgeImage`] (bank counts plus raw
//! PRG/CHR bytes) and selects a [`Mapper`] variant once at load time. Mappers
//! translate CPU addresses in `$4020-$FFFF` into offsets within the owned PRG
//! storage; name-table mirroring is the video-side translation.

use std::fmt;

use tracing::debug;

use crate::bus::AddressDecodeError;

/// PRG ROM bank size (16KB)
pub const PRG_BANK_SIZE: usize = 0x4000;
/// CHR bank size (8KB)
pub const CHR_BANK_SIZE: usize = 0x2000;
/// Work RAM at $6000-$7FFF
pub const PRG_RAM_SIZE: usize = 0x2000;

const NAMETABLE_SIZE: usize = 0x400;

/// Name-table mirroring declared by the cartridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    /// $2000=$2400, $2800=$2C00 (vertical scrolling games)
    Horizontal,
    /// $2000=$2800, $2400=$2C00 (horizontal scrolling games)
    Vertical,
    /// Four independent tables backed by extra cartridge RAM
    FourScreen,
}

impl Mirroring {
    /// Map a PPU address in $2000-$3EFF to an offset in name-table RAM.
    ///
    /// The result is always below `0x1000`; only four-screen layouts reach
    /// past `0x800`.
    pub fn nametable_offset(self, address: u16) -> usize {
        let index = usize::from(address.wrapping_sub(0x2000) & 0x0FFF);
        let table = index / NAMETABLE_SIZE;
        let physical = match self {
            Mirroring::Horizontal => table / 2,
            Mirroring::Vertical => table % 2,
            Mirroring::FourScreen => table,
        };
        physical * NAMETABLE_SIZE + index % NAMETABLE_SIZE
    }
}

/// Parsed cartridge contents as handed to the core by the ROM loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeImage {
    /// iNES mapper number
    pub mapper_id: u8,
    /// PRG ROM size in 16KB units
    pub prg_banks: u8,
    /// CHR ROM size in 8KB units (0 means CHR RAM)
    pub chr_banks: u8,
    pub mirroring: Mirroring,
    /// Battery-backed work RAM present
    pub has_battery: bool,
    pub prg_rom: Vec<u8>,
    pub chr_rom: Vec<u8>,
}

impl CartridgeImage {
    /// Build a mapper-0 image, deriving bank counts from the data lengths.
    pub fn nrom(prg_rom: Vec<u8>, chr_rom: Vec<u8>, mirroring: Mirroring) -> Self {
        Self {
            mapper_id: 0,
            prg_banks: bank_count(prg_rom.len(), PRG_BANK_SIZE),
            chr_banks: bank_count(chr_rom.len(), CHR_BANK_SIZE),
            mirroring,
            has_battery: false,
            prg_rom,
            chr_rom,
        }
    }
}

fn bank_count(len: usize, bank_size: usize) -> u8 {
    u8::try_from(len / bank_size).unwrap_or(u8::MAX)
}

/// Cartridge configuration rejected at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperConfigError {
    /// Mapper number has no implementation
    UnsupportedMapper(u8),
    /// PRG data length disagrees with the declared bank count
    PrgSizeMismatch { declared_banks: u8, actual_len: usize },
    /// CHR data length disagrees with the declared bank count
    ChrSizeMismatch { declared_banks: u8, actual_len: usize },
    /// PRG bank count outside what the mapper can address
    InvalidPrgBanks { mapper: u8, banks: u8 },
    /// CHR bank count outside what the mapper can address
    InvalidChrBanks { mapper: u8, banks: u8 },
}

impl fmt::Display for MapperConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapperConfigError::UnsupportedMapper(id) => write!(f, "Unsupported mapper: {}", id),
            MapperConfigError::PrgSizeMismatch { declared_banks, actual_len } => write!(
                f,
                "PRG ROM declares {} banks ({} bytes) but holds {} bytes",
                declared_banks,
                usize::from(*declared_banks) * PRG_BANK_SIZE,
                actual_len
            ),
            MapperConfigError::ChrSizeMismatch { declared_banks, actual_len } => write!(
                f,
                "CHR ROM declares {} banks ({} bytes) but holds {} bytes",
                declared_banks,
                usize::from(*declared_banks) * CHR_BANK_SIZE,
                actual_len
            ),
            MapperConfigError::InvalidPrgBanks { mapper, banks } => {
                write!(f, "Mapper {} cannot address {} PRG banks", mapper, banks)
            }
            MapperConfigError::InvalidChrBanks { mapper, banks } => {
                write!(f, "Mapper {} cannot address {} CHR banks", mapper, banks)
            }
        }
    }
}

impl std::error::Error for MapperConfigError {}

/// Pattern storage shared by both mapper variants
#[derive(Debug, Clone)]
struct ChrStorage {
    data: Vec<u8>,
    is_ram: bool,
}

impl ChrStorage {
    fn from_image(image_chr: Vec<u8>, banks: u8) -> Self {
        if banks == 0 {
            Self {
                data: vec![0; CHR_BANK_SIZE],
                is_ram: true,
            }
        } else {
            Self {
                data: image_chr,
                is_ram: false,
            }
        }
    }
}

/// Mapper 0: fixed 16KB or 32KB PRG, fixed 8KB CHR
#[derive(Debug, Clone)]
pub struct Nrom {
    prg_rom: Vec<u8>,
    prg_ram: Vec<u8>,
    chr: ChrStorage,
    mirroring: Mirroring,
}

impl Nrom {
    fn cpu_read(&self, address: u16) -> Result<Option<u8>, AddressDecodeError> {
        match address {
            0x6000..=0x7FFF => {
                let offset = usize::from(address - 0x6000);
                lookup(&self.prg_ram, offset, address, "PRG RAM").map(Some)
            }
            0x8000..=0xFFFF => {
                // 16KB images mirror into $C000-$FFFF
                let offset = usize::from(address - 0x8000) % self.prg_rom.len().max(1);
                lookup(&self.prg_rom, offset, address, "PRG ROM").map(Some)
            }
            _ => Ok(None),
        }
    }

    fn cpu_write(&mut self, address: u16, value: u8) {
        if let 0x6000..=0x7FFF = address {
            if let Some(cell) = self.prg_ram.get_mut(usize::from(address - 0x6000)) {
                *cell = value;
            }
        }
    }
}

/// Mapper 2: switchable 16KB at $8000, last bank fixed at $C000, CHR RAM
#[derive(Debug, Clone)]
pub struct Uxrom {
    prg_rom: Vec<u8>,
    chr: ChrStorage,
    mirroring: Mirroring,
    bank_count: u8,
    bank: u8,
}

impl Uxrom {
    fn cpu_read(&self, address: u16) -> Result<Option<u8>, AddressDecodeError> {
        let bank = match address {
            0x8000..=0xBFFF => self.bank,
            0xC000..=0xFFFF => self.bank_count - 1,
            _ => return Ok(None),
        };
        let offset = usize::from(bank) * PRG_BANK_SIZE + usize::from(address & 0x3FFF);
        lookup(&self.prg_rom, offset, address, "PRG ROM").map(Some)
    }

    fn cpu_write(&mut self, address: u16, value: u8) {
        if address >= 0x8000 {
            self.bank = value % self.bank_count;
        }
    }

    /// Currently selected bank at $8000
    pub fn bank(&self) -> u8 {
        self.bank
    }
}

fn lookup(
    storage: &[u8],
    offset: usize,
    address: u16,
    region: &'static str,
) -> Result<u8, AddressDecodeError> {
    storage
        .get(offset)
        .copied()
        .ok_or(AddressDecodeError { address, region })
}

/// Cartridge board, selected once from the image header
#[derive(Debug, Clone)]
pub enum Mapper {
    Nrom(Nrom),
    Uxrom(Uxrom),
}

impl Mapper {
    /// Validate an image and build its mapper
    pub fn from_image(image: CartridgeImage) -> Result<Self, MapperConfigError> {
        let CartridgeImage {
            mapper_id,
            prg_banks,
            chr_banks,
            mirroring,
            has_battery,
            prg_rom,
            chr_rom,
        } = image;

        if prg_rom.len() != usize::from(prg_banks) * PRG_BANK_SIZE {
            return Err(MapperConfigError::PrgSizeMismatch {
                declared_banks: prg_banks,
                actual_len: prg_rom.len(),
            });
        }
        if chr_rom.len() != usize::from(chr_banks) * CHR_BANK_SIZE {
            return Err(MapperConfigError::ChrSizeMismatch {
                declared_banks: chr_banks,
                actual_len: chr_rom.len(),
            });
        }

        let mapper = match mapper_id {
            0 => {
                if !(1..=2).contains(&prg_banks) {
                    return Err(MapperConfigError::InvalidPrgBanks { mapper: 0, banks: prg_banks });
                }
                if chr_banks > 1 {
                    return Err(MapperConfigError::InvalidChrBanks { mapper: 0, banks: chr_banks });
                }
                Mapper::Nrom(Nrom {
                    prg_rom,
                    prg_ram: vec![0; PRG_RAM_SIZE],
                    chr: ChrStorage::from_image(chr_rom, chr_banks),
                    mirroring,
                })
            }
            2 => {
                if !(2..=16).contains(&prg_banks) {
                    return Err(MapperConfigError::InvalidPrgBanks { mapper: 2, banks: prg_banks });
                }
                if chr_banks > 1 {
                    return Err(MapperConfigError::InvalidChrBanks { mapper: 2, banks: chr_banks });
                }
                Mapper::Uxrom(Uxrom {
                    prg_rom,
                    chr: ChrStorage::from_image(chr_rom, chr_banks),
                    mirroring,
                    bank_count: prg_banks,
                    bank: 0,
                })
            }
            other => return Err(MapperConfigError::UnsupportedMapper(other)),
        };

        debug!(
            mapper = mapper_id,
            prg_banks,
            chr_banks,
            ?mirroring,
            has_battery,
            "cartridge mapped"
        );
        Ok(mapper)
    }

    /// Read from cartridge space. `Ok(None)` means nothing drives the bus.
    pub fn cpu_read(&self, address: u16) -> Result<Option<u8>, AddressDecodeError> {
        match self {
            Mapper::Nrom(board) => board.cpu_read(address),
            Mapper::Uxrom(board) => board.cpu_read(address),
        }
    }

    /// Write to cartridge space (work RAM or bank registers)
    pub fn cpu_write(&mut self, address: u16, value: u8) {
        match self {
            Mapper::Nrom(board) => board.cpu_write(address, value),
            Mapper::Uxrom(board) => board.cpu_write(address, value),
        }
    }

    /// Pattern table contents the PPU is loaded with
    pub fn chr(&self) -> &[u8] {
        match self {
            Mapper::Nrom(board) => &board.chr.data,
            Mapper::Uxrom(board) => &board.chr.data,
        }
    }

    /// Whether pattern memory is writable
    pub fn chr_is_ram(&self) -> bool {
        match self {
            Mapper::Nrom(board) => board.chr.is_ram,
            Mapper::Uxrom(board) => board.chr.is_ram,
        }
    }

    pub fn mirroring(&self) -> Mirroring {
        match self {
            Mapper::Nrom(board) => board.mirroring,
            Mapper::Uxrom(board) => board.mirroring,
        }
    }

    /// iNES mapper number of this board
    pub fn id(&self) -> u8 {
        match self {
            Mapper::Nrom(_) => 0,
            Mapper::Uxrom(_) => 2,
        }
    }
}
