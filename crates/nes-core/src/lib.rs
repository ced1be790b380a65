//! NES Core - Pure Rust NES emulator library
//!
//! This crate provides the cycle-driven emulation logic for a Nintendo
//! Entertainment System (NTSC): the 2A03 CPU, the 2C02 PPU, the APU, the
//! memory bus and cartridge mappers. It takes an already-parsed
//! [`CartridgeImage`] and produces frames of palette indices and mixed audio
//! samples; ROM files, windows and audio devices are left to the host.

#![forbid(unsafe_code)]

/// APU (Audio Processing Unit): channels, frame sequencer and mixer
pub mod apu;
/// Memory bus and mapping
pub mod bus;
/// Cartridge and mapper support
pub mod cartridge;
/// Timing constants and host settings
pub mod config;
/// Standard controller input
pub mod controller;
/// CPU module containing the 2A03 (6502 variant) implementation
pub mod cpu;
/// Interrupt line between the units and the CPU
pub mod interrupt;
/// PPU (Picture Processing Unit) implementation
pub mod ppu;
/// Scheduler tying all components together
pub mod system;

pub use bus::AddressDecodeError;
pub use cartridge::{CartridgeImage, Mapper, MapperConfigError, Mirroring};
pub use config::NesConfig;
pub use controller::{Buttons, ControllerPort};
pub use cpu::DecodeError;
pub use ppu::{Frame, FRAME_HEIGHT, FRAME_WIDTH};
pub use system::{NesError, NesSystem};
