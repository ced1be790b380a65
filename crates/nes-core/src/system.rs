//! NES System Integration
//!
//! `NesSystem` is the scheduler: it runs one CPU instruction (or interrupt
//! entry) at a time and then catches the PPU and APU up by the cycles it
//! consumed, so all three stay in lock-step at instruction granularity.

use std::fmt;

use tracing::{debug, error};

use crate::apu::Apu;
use crate::bus::{AddressDecodeError, Bus};
use crate::cartridge::{CartridgeImage, Mapper, MapperConfigError};
use crate::config::{NesConfig, APU_TICKS_PER_CPU_CYCLE, PPU_DOTS_PER_CPU_CYCLE};
use crate::controller::{Buttons, ControllerPort};
use crate::cpu::{Cpu, DecodeError};
use crate::interrupt::Interrupt;
use crate::ppu::{Frame, Ppu};

/// CPU cycles halted by a $4014 transfer, plus one when it starts on an odd cycle
const OAM_DMA_STALL_CYCLES: u32 = 513;

/// Any error surfaced by the emulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NesError {
    /// Cartridge rejected at load time
    MapperConfig(MapperConfigError),
    /// CPU fetched an opcode it does not implement
    Decode(DecodeError),
    /// Cartridge address translated outside its storage
    AddressDecode(AddressDecodeError),
}

impl fmt::Display for NesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NesError::MapperConfig(e) => write!(f, "Cartridge error: {}", e),
            NesError::Decode(e) => write!(f, "CPU error: {}", e),
            NesError::AddressDecode(e) => write!(f, "Bus error: {}", e),
        }
    }
}

impl std::error::Error for NesError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NesError::MapperConfig(e) => Some(e),
            NesError::Decode(e) => Some(e),
            NesError::AddressDecode(e) => Some(e),
        }
    }
}

impl From<MapperConfigError> for NesError {
    fn from(e: MapperConfigError) -> Self {
        NesError::MapperConfig(e)
    }
}

impl From<DecodeError> for NesError {
    fn from(e: DecodeError) -> Self {
        NesError::Decode(e)
    }
}

impl From<AddressDecodeError> for NesError {
    fn from(e: AddressDecodeError) -> Self {
        NesError::AddressDecode(e)
    }
}

/// NES System - integrates all components
#[derive(Debug, Clone)]
pub struct NesSystem {
    cpu: Cpu,
    bus: Bus,
    config: NesConfig,
    /// Frames returned by `run_frame`
    frame_count: u64,
    /// Error that stopped the run; repeated by every later `advance`
    halted: Option<NesError>,
}

impl NesSystem {
    /// Map the cartridge and power on
    pub fn new(image: CartridgeImage, config: NesConfig) -> Result<Self, NesError> {
        let mapper = Mapper::from_image(image)?;
        let mut system = Self {
            cpu: Cpu::new(),
            bus: Bus::new(mapper, &config),
            config,
            frame_count: 0,
            halted: None,
        };
        system.reset();
        Ok(system)
    }

    /// Press the reset button
    pub fn reset(&mut self) {
        self.bus.reset();
        let before = self.cpu.total_cycles();
        self.cpu.reset(&mut self.bus);
        let cycles = (self.cpu.total_cycles() - before) as u32;
        self.clock_units(cycles);
        self.halted = None;
        debug!(pc = self.cpu.registers().pc, "system reset");
    }

    /// Run one instruction or interrupt entry and clock the other units.
    ///
    /// Returns the CPU cycles consumed, DMA stalls included.
    pub fn advance(&mut self) -> Result<u32, NesError> {
        if let Some(err) = self.halted {
            return Err(err);
        }

        let mut cycles = if self.bus.interrupts_mut().take_nmi() {
            u32::from(self.cpu.interrupt(&mut self.bus, Interrupt::Nmi))
        } else if self.bus.interrupts().irq() && !self.cpu.status().interrupt() {
            u32::from(self.cpu.interrupt(&mut self.bus, Interrupt::Irq))
        } else {
            match self.cpu.step(&mut self.bus) {
                Ok(cycles) => u32::from(cycles),
                Err(e) => return Err(self.halt(e.into())),
            }
        };

        if self.bus.take_oam_dma() {
            let stall = OAM_DMA_STALL_CYCLES + (self.cpu.total_cycles() & 1) as u32;
            self.cpu.add_stall(stall);
            cycles += stall;
        }
        self.clock_units(cycles);

        let dmc_stall = self.bus.take_stall_cycles();
        if dmc_stall > 0 {
            self.cpu.add_stall(dmc_stall);
            self.clock_units(dmc_stall);
            cycles += dmc_stall;
        }

        if let Some(fault) = self.bus.take_fault() {
            return Err(self.halt(fault.into()));
        }
        Ok(cycles)
    }

    fn clock_units(&mut self, cycles: u32) {
        self.bus.tick_ppu(cycles * PPU_DOTS_PER_CPU_CYCLE);
        self.bus.tick_apu(cycles * APU_TICKS_PER_CPU_CYCLE);
    }

    fn halt(&mut self, err: NesError) -> NesError {
        error!(
            error = %err,
            pc = self.cpu.registers().pc,
            cycles = self.cpu.total_cycles(),
            "emulation halted"
        );
        self.halted = Some(err);
        err
    }

    /// Run until the PPU completes a frame
    pub fn run_frame(&mut self) -> Result<Frame, NesError> {
        loop {
            self.advance()?;
            if let Some(frame) = self.bus.ppu_mut().take_frame() {
                self.frame_count += 1;
                return Ok(frame);
            }
        }
    }

    /// Run until at least `cycles` more CPU cycles have elapsed
    pub fn run_cycles(&mut self, cycles: u64) -> Result<(), NesError> {
        let target = self.cpu.total_cycles() + cycles;
        while self.cpu.total_cycles() < target {
            self.advance()?;
        }
        Ok(())
    }

    /// Set the live button state of one controller
    pub fn set_buttons(&mut self, port: ControllerPort, buttons: Buttons) {
        self.bus.set_buttons(port, buttons);
    }

    /// Completed frame waiting for the host, if any
    pub fn take_frame(&mut self) -> Option<Frame> {
        self.bus.ppu_mut().take_frame()
    }

    /// Audio samples produced since the last drain
    pub fn drain_samples(&mut self) -> Vec<f32> {
        self.bus.apu_mut().drain_samples()
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn ppu(&self) -> &Ppu {
        self.bus.ppu()
    }

    pub fn apu(&self) -> &Apu {
        self.bus.apu()
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    pub fn config(&self) -> &NesConfig {
        &self.config
    }

    /// Frames returned by `run_frame` since power-on
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn total_cycles(&self) -> u64 {
        self.cpu.total_cycles()
    }

    /// Error that halted the run, if any
    pub fn halted(&self) -> Option<NesError> {
        self.halted
    }
}
