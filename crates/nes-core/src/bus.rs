//! Memory bus and mapping
//!
//! The NES memory map:
//! $0000-$07FF - 2KB Internal RAM
//! $0800-$1FFF - RAM mirroring (repeats every $0800 bytes)
//! $2000-$2007 - PPU registers
//! $2008-$3FFF - PPU register mirroring (every $08 bytes)
//! $4000-$4017 - APU and I/O registers
//! $4018-$401F - Disabled test registers (open bus)
//! $4020-$FFFF - Cartridge space
//!
//! The bus owns every unit the CPU can reach. Reads and writes refresh the
//! open-bus latch, which answers for anything nothing drives.

use std::fmt;

use tracing::{debug, error};

use crate::apu::Apu;
use crate::cartridge::Mapper;
use crate::config::NesConfig;
use crate::controller::{Buttons, ControllerPort, StandardController};
use crate::cpu::Bus as CpuBus;
use crate::interrupt::InterruptLine;
use crate::ppu::Ppu;

/// RAM size in bytes
pub const RAM_SIZE: usize = 2048; // 2KB

/// CPU cycles stolen by each DMC sample fetch
const DMC_STALL_CYCLES: u32 = 4;

/// A mapper translated a CPU address to storage it does not have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressDecodeError {
    pub address: u16,
    /// Storage the address was translated into
    pub region: &'static str,
}

impl fmt::Display for AddressDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Address ${:04X} translates outside of {}",
            self.address, self.region
        )
    }
}

impl std::error::Error for AddressDecodeError {}

/// Memory bus structure
#[derive(Debug, Clone)]
pub struct Bus {
    /// 2KB internal RAM (with mirroring)
    ram: [u8; RAM_SIZE],
    ppu: Ppu,
    apu: Apu,
    mapper: Mapper,
    controllers: [StandardController; 2],
    interrupts: InterruptLine,
    /// Last value seen on the data bus
    open_bus: u8,
    /// Set by a $4014 write, consumed by the scheduler
    oam_dma: bool,
    /// DMC fetch cycles not yet charged to the CPU
    stall_cycles: u32,
    fault: Option<AddressDecodeError>,
}

impl Bus {
    /// Create a bus around a cartridge and load its patterns into the PPU
    pub fn new(mapper: Mapper, config: &NesConfig) -> Self {
        let mut ppu = Ppu::new();
        ppu.load_cartridge(mapper.chr(), mapper.chr_is_ram(), mapper.mirroring());
        Self {
            ram: [0; RAM_SIZE],
            ppu,
            apu: Apu::new(config),
            mapper,
            controllers: [StandardController::new(), StandardController::new()],
            interrupts: InterruptLine::new(),
            open_bus: 0,
            oam_dma: false,
            stall_cycles: 0,
            fault: None,
        }
    }

    /// Reset the PPU and APU registers and drop pending interrupts
    pub fn reset(&mut self) {
        self.ppu.reset();
        self.apu.reset();
        self.interrupts.clear();
        self.oam_dma = false;
        self.stall_cycles = 0;
    }

    /// Step the PPU `dots` times, forwarding its vblank output
    pub fn tick_ppu(&mut self, dots: u32) {
        for _ in 0..dots {
            self.ppu.step();
            if self.ppu.take_nmi() {
                self.interrupts.raise_nmi();
            }
        }
    }

    /// Step the APU `cycles` times, serving DMC fetches and updating IRQ
    pub fn tick_apu(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.apu.step();
            if let Some(address) = self.apu.dmc_dma_request() {
                let value = self.read_byte(address);
                self.apu.dmc_fill(value);
                self.stall_cycles += DMC_STALL_CYCLES;
            }
        }
        self.interrupts.set_irq(self.apu.irq_asserted());
    }

    pub fn set_buttons(&mut self, port: ControllerPort, buttons: Buttons) {
        self.controllers[port.index()].set_buttons(buttons);
    }

    /// Whether a $4014 transfer happened since the last call
    pub fn take_oam_dma(&mut self) -> bool {
        std::mem::take(&mut self.oam_dma)
    }

    /// DMC stall cycles accumulated since the last call
    pub fn take_stall_cycles(&mut self) -> u32 {
        std::mem::take(&mut self.stall_cycles)
    }

    /// First mapper fault since the last call
    pub fn take_fault(&mut self) -> Option<AddressDecodeError> {
        self.fault.take()
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn ppu_mut(&mut self) -> &mut Ppu {
        &mut self.ppu
    }

    pub fn apu(&self) -> &Apu {
        &self.apu
    }

    pub fn apu_mut(&mut self) -> &mut Apu {
        &mut self.apu
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn interrupts(&self) -> &InterruptLine {
        &self.interrupts
    }

    pub fn interrupts_mut(&mut self) -> &mut InterruptLine {
        &mut self.interrupts
    }

    pub fn open_bus(&self) -> u8 {
        self.open_bus
    }

    /// Read internal RAM without side effects
    pub fn peek_ram(&self, address: u16) -> u8 {
        self.ram[usize::from(address) & (RAM_SIZE - 1)]
    }

    fn read_byte(&mut self, address: u16) -> u8 {
        let value = match address {
            0x0000..=0x1FFF => self.ram[usize::from(address) & (RAM_SIZE - 1)],
            0x2000..=0x3FFF => {
                let value = self.ppu.read_register(address);
                if address & 0x0007 == 2 {
                    self.interrupts.acknowledge_nmi();
                }
                value
            }
            0x4015 => self.apu.read_status() | (self.open_bus & 0x20),
            0x4016 => self.controllers[0].read() | (self.open_bus & 0xE0),
            0x4017 => self.controllers[1].read() | (self.open_bus & 0xE0),
            // Write-only APU registers and the disabled test range
            0x4000..=0x401F => self.open_bus,
            _ => match self.mapper.cpu_read(address) {
                Ok(Some(value)) => value,
                Ok(None) => self.open_bus,
                Err(fault) => {
                    self.latch_fault(fault);
                    self.open_bus
                }
            },
        };
        self.open_bus = value;
        value
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        self.open_bus = value;
        match address {
            0x0000..=0x1FFF => self.ram[usize::from(address) & (RAM_SIZE - 1)] = value,
            0x2000..=0x3FFF => self.ppu.write_register(address, value),
            0x4014 => self.oam_dma_transfer(value),
            0x4016 => {
                for controller in &mut self.controllers {
                    controller.write_strobe(value);
                }
            }
            0x4000..=0x4017 => self.apu.write_register(address, value),
            0x4018..=0x401F => {}
            _ => self.mapper.cpu_write(address, value),
        }
    }

    /// Copy page `page` into OAM; the scheduler charges the stall
    fn oam_dma_transfer(&mut self, page: u8) {
        let base = u16::from(page) << 8;
        for offset in 0..=0xFF {
            let value = self.read_byte(base | offset);
            self.ppu.write_oam_dma(value);
        }
        self.oam_dma = true;
    }

    fn latch_fault(&mut self, fault: AddressDecodeError) {
        if self.fault.is_none() {
            error!(address = fault.address, region = fault.region, "mapper fault");
            self.fault = Some(fault);
        } else {
            debug!(address = fault.address, "additional mapper fault");
        }
    }
}

impl CpuBus for Bus {
    fn read(&mut self, address: u16) -> u8 {
        self.read_byte(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        self.write_byte(address, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::{CartridgeImage, Mirroring, PRG_BANK_SIZE};
    use crate::ppu::PpuCtrl;

    fn nrom_bus() -> Bus {
        let mut prg = vec![0xEA; PRG_BANK_SIZE];
        prg[0x1000] = 0x77;
        let image = CartridgeImage::nrom(prg, vec![0; 0x2000], Mirroring::Horizontal);
        let mapper = Mapper::from_image(image).unwrap();
        Bus::new(mapper, &NesConfig::default())
    }

    #[test]
    fn test_bus_read_write() {
        let mut bus = nrom_bus();

        bus.write(0x0000, 0x42);
        assert_eq!(bus.read(0x0000), 0x42);
        assert_eq!(bus.read(0x0800), 0x42);
        assert_eq!(bus.read(0x1800), 0x42);

        bus.write(0x1FFF, 0x43);
        assert_eq!(bus.read(0x07FF), 0x43);
    }

    #[test]
    fn test_ppu_register_mirroring() {
        let mut bus = nrom_bus();
        // $3FFE/$3FFF act as $2006/$2007
        bus.write(0x3FFE, 0x21);
        bus.write(0x3FFE, 0x00);
        bus.write(0x3FFF, 0x5A);
        assert_eq!(bus.ppu().peek(0x2100), 0x5A);
    }

    #[test]
    fn test_prg_rom_mirrored() {
        let mut bus = nrom_bus();
        assert_eq!(bus.read(0x9000), 0x77);
        assert_eq!(bus.read(0xD000), 0x77);
    }

    #[test]
    fn test_open_bus() {
        let mut bus = nrom_bus();
        // Last byte on the bus answers for unmapped reads
        bus.write(0x0010, 0x5C);
        assert_eq!(bus.read(0x4018), 0x5C);
        assert_eq!(bus.read(0x4000), 0x5C);

        bus.write(0x0010, 0xAB);
        assert_eq!(bus.read(0x5000), 0xAB);
    }

    #[test]
    fn test_controller_read() {
        let mut bus = nrom_bus();
        bus.set_buttons(ControllerPort::One, Buttons::new(Buttons::A | Buttons::SELECT));
        bus.write(0x4016, 1);
        bus.write(0x4016, 0);

        let bits: Vec<u8> = (0..4).map(|_| bus.read(0x4016) & 0x01).collect();
        assert_eq!(bits, vec![1, 0, 1, 0]);
    }

    #[test]
    fn test_controller_open_bus_bits() {
        let mut bus = nrom_bus();
        bus.write(0x0000, 0x40);
        let value = bus.read(0x4016);
        assert_eq!(value & 0xE0, 0x40);
    }

    #[test]
    fn test_oam_dma() {
        let mut bus = nrom_bus();
        for i in 0..=0xFFu16 {
            bus.write(0x0200 + i, i as u8);
        }
        bus.write(0x4014, 0x02);
        assert!(bus.take_oam_dma());
        assert!(!bus.take_oam_dma());
        assert_eq!(bus.ppu().oam()[0], 0x00);
        assert_eq!(bus.ppu().oam()[0x80], 0x80);
        assert_eq!(bus.ppu().oam()[0xFF], 0xFF);
    }

    #[test]
    fn test_nmi_forwarded_to_interrupt_line() {
        let mut bus = nrom_bus();
        bus.write(0x2000, PpuCtrl::NMI_ENABLE);
        bus.tick_ppu(341 * 262);
        assert_eq!(bus.interrupts().nmi_count(), 1);
        assert!(bus.interrupts_mut().take_nmi());
    }

    #[test]
    fn test_status_read_acknowledges_nmi() {
        let mut bus = nrom_bus();
        bus.write(0x2000, PpuCtrl::NMI_ENABLE);
        bus.tick_ppu(341 * 243);
        assert!(bus.interrupts().nmi_pending());
        let status = bus.read(0x2002);
        assert_eq!(status & 0x80, 0x80);
        assert!(!bus.interrupts().nmi_pending());
    }

    #[test]
    fn test_apu_frame_irq_level() {
        let mut bus = nrom_bus();
        bus.tick_apu(29_829);
        assert!(bus.interrupts().irq());
        bus.read(0x4015);
        bus.tick_apu(1);
        assert!(!bus.interrupts().irq());
    }

    #[test]
    fn test_dmc_fetch_stalls() {
        let mut bus = nrom_bus();
        bus.write(0x4012, 0x00);
        bus.write(0x4013, 0x00);
        bus.write(0x4015, 0x10);
        bus.tick_apu(1);
        assert_eq!(bus.take_stall_cycles(), 4);
        assert_eq!(bus.take_stall_cycles(), 0);
    }
}
