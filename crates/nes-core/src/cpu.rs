//! CPU module - 2A03 (6502 variant) implementation
//!
//! The NES uses a modified 6502 CPU without decimal mode. [`Cpu::step`]
//! executes one official instruction against a [`Bus`] and returns the cycles
//! it consumed, including page-crossing and branch penalties. Interrupt entry
//! is a separate transition, [`Cpu::interrupt`], driven by the scheduler.

use std::fmt;

use crate::interrupt::Interrupt;

const STACK_BASE: u16 = 0x0100;
const RESET_VECTOR: u16 = 0xFFFC;
const BRK_VECTOR: u16 = 0xFFFE;
const INTERRUPT_CYCLES: u8 = 7;

/// Memory interface the CPU executes against
pub trait Bus {
    fn read(&mut self, address: u16) -> u8;
    fn write(&mut self, address: u16, value: u8);
}

/// 2A03 CPU registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuRegisters {
    pub a: u8,   // Accumulator
    pub x: u8,   // X index register
    pub y: u8,   // Y index register
    pub sp: u8,  // Stack pointer (page 1)
    pub pc: u16, // Program counter
}

impl Default for CpuRegisters {
    fn default() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            pc: 0,
        }
    }
}

/// CPU status flags
///
/// Bit 5 always reads as set. The break flag only exists in the copy pushed
/// to the stack, so it is never held here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlags(u8);

impl StatusFlags {
    pub const CARRY: u8 = 0b0000_0001;
    pub const ZERO: u8 = 0b0000_0010;
    pub const INTERRUPT: u8 = 0b0000_0100;
    pub const DECIMAL: u8 = 0b0000_1000;
    pub const BREAK: u8 = 0b0001_0000;
    pub const UNUSED: u8 = 0b0010_0000;
    pub const OVERFLOW: u8 = 0b0100_0000;
    pub const NEGATIVE: u8 = 0b1000_0000;

    pub fn new(flags: u8) -> Self {
        Self((flags | Self::UNUSED) & !Self::BREAK)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Value pushed by PHP/BRK (`brk = true`) or by NMI/IRQ entry
    pub fn to_stack(self, brk: bool) -> u8 {
        if brk {
            self.0 | Self::BREAK
        } else {
            self.0
        }
    }

    pub fn carry(&self) -> bool {
        (self.0 & Self::CARRY) != 0
    }

    pub fn zero(&self) -> bool {
        (self.0 & Self::ZERO) != 0
    }

    pub fn interrupt(&self) -> bool {
        (self.0 & Self::INTERRUPT) != 0
    }

    pub fn decimal(&self) -> bool {
        (self.0 & Self::DECIMAL) != 0
    }

    pub fn overflow(&self) -> bool {
        (self.0 & Self::OVERFLOW) != 0
    }

    pub fn negative(&self) -> bool {
        (self.0 & Self::NEGATIVE) != 0
    }

    pub fn set_carry(&mut self, val: bool) {
        self.set(Self::CARRY, val);
    }

    pub fn set_zero(&mut self, val: bool) {
        self.set(Self::ZERO, val);
    }

    pub fn set_interrupt(&mut self, val: bool) {
        self.set(Self::INTERRUPT, val);
    }

    pub fn set_decimal(&mut self, val: bool) {
        self.set(Self::DECIMAL, val);
    }

    pub fn set_overflow(&mut self, val: bool) {
        self.set(Self::OVERFLOW, val);
    }

    pub fn set_negative(&mut self, val: bool) {
        self.set(Self::NEGATIVE, val);
    }

    fn set(&mut self, mask: u8, val: bool) {
        self.0 = if val { self.0 | mask } else { self.0 & !mask };
    }
}

impl Default for StatusFlags {
    fn default() -> Self {
        Self::new(Self::INTERRUPT)
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [char; 8] = ['C', 'Z', 'I', 'D', 'B', '-', 'V', 'N'];
        for bit in (0..8).rev() {
            let name = NAMES[bit];
            if self.0 & (1 << bit) != 0 {
                write!(f, "{}", name)?;
            } else {
                write!(f, "{}", name.to_ascii_lowercase())?;
            }
        }
        Ok(())
    }
}

/// Raised when the byte at PC is not an official opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError {
    pub opcode: u8,
    pub address: u16,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Illegal opcode 0x{:02X} at ${:04X}",
            self.opcode, self.address
        )
    }
}

impl std::error::Error for DecodeError {}

/// CPU Addressing Modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

/// Official 6502 mnemonics
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[rustfmt::skip]
pub enum Opcode {
    ADC, AND, ASL, BCC, BCS, BEQ, BIT, BMI, BNE, BPL, BRK, BVC, BVS, CLC,
    CLD, CLI, CLV, CMP, CPX, CPY, DEC, DEX, DEY, EOR, INC, INX, INY, JMP,
    JSR, LDA, LDX, LDY, LSR, NOP, ORA, PHA, PHP, PLA, PLP, ROL, ROR, RTI,
    RTS, SBC, SEC, SED, SEI, STA, STX, STY, TAX, TAY, TSX, TXA, TXS, TYA,
}

/// Decoded instruction information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionInfo {
    pub opcode: Opcode,
    pub mode: AddressingMode,
    /// Base cycle cost
    pub cycles: u8,
    /// +1 cycle when the indexed address crosses a page
    pub page_penalty: bool,
}

const fn op(
    opcode: Opcode,
    mode: AddressingMode,
    cycles: u8,
    page_penalty: bool,
) -> InstructionInfo {
    InstructionInfo {
        opcode,
        mode,
        cycles,
        page_penalty,
    }
}

/// Look up an opcode byte. Returns `None` for unofficial opcodes.
pub fn decode(byte: u8) -> Option<InstructionInfo> {
    use AddressingMode::*;
    use Opcode::*;

    let info = match byte {
        0x69 => op(ADC, Immediate, 2, false),
        0x65 => op(ADC, ZeroPage, 3, false),
        0x75 => op(ADC, ZeroPageX, 4, false),
        0x6D => op(ADC, Absolute, 4, false),
        0x7D => op(ADC, AbsoluteX, 4, true),
        0x79 => op(ADC, AbsoluteY, 4, true),
        0x61 => op(ADC, IndirectX, 6, false),
        0x71 => op(ADC, IndirectY, 5, true),

        0x29 => op(AND, Immediate, 2, false),
        0x25 => op(AND, ZeroPage, 3, false),
        0x35 => op(AND, ZeroPageX, 4, false),
        0x2D => op(AND, Absolute, 4, false),
        0x3D => op(AND, AbsoluteX, 4, true),
        0x39 => op(AND, AbsoluteY, 4, true),
        0x21 => op(AND, IndirectX, 6, false),
        0x31 => op(AND, IndirectY, 5, true),

        0x0A => op(ASL, Accumulator, 2, false),
        0x06 => op(ASL, ZeroPage, 5, false),
        0x16 => op(ASL, ZeroPageX, 6, false),
        0x0E => op(ASL, Absolute, 6, false),
        0x1E => op(ASL, AbsoluteX, 7, false),

        0x90 => op(BCC, Relative, 2, false),
        0xB0 => op(BCS, Relative, 2, false),
        0xF0 => op(BEQ, Relative, 2, false),
        0x30 => op(BMI, Relative, 2, false),
        0xD0 => op(BNE, Relative, 2, false),
        0x10 => op(BPL, Relative, 2, false),
        0x50 => op(BVC, Relative, 2, false),
        0x70 => op(BVS, Relative, 2, false),

        0x24 => op(BIT, ZeroPage, 3, false),
        0x2C => op(BIT, Absolute, 4, false),

        0x00 => op(BRK, Implied, 7, false),

        0x18 => op(CLC, Implied, 2, false),
        0xD8 => op(CLD, Implied, 2, false),
        0x58 => op(CLI, Implied, 2, false),
        0xB8 => op(CLV, Implied, 2, false),

        0xC9 => op(CMP, Immediate, 2, false),
        0xC5 => op(CMP, ZeroPage, 3, false),
        0xD5 => op(CMP, ZeroPageX, 4, false),
        0xCD => op(CMP, Absolute, 4, false),
        0xDD => op(CMP, AbsoluteX, 4, true),
        0xD9 => op(CMP, AbsoluteY, 4, true),
        0xC1 => op(CMP, IndirectX, 6, false),
        0xD1 => op(CMP, IndirectY, 5, true),

        0xE0 => op(CPX, Immediate, 2, false),
        0xE4 => op(CPX, ZeroPage, 3, false),
        0xEC => op(CPX, Absolute, 4, false),

        0xC0 => op(CPY, Immediate, 2, false),
        0xC4 => op(CPY, ZeroPage, 3, false),
        0xCC => op(CPY, Absolute, 4, false),

        0xC6 => op(DEC, ZeroPage, 5, false),
        0xD6 => op(DEC, ZeroPageX, 6, false),
        0xCE => op(DEC, Absolute, 6, false),
        0xDE => op(DEC, AbsoluteX, 7, false),

        0xCA => op(DEX, Implied, 2, false),
        0x88 => op(DEY, Implied, 2, false),

        0x49 => op(EOR, Immediate, 2, false),
        0x45 => op(EOR, ZeroPage, 3, false),
        0x55 => op(EOR, ZeroPageX, 4, false),
        0x4D => op(EOR, Absolute, 4, false),
        0x5D => op(EOR, AbsoluteX, 4, true),
        0x59 => op(EOR, AbsoluteY, 4, true),
        0x41 => op(EOR, IndirectX, 6, false),
        0x51 => op(EOR, IndirectY, 5, true),

        0xE6 => op(INC, ZeroPage, 5, false),
        0xF6 => op(INC, ZeroPageX, 6, false),
        0xEE => op(INC, Absolute, 6, false),
        0xFE => op(INC, AbsoluteX, 7, false),

        0xE8 => op(INX, Implied, 2, false),
        0xC8 => op(INY, Implied, 2, false),

        0x4C => op(JMP, Absolute, 3, false),
        0x6C => op(JMP, Indirect, 5, false),
        0x20 => op(JSR, Absolute, 6, false),

        0xA9 => op(LDA, Immediate, 2, false),
        0xA5 => op(LDA, ZeroPage, 3, false),
        0xB5 => op(LDA, ZeroPageX, 4, false),
        0xAD => op(LDA, Absolute, 4, false),
        0xBD => op(LDA, AbsoluteX, 4, true),
        0xB9 => op(LDA, AbsoluteY, 4, true),
        0xA1 => op(LDA, IndirectX, 6, false),
        0xB1 => op(LDA, IndirectY, 5, true),

        0xA2 => op(LDX, Immediate, 2, false),
        0xA6 => op(LDX, ZeroPage, 3, false),
        0xB6 => op(LDX, ZeroPageY, 4, false),
        0xAE => op(LDX, Absolute, 4, false),
        0xBE => op(LDX, AbsoluteY, 4, true),

        0xA0 => op(LDY, Immediate, 2, false),
        0xA4 => op(LDY, ZeroPage, 3, false),
        0xB4 => op(LDY, ZeroPageX, 4, false),
        0xAC => op(LDY, Absolute, 4, false),
        0xBC => op(LDY, AbsoluteX, 4, true),

        0x4A => op(LSR, Accumulator, 2, false),
        0x46 => op(LSR, ZeroPage, 5, false),
        0x56 => op(LSR, ZeroPageX, 6, false),
        0x4E => op(LSR, Absolute, 6, false),
        0x5E => op(LSR, AbsoluteX, 7, false),

        0xEA => op(NOP, Implied, 2, false),

        0x09 => op(ORA, Immediate, 2, false),
        0x05 => op(ORA, ZeroPage, 3, false),
        0x15 => op(ORA, ZeroPageX, 4, false),
        0x0D => op(ORA, Absolute, 4, false),
        0x1D => op(ORA, AbsoluteX, 4, true),
        0x19 => op(ORA, AbsoluteY, 4, true),
        0x01 => op(ORA, IndirectX, 6, false),
        0x11 => op(ORA, IndirectY, 5, true),

        0x48 => op(PHA, Implied, 3, false),
        0x08 => op(PHP, Implied, 3, false),
        0x68 => op(PLA, Implied, 4, false),
        0x28 => op(PLP, Implied, 4, false),

        0x2A => op(ROL, Accumulator, 2, false),
        0x26 => op(ROL, ZeroPage, 5, false),
        0x36 => op(ROL, ZeroPageX, 6, false),
        0x2E => op(ROL, Absolute, 6, false),
        0x3E => op(ROL, AbsoluteX, 7, false),

        0x6A => op(ROR, Accumulator, 2, false),
        0x66 => op(ROR, ZeroPage, 5, false),
        0x76 => op(ROR, ZeroPageX, 6, false),
        0x6E => op(ROR, Absolute, 6, false),
        0x7E => op(ROR, AbsoluteX, 7, false),

        0x40 => op(RTI, Implied, 6, false),
        0x60 => op(RTS, Implied, 6, false),

        0xE9 => op(SBC, Immediate, 2, false),
        0xE5 => op(SBC, ZeroPage, 3, false),
        0xF5 => op(SBC, ZeroPageX, 4, false),
        0xED => op(SBC, Absolute, 4, false),
        0xFD => op(SBC, AbsoluteX, 4, true),
        0xF9 => op(SBC, AbsoluteY, 4, true),
        0xE1 => op(SBC, IndirectX, 6, false),
        0xF1 => op(SBC, IndirectY, 5, true),

        0x38 => op(SEC, Implied, 2, false),
        0xF8 => op(SED, Implied, 2, false),
        0x78 => op(SEI, Implied, 2, false),

        0x85 => op(STA, ZeroPage, 3, false),
        0x95 => op(STA, ZeroPageX, 4, false),
        0x8D => op(STA, Absolute, 4, false),
        0x9D => op(STA, AbsoluteX, 5, false),
        0x99 => op(STA, AbsoluteY, 5, false),
        0x81 => op(STA, IndirectX, 6, false),
        0x91 => op(STA, IndirectY, 6, false),

        0x86 => op(STX, ZeroPage, 3, false),
        0x96 => op(STX, ZeroPageY, 4, false),
        0x8E => op(STX, Absolute, 4, false),

        0x84 => op(STY, ZeroPage, 3, false),
        0x94 => op(STY, ZeroPageX, 4, false),
        0x8C => op(STY, Absolute, 4, false),

        0xAA => op(TAX, Implied, 2, false),
        0xA8 => op(TAY, Implied, 2, false),
        0xBA => op(TSX, Implied, 2, false),
        0x8A => op(TXA, Implied, 2, false),
        0x9A => op(TXS, Implied, 2, false),
        0x98 => op(TYA, Implied, 2, false),

        _ => return None,
    };
    Some(info)
}

fn page_crossed(from: u16, to: u16) -> bool {
    (from & 0xFF00) != (to & 0xFF00)
}

/// The 2A03 CPU core
#[derive(Debug, Clone, Default)]
pub struct Cpu {
    registers: CpuRegisters,
    status: StatusFlags,
    /// Total cycles since power-on, including DMA stalls
    cycles: u64,
}

impl Cpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset: load PC from $FFFC, disable interrupts, spend 7 cycles
    pub fn reset(&mut self, bus: &mut impl Bus) {
        self.registers.sp = 0xFD;
        self.status.set_interrupt(true);
        self.registers.pc = self.read_word(bus, RESET_VECTOR);
        self.cycles += u64::from(INTERRUPT_CYCLES);
    }

    pub fn registers(&self) -> &CpuRegisters {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut CpuRegisters {
        &mut self.registers
    }

    pub fn status(&self) -> StatusFlags {
        self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusFlags {
        &mut self.status
    }

    pub fn total_cycles(&self) -> u64 {
        self.cycles
    }

    /// Account for cycles the CPU spends halted (OAM/DMC DMA)
    pub fn add_stall(&mut self, cycles: u32) {
        self.cycles += u64::from(cycles);
    }

    /// Execute one instruction and return the cycles it took
    pub fn step(&mut self, bus: &mut impl Bus) -> Result<u8, DecodeError> {
        let address = self.registers.pc;
        let opcode = bus.read(address);
        let info = decode(opcode).ok_or(DecodeError { opcode, address })?;
        self.registers.pc = address.wrapping_add(1);

        let (operand, crossed) = self.operand_address(bus, info.mode);
        let mut cycles = info.cycles;
        if info.page_penalty && crossed {
            cycles += 1;
        }
        cycles += self.execute(bus, info, operand, crossed);

        self.cycles += u64::from(cycles);
        Ok(cycles)
    }

    /// Enter an interrupt handler: push PC and P, set I, jump through the vector
    pub fn interrupt(&mut self, bus: &mut impl Bus, kind: Interrupt) -> u8 {
        self.push_word(bus, self.registers.pc);
        self.push(bus, self.status.to_stack(false));
        self.status.set_interrupt(true);
        self.registers.pc = self.read_word(bus, kind.vector());
        self.cycles += u64::from(INTERRUPT_CYCLES);
        INTERRUPT_CYCLES
    }

    fn fetch(&mut self, bus: &mut impl Bus) -> u8 {
        let value = bus.read(self.registers.pc);
        self.registers.pc = self.registers.pc.wrapping_add(1);
        value
    }

    fn fetch_word(&mut self, bus: &mut impl Bus) -> u16 {
        let lo = self.fetch(bus);
        let hi = self.fetch(bus);
        u16::from_le_bytes([lo, hi])
    }

    fn read_word(&mut self, bus: &mut impl Bus, address: u16) -> u16 {
        let lo = bus.read(address);
        let hi = bus.read(address.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    /// Pointer read that wraps within the zero page
    fn read_zero_page_word(&mut self, bus: &mut impl Bus, pointer: u8) -> u16 {
        let lo = bus.read(u16::from(pointer));
        let hi = bus.read(u16::from(pointer.wrapping_add(1)));
        u16::from_le_bytes([lo, hi])
    }

    fn push(&mut self, bus: &mut impl Bus, value: u8) {
        bus.write(STACK_BASE | u16::from(self.registers.sp), value);
        self.registers.sp = self.registers.sp.wrapping_sub(1);
    }

    fn pull(&mut self, bus: &mut impl Bus) -> u8 {
        self.registers.sp = self.registers.sp.wrapping_add(1);
        bus.read(STACK_BASE | u16::from(self.registers.sp))
    }

    fn push_word(&mut self, bus: &mut impl Bus, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.push(bus, hi);
        self.push(bus, lo);
    }

    fn pull_word(&mut self, bus: &mut impl Bus) -> u16 {
        let lo = self.pull(bus);
        let hi = self.pull(bus);
        u16::from_le_bytes([lo, hi])
    }

    /// Resolve the effective address and whether indexing crossed a page
    fn operand_address(&mut self, bus: &mut impl Bus, mode: AddressingMode) -> (u16, bool) {
        match mode {
            AddressingMode::Implied | AddressingMode::Accumulator => (0, false),
            AddressingMode::Immediate => {
                let address = self.registers.pc;
                self.registers.pc = address.wrapping_add(1);
                (address, false)
            }
            AddressingMode::ZeroPage => (u16::from(self.fetch(bus)), false),
            AddressingMode::ZeroPageX => {
                let base = self.fetch(bus);
                (u16::from(base.wrapping_add(self.registers.x)), false)
            }
            AddressingMode::ZeroPageY => {
                let base = self.fetch(bus);
                (u16::from(base.wrapping_add(self.registers.y)), false)
            }
            AddressingMode::Absolute => (self.fetch_word(bus), false),
            AddressingMode::AbsoluteX => {
                let base = self.fetch_word(bus);
                let address = base.wrapping_add(u16::from(self.registers.x));
                (address, page_crossed(base, address))
            }
            AddressingMode::AbsoluteY => {
                let base = self.fetch_word(bus);
                let address = base.wrapping_add(u16::from(self.registers.y));
                (address, page_crossed(base, address))
            }
            AddressingMode::Indirect => {
                // The high byte is fetched without carrying into the page
                let pointer = self.fetch_word(bus);
                let lo = bus.read(pointer);
                let hi = bus.read((pointer & 0xFF00) | (pointer.wrapping_add(1) & 0x00FF));
                (u16::from_le_bytes([lo, hi]), false)
            }
            AddressingMode::IndirectX => {
                let pointer = self.fetch(bus).wrapping_add(self.registers.x);
                (self.read_zero_page_word(bus, pointer), false)
            }
            AddressingMode::IndirectY => {
                let pointer = self.fetch(bus);
                let base = self.read_zero_page_word(bus, pointer);
                let address = base.wrapping_add(u16::from(self.registers.y));
                (address, page_crossed(base, address))
            }
            AddressingMode::Relative => {
                let offset = self.fetch(bus) as i8;
                let target = self.registers.pc.wrapping_add(offset as u16);
                (target, page_crossed(self.registers.pc, target))
            }
        }
    }

    /// Run the operation; returns extra cycles (taken branches only)
    fn execute(
        &mut self,
        bus: &mut impl Bus,
        info: InstructionInfo,
        address: u16,
        crossed: bool,
    ) -> u8 {
        let mode = info.mode;
        match info.opcode {
            // Loads and stores
            Opcode::LDA => {
                let value = bus.read(address);
                self.op_lda(value);
            }
            Opcode::LDX => {
                let value = bus.read(address);
                self.op_ldx(value);
            }
            Opcode::LDY => {
                let value = bus.read(address);
                self.op_ldy(value);
            }
            Opcode::STA => bus.write(address, self.registers.a),
            Opcode::STX => bus.write(address, self.registers.x),
            Opcode::STY => bus.write(address, self.registers.y),

            // Register transfers
            Opcode::TAX => self.op_tax(),
            Opcode::TAY => self.op_tay(),
            Opcode::TSX => self.op_tsx(),
            Opcode::TXA => self.op_txa(),
            Opcode::TXS => self.registers.sp = self.registers.x,
            Opcode::TYA => self.op_tya(),

            // Arithmetic and logic
            Opcode::ADC => {
                let value = bus.read(address);
                self.op_adc(value);
            }
            Opcode::SBC => {
                let value = bus.read(address);
                self.op_adc(!value);
            }
            Opcode::AND => {
                let value = bus.read(address);
                self.op_and(value);
            }
            Opcode::EOR => {
                let value = bus.read(address);
                self.op_eor(value);
            }
            Opcode::ORA => {
                let value = bus.read(address);
                self.op_ora(value);
            }
            Opcode::CMP => {
                let value = bus.read(address);
                self.op_compare(self.registers.a, value);
            }
            Opcode::CPX => {
                let value = bus.read(address);
                self.op_compare(self.registers.x, value);
            }
            Opcode::CPY => {
                let value = bus.read(address);
                self.op_compare(self.registers.y, value);
            }
            Opcode::BIT => {
                let value = bus.read(address);
                self.op_bit(value);
            }

            // Read-modify-write
            Opcode::ASL => self.modify(bus, mode, address, Self::op_asl),
            Opcode::LSR => self.modify(bus, mode, address, Self::op_lsr),
            Opcode::ROL => self.modify(bus, mode, address, Self::op_rol),
            Opcode::ROR => self.modify(bus, mode, address, Self::op_ror),
            Opcode::INC => self.modify(bus, mode, address, Self::op_inc),
            Opcode::DEC => self.modify(bus, mode, address, Self::op_dec),
            Opcode::INX => {
                self.registers.x = self.registers.x.wrapping_add(1);
                self.set_flags_zn(self.registers.x);
            }
            Opcode::INY => {
                self.registers.y = self.registers.y.wrapping_add(1);
                self.set_flags_zn(self.registers.y);
            }
            Opcode::DEX => {
                self.registers.x = self.registers.x.wrapping_sub(1);
                self.set_flags_zn(self.registers.x);
            }
            Opcode::DEY => {
                self.registers.y = self.registers.y.wrapping_sub(1);
                self.set_flags_zn(self.registers.y);
            }

            // Branches
            Opcode::BCC => return self.op_branch(!self.status.carry(), address, crossed),
            Opcode::BCS => return self.op_branch(self.status.carry(), address, crossed),
            Opcode::BEQ => return self.op_branch(self.status.zero(), address, crossed),
            Opcode::BNE => return self.op_branch(!self.status.zero(), address, crossed),
            Opcode::BMI => return self.op_branch(self.status.negative(), address, crossed),
            Opcode::BPL => return self.op_branch(!self.status.negative(), address, crossed),
            Opcode::BVS => return self.op_branch(self.status.overflow(), address, crossed),
            Opcode::BVC => return self.op_branch(!self.status.overflow(), address, crossed),

            // Jumps and subroutines
            Opcode::JMP => self.registers.pc = address,
            Opcode::JSR => {
                let return_address = self.registers.pc.wrapping_sub(1);
                self.push_word(bus, return_address);
                self.registers.pc = address;
            }
            Opcode::RTS => {
                self.registers.pc = self.pull_word(bus).wrapping_add(1);
            }
            Opcode::RTI => {
                let flags = self.pull(bus);
                self.status = StatusFlags::new(flags);
                self.registers.pc = self.pull_word(bus);
            }
            Opcode::BRK => {
                // BRK skips a padding byte
                let return_address = self.registers.pc.wrapping_add(1);
                self.push_word(bus, return_address);
                self.push(bus, self.status.to_stack(true));
                self.status.set_interrupt(true);
                self.registers.pc = self.read_word(bus, BRK_VECTOR);
            }

            // Stack
            Opcode::PHA => self.push(bus, self.registers.a),
            Opcode::PHP => self.push(bus, self.status.to_stack(true)),
            Opcode::PLA => {
                self.registers.a = self.pull(bus);
                self.set_flags_zn(self.registers.a);
            }
            Opcode::PLP => {
                let flags = self.pull(bus);
                self.status = StatusFlags::new(flags);
            }

            // Flags
            Opcode::CLC => self.status.set_carry(false),
            Opcode::SEC => self.status.set_carry(true),
            Opcode::CLD => self.status.set_decimal(false),
            Opcode::SED => self.status.set_decimal(true),
            Opcode::CLI => self.status.set_interrupt(false),
            Opcode::SEI => self.status.set_interrupt(true),
            Opcode::CLV => self.status.set_overflow(false),

            Opcode::NOP => {}
        }
        0
    }

    fn modify(
        &mut self,
        bus: &mut impl Bus,
        mode: AddressingMode,
        address: u16,
        operation: fn(&mut Self, u8) -> u8,
    ) {
        if mode == AddressingMode::Accumulator {
            let value = self.registers.a;
            self.registers.a = operation(self, value);
        } else {
            let value = bus.read(address);
            let result = operation(self, value);
            bus.write(address, result);
        }
    }

    fn op_lda(&mut self, value: u8) {
        self.registers.a = value;
        self.set_flags_zn(value);
    }

    fn op_ldx(&mut self, value: u8) {
        self.registers.x = value;
        self.set_flags_zn(value);
    }

    fn op_ldy(&mut self, value: u8) {
        self.registers.y = value;
        self.set_flags_zn(value);
    }

    fn op_tax(&mut self) {
        self.registers.x = self.registers.a;
        self.set_flags_zn(self.registers.x);
    }

    fn op_tay(&mut self) {
        self.registers.y = self.registers.a;
        self.set_flags_zn(self.registers.y);
    }

    fn op_tsx(&mut self) {
        self.registers.x = self.registers.sp;
        self.set_flags_zn(self.registers.x);
    }

    fn op_txa(&mut self) {
        self.registers.a = self.registers.x;
        self.set_flags_zn(self.registers.a);
    }

    fn op_tya(&mut self) {
        self.registers.a = self.registers.y;
        self.set_flags_zn(self.registers.a);
    }

    /// Binary add with carry; SBC feeds the complemented operand
    fn op_adc(&mut self, value: u8) {
        let a = self.registers.a;
        let sum = u16::from(a) + u16::from(value) + u16::from(self.status.carry());
        let result = sum as u8;
        self.status.set_carry(sum > 0xFF);
        self.status
            .set_overflow(((a ^ result) & (value ^ result) & 0x80) != 0);
        self.registers.a = result;
        self.set_flags_zn(result);
    }

    fn op_and(&mut self, value: u8) {
        self.registers.a &= value;
        self.set_flags_zn(self.registers.a);
    }

    fn op_eor(&mut self, value: u8) {
        self.registers.a ^= value;
        self.set_flags_zn(self.registers.a);
    }

    fn op_ora(&mut self, value: u8) {
        self.registers.a |= value;
        self.set_flags_zn(self.registers.a);
    }

    fn op_compare(&mut self, register: u8, value: u8) {
        self.status.set_carry(register >= value);
        self.set_flags_zn(register.wrapping_sub(value));
    }

    fn op_bit(&mut self, value: u8) {
        self.status.set_zero((self.registers.a & value) == 0);
        self.status.set_overflow((value & 0x40) != 0);
        self.status.set_negative((value & 0x80) != 0);
    }

    fn op_asl(&mut self, value: u8) -> u8 {
        self.status.set_carry((value & 0x80) != 0);
        let result = value << 1;
        self.set_flags_zn(result);
        result
    }

    fn op_lsr(&mut self, value: u8) -> u8 {
        self.status.set_carry((value & 0x01) != 0);
        let result = value >> 1;
        self.set_flags_zn(result);
        result
    }

    fn op_rol(&mut self, value: u8) -> u8 {
        let result = (value << 1) | u8::from(self.status.carry());
        self.status.set_carry((value & 0x80) != 0);
        self.set_flags_zn(result);
        result
    }

    fn op_ror(&mut self, value: u8) -> u8 {
        let result = (value >> 1) | (u8::from(self.status.carry()) << 7);
        self.status.set_carry((value & 0x01) != 0);
        self.set_flags_zn(result);
        result
    }

    fn op_inc(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.set_flags_zn(result);
        result
    }

    fn op_dec(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.set_flags_zn(result);
        result
    }

    /// Taken branches cost 1 extra cycle, 2 when crossing a page
    fn op_branch(&mut self, condition: bool, target: u16, crossed: bool) -> u8 {
        if !condition {
            return 0;
        }
        self.registers.pc = target;
        if crossed {
            2
        } else {
            1
        }
    }

    fn set_flags_zn(&mut self, value: u8) {
        self.status.set_zero(value == 0);
        self.status.set_negative((value & 0x80) != 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatBus {
        memory: Vec<u8>,
    }

    impl FlatBus {
        /// Program at $8000 with the reset vector pointing at it
        fn with_program(program: &[u8]) -> Self {
            let mut memory = vec![0; 0x10000];
            memory[0x8000..0x8000 + program.len()].copy_from_slice(program);
            memory[0xFFFC] = 0x00;
            memory[0xFFFD] = 0x80;
            Self { memory }
        }
    }

    impl Bus for FlatBus {
        fn read(&mut self, address: u16) -> u8 {
            self.memory[usize::from(address)]
        }

        fn write(&mut self, address: u16, value: u8) {
            self.memory[usize::from(address)] = value;
        }
    }

    fn boot(program: &[u8]) -> (Cpu, FlatBus) {
        let mut bus = FlatBus::with_program(program);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        (cpu, bus)
    }

    #[test]
    fn test_reset_loads_vector() {
        let (cpu, _) = boot(&[]);
        assert_eq!(cpu.registers().pc, 0x8000);
        assert_eq!(cpu.registers().sp, 0xFD);
        assert!(cpu.status().interrupt());
        assert_eq!(cpu.total_cycles(), 7);
    }

    #[test]
    fn test_lda_immediate_flags() {
        let (mut cpu, mut bus) = boot(&[0xA9, 0x00, 0xA9, 0x80]);
        assert_eq!(cpu.step(&mut bus).unwrap(), 2);
        assert!(cpu.status().zero());
        cpu.step(&mut bus).unwrap();
        assert!(cpu.status().negative());
        assert!(!cpu.status().zero());
        assert_eq!(cpu.registers().a, 0x80);
    }

    #[test]
    fn test_adc_overflow_and_carry() {
        // LDA #$50; ADC #$50 -> $A0, V set, C clear
        let (mut cpu, mut bus) = boot(&[0xA9, 0x50, 0x69, 0x50, 0x69, 0x70]);
        cpu.step(&mut bus).unwrap();
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.registers().a, 0xA0);
        assert!(cpu.status().overflow());
        assert!(!cpu.status().carry());
        // $A0 + $70 = $110 -> carry out
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.registers().a, 0x10);
        assert!(cpu.status().carry());
        assert!(!cpu.status().overflow());
    }

    #[test]
    fn test_sbc_borrow() {
        // SEC; LDA #$05; SBC #$06 -> $FF, carry clear (borrow)
        let (mut cpu, mut bus) = boot(&[0x38, 0xA9, 0x05, 0xE9, 0x06]);
        for _ in 0..3 {
            cpu.step(&mut bus).unwrap();
        }
        assert_eq!(cpu.registers().a, 0xFF);
        assert!(!cpu.status().carry());
        assert!(cpu.status().negative());
    }

    #[test]
    fn test_absolute_x_page_cross_penalty() {
        // LDX #$01; LDA $80FF,X (crosses); LDA $8000,X (no cross)
        let (mut cpu, mut bus) = boot(&[0xA2, 0x01, 0xBD, 0xFF, 0x80, 0xBD, 0x00, 0x80]);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.step(&mut bus).unwrap(), 5);
        assert_eq!(cpu.step(&mut bus).unwrap(), 4);
    }

    #[test]
    fn test_store_indexed_has_no_penalty() {
        // LDX #$01; STA $02FF,X
        let (mut cpu, mut bus) = boot(&[0xA2, 0x01, 0x9D, 0xFF, 0x02]);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.step(&mut bus).unwrap(), 5);
    }

    #[test]
    fn test_indirect_y_page_cross() {
        // LDY #$10; LDA ($20),Y with ($20) = $01F8
        let (mut cpu, mut bus) = boot(&[0xA0, 0x10, 0xB1, 0x20]);
        bus.memory[0x20] = 0xF8;
        bus.memory[0x21] = 0x01;
        bus.memory[0x0208] = 0x99;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.step(&mut bus).unwrap(), 6);
        assert_eq!(cpu.registers().a, 0x99);
    }

    #[test]
    fn test_zero_page_x_wraps() {
        // LDX #$FF; LDA $10,X reads $000F
        let (mut cpu, mut bus) = boot(&[0xA2, 0xFF, 0xB5, 0x10]);
        bus.memory[0x0F] = 0x42;
        cpu.step(&mut bus).unwrap();
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.registers().a, 0x42);
    }

    #[test]
    fn test_branch_cycles() {
        // CLC; BCS +2 (not taken); BCC +0 (taken, same page)
        let (mut cpu, mut bus) = boot(&[0x18, 0xB0, 0x02, 0x90, 0x00]);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.step(&mut bus).unwrap(), 2);
        assert_eq!(cpu.step(&mut bus).unwrap(), 3);
        assert_eq!(cpu.registers().pc, 0x8005);
    }

    #[test]
    fn test_branch_page_cross_cycles() {
        // BNE -128 from $8002 lands on $7F82
        let (mut cpu, mut bus) = boot(&[0xD0, 0x80]);
        assert_eq!(cpu.step(&mut bus).unwrap(), 4);
        assert_eq!(cpu.registers().pc, 0x7F82);
    }

    #[test]
    fn test_jmp_indirect_page_wrap() {
        let (mut cpu, mut bus) = boot(&[0x6C, 0xFF, 0x02]);
        bus.memory[0x02FF] = 0x34;
        bus.memory[0x0200] = 0x12;
        bus.memory[0x0300] = 0xEE;
        assert_eq!(cpu.step(&mut bus).unwrap(), 5);
        assert_eq!(cpu.registers().pc, 0x1234);
    }

    #[test]
    fn test_jsr_rts() {
        // JSR $8010 ... at $8010: RTS
        let mut program = vec![0x20, 0x10, 0x80];
        program.resize(0x10, 0xEA);
        program.push(0x60);
        let (mut cpu, mut bus) = boot(&program);

        assert_eq!(cpu.step(&mut bus).unwrap(), 6);
        assert_eq!(cpu.registers().pc, 0x8010);
        assert_eq!(bus.memory[0x01FD], 0x80);
        assert_eq!(bus.memory[0x01FC], 0x02);

        assert_eq!(cpu.step(&mut bus).unwrap(), 6);
        assert_eq!(cpu.registers().pc, 0x8003);
        assert_eq!(cpu.registers().sp, 0xFD);
    }

    #[test]
    fn test_brk_and_rti() {
        let (mut cpu, mut bus) = boot(&[0x00, 0xEA, 0xEA]);
        bus.memory[0xFFFE] = 0x00;
        bus.memory[0xFFFF] = 0x90;
        bus.memory[0x9000] = 0x40; // RTI

        assert_eq!(cpu.step(&mut bus).unwrap(), 7);
        assert_eq!(cpu.registers().pc, 0x9000);
        // Pushed P carries B and bit 5
        assert_eq!(bus.memory[0x01FB] & 0x30, 0x30);

        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.registers().pc, 0x8002);
        assert_eq!(cpu.registers().sp, 0xFD);
    }

    #[test]
    fn test_interrupt_pushes_three_bytes() {
        let (mut cpu, mut bus) = boot(&[0x58]); // CLI
        bus.memory[0xFFFA] = 0x00;
        bus.memory[0xFFFB] = 0xA0;
        cpu.step(&mut bus).unwrap();
        assert!(!cpu.status().interrupt());

        let sp_before = cpu.registers().sp;
        assert_eq!(cpu.interrupt(&mut bus, Interrupt::Nmi), 7);
        assert_eq!(sp_before.wrapping_sub(cpu.registers().sp), 3);
        assert!(cpu.status().interrupt());
        assert_eq!(cpu.registers().pc, 0xA000);
        // Return address then P with B clear
        assert_eq!(bus.memory[0x01FD], 0x80);
        assert_eq!(bus.memory[0x01FC], 0x01);
        assert_eq!(bus.memory[0x01FB] & StatusFlags::BREAK, 0);
    }

    #[test]
    fn test_php_plp_break_bit() {
        // PHP; PLP
        let (mut cpu, mut bus) = boot(&[0x08, 0x28]);
        cpu.step(&mut bus).unwrap();
        assert_eq!(bus.memory[0x01FD] & 0x30, 0x30);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.status().bits() & StatusFlags::BREAK, 0);
        assert_ne!(cpu.status().bits() & StatusFlags::UNUSED, 0);
    }

    #[test]
    fn test_rotate_accumulator() {
        // SEC; LDA #$01; ROR A -> $80, carry set
        let (mut cpu, mut bus) = boot(&[0x38, 0xA9, 0x01, 0x6A]);
        for _ in 0..3 {
            cpu.step(&mut bus).unwrap();
        }
        assert_eq!(cpu.registers().a, 0x80);
        assert!(cpu.status().carry());
        assert!(cpu.status().negative());
    }

    #[test]
    fn test_inc_memory_cycles() {
        // INC $0300,X
        let (mut cpu, mut bus) = boot(&[0xFE, 0x00, 0x03]);
        bus.memory[0x0300] = 0xFF;
        assert_eq!(cpu.step(&mut bus).unwrap(), 7);
        assert_eq!(bus.memory[0x0300], 0x00);
        assert!(cpu.status().zero());
    }

    #[test]
    fn test_compare_sets_carry() {
        // LDA #$40; CMP #$40; CMP #$41
        let (mut cpu, mut bus) = boot(&[0xA9, 0x40, 0xC9, 0x40, 0xC9, 0x41]);
        cpu.step(&mut bus).unwrap();
        cpu.step(&mut bus).unwrap();
        assert!(cpu.status().carry());
        assert!(cpu.status().zero());
        cpu.step(&mut bus).unwrap();
        assert!(!cpu.status().carry());
        assert!(cpu.status().negative());
    }

    #[test]
    fn test_illegal_opcode_reports_address() {
        let (mut cpu, mut bus) = boot(&[0xEA, 0x02]);
        cpu.step(&mut bus).unwrap();
        let err = cpu.step(&mut bus).unwrap_err();
        assert_eq!(
            err,
            DecodeError {
                opcode: 0x02,
                address: 0x8001
            }
        );
        assert_eq!(err.to_string(), "Illegal opcode 0x02 at $8001");
    }

    #[test]
    fn test_official_opcode_count() {
        let official = (0..=255u8).filter(|byte| decode(*byte).is_some()).count();
        assert_eq!(official, 151);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(StatusFlags::new(0x24).to_string(), "nv-bdIzc");
    }
}
