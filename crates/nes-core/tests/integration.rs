//! Integration tests for the NES system

use nes_core::cartridge::{CartridgeImage, Mapper, MapperConfigError, Mirroring, PRG_BANK_SIZE};
use nes_core::config::{NesConfig, CPU_CYCLES_PER_FRAME};
use nes_core::controller::{Buttons, ControllerPort};
use nes_core::cpu::DecodeError;
use nes_core::system::{NesError, NesSystem};
use pretty_assertions::assert_eq;

const NMI_HANDLER: usize = 0x40;

/// Palette and background setup, NMI on, then spin
const DISPLAY_PROGRAM: &[u8] = &[
    0x78, // SEI
    0xD8, // CLD
    0xA2, 0xFF, // LDX #$FF
    0x9A, // TXS
    0xA9, 0x3F, 0x8D, 0x06, 0x20, // LDA #$3F; STA $2006
    0xA9, 0x00, 0x8D, 0x06, 0x20, // LDA #$00; STA $2006
    0xA9, 0x0F, 0x8D, 0x07, 0x20, // backdrop black
    0xA9, 0x30, 0x8D, 0x07, 0x20, // color 1 white
    0xA9, 0x00, 0x8D, 0x06, 0x20, 0x8D, 0x06, 0x20, // VRAM address $0000
    0x8D, 0x05, 0x20, 0x8D, 0x05, 0x20, // scroll (0, 0)
    0xA9, 0x0A, 0x8D, 0x01, 0x20, // background on, left column on
    0xA9, 0x80, 0x8D, 0x00, 0x20, // NMI on
    0x4C, 0x31, 0x80, // JMP $8031
];

/// INC $10; RTI
const COUNTING_NMI: &[u8] = &[0xE6, 0x10, 0x40];

fn display_system() -> NesSystem {
    NesSystem::new(image(DISPLAY_PROGRAM, COUNTING_NMI), NesConfig::default()).unwrap()
}

fn image(program: &[u8], nmi: &[u8]) -> CartridgeImage {
    let mut prg = vec![0xEA; PRG_BANK_SIZE];
    prg[..program.len()].copy_from_slice(program);
    prg[NMI_HANDLER..NMI_HANDLER + nmi.len()].copy_from_slice(nmi);
    prg[0x3FFA..].copy_from_slice(&[0x40, 0x80, 0x00, 0x80, 0x40, 0x80]);

    // Tile 0: vertical stripes of colors 1 and 0
    let mut chr = vec![0; 0x2000];
    chr[..8].fill(0xAA);
    CartridgeImage::nrom(prg, chr, Mirroring::Vertical)
}

#[test]
fn test_synthetic_cartridge_renders_and_interrupts() {
    let mut system = display_system();

    system.run_cycles(CPU_CYCLES_PER_FRAME).unwrap();
    let frame = system.take_frame().expect("a frame within one frame of cycles");
    assert!(!frame.is_blank());
    assert_eq!(frame.pixel(8, 100), 0x30);
    assert_eq!(frame.pixel(9, 100), 0x0F);

    // Let the CPU enter and return from the handler
    system.run_cycles(100).unwrap();
    assert_eq!(system.bus().interrupts().nmi_count(), 1);
    assert_eq!(system.bus().peek_ram(0x0010), 1);
}

#[test]
fn test_one_nmi_per_frame() {
    let mut system = display_system();
    for _ in 0..5 {
        system.run_frame().unwrap();
    }
    system.run_cycles(100).unwrap();
    assert_eq!(system.frame_count(), 5);
    assert_eq!(system.bus().interrupts().nmi_count(), 5);
    assert_eq!(system.bus().peek_ram(0x0010), 5);
}

#[test]
fn test_audio_drained_per_frame() {
    let mut system = display_system();
    system.run_frame().unwrap();
    system.drain_samples();
    system.run_frame().unwrap();
    let samples = system.drain_samples();
    assert!((730..=740).contains(&samples.len()));
}

#[test]
fn test_interrupt_entry_pushes_three_bytes() {
    let mut system = display_system();
    system.run_frame().unwrap();
    let sp = system.cpu().registers().sp;

    assert_eq!(system.advance(), Ok(7));
    assert_eq!(system.cpu().registers().sp, sp.wrapping_sub(3));
    assert!(system.cpu().status().interrupt());
    assert_eq!(system.cpu().registers().pc, 0x8040);
}

#[test]
fn test_decode_error_halts_run() {
    // NOP; then an unofficial opcode
    let mut system = NesSystem::new(image(&[0xEA, 0x12], &[0x40]), NesConfig::default()).unwrap();
    let expected = NesError::Decode(DecodeError {
        opcode: 0x12,
        address: 0x8001,
    });
    assert_eq!(system.run_frame().unwrap_err(), expected);
    assert_eq!(system.advance(), Err(expected));
}

#[test]
fn test_mapper_config_errors_at_load() {
    let mut bad_size = image(&[], &[]);
    bad_size.prg_banks = 2;
    assert_eq!(
        NesSystem::new(bad_size, NesConfig::default()).unwrap_err(),
        NesError::MapperConfig(MapperConfigError::PrgSizeMismatch {
            declared_banks: 2,
            actual_len: PRG_BANK_SIZE,
        })
    );

    let mut unsupported = image(&[], &[]);
    unsupported.mapper_id = 1;
    assert!(matches!(
        Mapper::from_image(unsupported),
        Err(MapperConfigError::UnsupportedMapper(1))
    ));
}

#[test]
fn test_controller_visible_to_program() {
    // Strobe, read A into $20, spin
    let program = [
        0xA9, 0x01, 0x8D, 0x16, 0x40, // LDA #1; STA $4016
        0xA9, 0x00, 0x8D, 0x16, 0x40, // LDA #0; STA $4016
        0xAD, 0x16, 0x40, // LDA $4016
        0x85, 0x20, // STA $20
        0x4C, 0x0F, 0x80, // JMP $800F
    ];
    let mut system = NesSystem::new(image(&program, &[0x40]), NesConfig::default()).unwrap();
    system.set_buttons(ControllerPort::One, Buttons::new(Buttons::A));
    system.run_cycles(100).unwrap();
    // Bit 0 is A, bits 5-7 come from the address high byte
    assert_eq!(system.bus().peek_ram(0x0020), 0x41);
}

#[test]
fn test_uxrom_bank_switching() {
    let mut prg = vec![0xEA; PRG_BANK_SIZE * 4];
    for bank in 0..4 {
        prg[bank * PRG_BANK_SIZE] = bank as u8;
    }
    // Fixed last bank: LDA #2; STA $8000; LDA $8000; STA $30; JMP *
    let fixed = 3 * PRG_BANK_SIZE;
    let program = [
        0xA9, 0x02, 0x8D, 0x00, 0x80, 0xAD, 0x00, 0x80, 0x85, 0x30, 0x4C, 0x0A, 0xC0,
    ];
    prg[fixed..fixed + program.len()].copy_from_slice(&program);
    prg[fixed + 0x3FFA..fixed + 0x4000].copy_from_slice(&[0x00, 0xC0, 0x00, 0xC0, 0x00, 0xC0]);

    let image = CartridgeImage {
        mapper_id: 2,
        prg_banks: 4,
        chr_banks: 0,
        mirroring: Mirroring::Horizontal,
        has_battery: false,
        prg_rom: prg,
        chr_rom: Vec::new(),
    };
    let mut system = NesSystem::new(image, NesConfig::default()).unwrap();
    system.run_cycles(50).unwrap();
    assert_eq!(system.bus().peek_ram(0x0030), 2);
    assert_eq!(system.bus().mapper().id(), 2);
    match system.bus().mapper() {
        Mapper::Uxrom(board) => assert_eq!(board.bank(), 2),
        other => panic!("expected UxROM, got {:?}", other),
    }
}
