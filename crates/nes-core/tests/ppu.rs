//! PPU tests for the NES emulator

use nes_core::cartridge::Mirroring;
use nes_core::ppu::{
    Frame, Ppu, PpuCtrl, PpuMask, ScanlinePhase, DOTS_PER_SCANLINE, SCANLINES_PER_FRAME,
};

const DOTS_PER_FRAME: u32 = DOTS_PER_SCANLINE as u32 * SCANLINES_PER_FRAME as u32;

#[test]
fn test_ppu_power_on_position() {
    let ppu = Ppu::new();
    assert_eq!(ppu.scanline(), 261);
    assert_eq!(ppu.dot(), 0);
    assert_eq!(ppu.phase(), ScanlinePhase::PreRender);
}

#[test]
fn test_full_traversal_hands_off_one_frame() {
    let mut ppu = Ppu::new();
    ppu.write_register(0, PpuCtrl::NMI_ENABLE);

    for frame in 1..=3u64 {
        let mut handoffs = 0;
        let mut nmis = 0;
        for _ in 0..DOTS_PER_FRAME {
            ppu.step();
            if ppu.take_frame().is_some() {
                handoffs += 1;
            }
            if ppu.take_nmi() {
                nmis += 1;
            }
        }
        assert_eq!(handoffs, 1);
        assert_eq!(nmis, 1);
        assert_eq!(ppu.frames_completed(), frame);
        // Rendering is off, so every frame is full length
        assert_eq!((ppu.scanline(), ppu.dot()), (261, 0));
    }
}

#[test]
fn test_no_nmi_when_disabled() {
    let mut ppu = Ppu::new();
    for _ in 0..DOTS_PER_FRAME {
        ppu.step();
        assert!(!ppu.take_nmi());
    }
    assert!(ppu.take_frame().is_some());
}

#[test]
fn test_scroll_double_write() {
    let mut ppu = Ppu::new();
    ppu.write_register(5, 0x7D);
    ppu.write_register(5, 0x5E);
    assert_eq!(ppu.scroll(), (0x7D, 0x5E));
}

#[test]
fn test_scroll_status_read_resets_toggle() {
    let mut ppu = Ppu::new();
    ppu.write_register(5, 0x10);
    let _ = ppu.read_register(2);
    ppu.write_register(5, 0x23);
    // Second write went to X again, Y untouched
    assert_eq!(ppu.scroll(), (0x23, 0x00));
}

#[test]
fn test_scroll_without_status_read() {
    let mut ppu = Ppu::new();
    ppu.write_register(5, 0x10);
    ppu.write_register(5, 0x23);
    assert_eq!(ppu.scroll(), (0x10, 0x23));
}

#[test]
fn test_address_double_write_overrides_nametable_select() {
    let mut ppu = Ppu::new();
    ppu.write_register(0, 0x03);
    ppu.write_register(6, 0x00);
    ppu.write_register(6, 0x00);
    assert_eq!(ppu.vram_address(), 0x0000);

    ppu.write_register(0, 0x01);
    ppu.write_register(6, 0x24);
    ppu.write_register(6, 0x10);
    assert_eq!(ppu.vram_address(), 0x2410);
}

fn set_address(ppu: &mut Ppu, address: u16) {
    ppu.write_register(6, (address >> 8) as u8);
    ppu.write_register(6, address as u8);
}

fn next_frame(ppu: &mut Ppu) -> Frame {
    loop {
        ppu.step();
        if let Some(frame) = ppu.take_frame() {
            return frame;
        }
    }
}

#[test]
fn test_horizontal_scroll_shifts_rendered_pixels() {
    // Tile 1 is solid color 1; only name table column 2 of row 0 uses it
    let mut chr = vec![0u8; 0x2000];
    chr[16..24].fill(0xFF);
    let mut ppu = Ppu::new();
    ppu.load_cartridge(&chr, false, Mirroring::Vertical);
    set_address(&mut ppu, 0x2002);
    ppu.write_register(7, 0x01);
    set_address(&mut ppu, 0x3F00);
    ppu.write_register(7, 0x0F);
    ppu.write_register(7, 0x30);

    set_address(&mut ppu, 0x0000);
    ppu.write_register(0, 0x00);
    // Coarse X 1, fine X 3
    ppu.write_register(5, 11);
    ppu.write_register(5, 0);
    ppu.write_register(1, PpuMask::RENDER_BG | PpuMask::RENDER_BG_LEFT);

    let frame = next_frame(&mut ppu);
    // World x 16..24 lands on screen x 5..13
    assert_eq!(frame.pixel(4, 0), 0x0F);
    for x in 5..13 {
        assert_eq!(frame.pixel(x, 0), 0x30, "x = {}", x);
    }
    assert_eq!(frame.pixel(13, 0), 0x0F);
    assert_eq!(frame.pixel(5, 7), 0x30);
    assert_eq!(frame.pixel(5, 8), 0x0F);
}
