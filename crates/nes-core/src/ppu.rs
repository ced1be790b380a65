//! PPU (Picture Processing Unit) implementation
//!
//! The 2C02 walks 262 scanlines of 341 dots each per NTSC frame:
//! - 0-239: visible, one pixel per dot for dots 1-256
//! - 240: post-render (idle)
//! - 241-260: vertical blank, flagged at 241 dot 1
//! - 261: pre-render, clears status and reloads vertical scroll
//!
//! Background pixels come from a pair of 16-bit pattern shift registers fed
//! by name-table, attribute and pattern fetches every 8 dots, addressed by the
//! internal `v`/`t`/fine-x scroll registers. Up to 8 sprites per line are
//! evaluated at dot 257 for the following line. The frame buffer holds
//! palette indices (0-63); RGB conversion is left to the host.

use tracing::trace;

use crate::cartridge::Mirroring;

/// Frame width in pixels
pub const FRAME_WIDTH: usize = 256;
/// Frame height in pixels
pub const FRAME_HEIGHT: usize = 240;
pub const DOTS_PER_SCANLINE: u16 = 341;
pub const SCANLINES_PER_FRAME: u16 = 262;
/// Palette RAM: 8 palettes x 4 entries
pub const PALETTE_SIZE: usize = 32;
/// Object Attribute Memory: 64 sprites x 4 bytes
pub const OAM_SIZE: usize = 256;

const PATTERN_SIZE: usize = 0x2000;
const NAMETABLE_RAM_SIZE: usize = 0x1000;
const POST_RENDER_SCANLINE: u16 = 240;
const VBLANK_SCANLINE: u16 = 241;
const PRE_RENDER_SCANLINE: u16 = 261;
const MAX_SPRITES_PER_LINE: usize = 8;

/// Where the PPU is within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanlinePhase {
    PreRender,
    Visible,
    PostRender,
    VerticalBlank,
}

impl ScanlinePhase {
    pub fn of(scanline: u16) -> Self {
        match scanline {
            0..=239 => ScanlinePhase::Visible,
            POST_RENDER_SCANLINE => ScanlinePhase::PostRender,
            VBLANK_SCANLINE..=260 => ScanlinePhase::VerticalBlank,
            _ => ScanlinePhase::PreRender,
        }
    }
}

/// PPU control flags ($2000)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpuCtrl(u8);

impl PpuCtrl {
    pub const NMI_ENABLE: u8 = 0b1000_0000;
    pub const SPRITE_SIZE: u8 = 0b0010_0000;
    pub const BG_PATTERN_TABLE: u8 = 0b0001_0000;
    pub const SPR_PATTERN_TABLE: u8 = 0b0000_1000;
    pub const VRAM_INC: u8 = 0b0000_0100;
    pub const NAMETABLE: u8 = 0b0000_0011;

    pub fn new(val: u8) -> Self {
        Self(val)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn nmi_enable(&self) -> bool {
        (self.0 & Self::NMI_ENABLE) != 0
    }

    /// Sprite height in pixels (8 or 16)
    pub fn sprite_height(&self) -> u16 {
        if (self.0 & Self::SPRITE_SIZE) != 0 {
            16
        } else {
            8
        }
    }

    pub fn background_table(&self) -> u16 {
        if (self.0 & Self::BG_PATTERN_TABLE) != 0 {
            0x1000
        } else {
            0x0000
        }
    }

    pub fn sprite_table(&self) -> u16 {
        if (self.0 & Self::SPR_PATTERN_TABLE) != 0 {
            0x1000
        } else {
            0x0000
        }
    }

    /// VRAM address step after a $2007 access
    pub fn vram_increment(&self) -> u16 {
        if (self.0 & Self::VRAM_INC) != 0 {
            32
        } else {
            1
        }
    }

    pub fn nametable(&self) -> u8 {
        self.0 & Self::NAMETABLE
    }
}

/// PPU status flags ($2002)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpuStatus(u8);

impl PpuStatus {
    pub const VBLANK: u8 = 0b1000_0000;
    pub const SPRITE_ZERO_HIT: u8 = 0b0100_0000;
    pub const SPRITE_OVERFLOW: u8 = 0b0010_0000;

    pub fn new(val: u8) -> Self {
        Self(val)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn vblank(&self) -> bool {
        (self.0 & Self::VBLANK) != 0
    }

    pub fn sprite_zero_hit(&self) -> bool {
        (self.0 & Self::SPRITE_ZERO_HIT) != 0
    }

    pub fn sprite_overflow(&self) -> bool {
        (self.0 & Self::SPRITE_OVERFLOW) != 0
    }

    fn insert(&mut self, mask: u8) {
        self.0 |= mask;
    }

    fn remove(&mut self, mask: u8) {
        self.0 &= !mask;
    }
}

/// PPU render mask flags ($2001)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpuMask(u8);

impl PpuMask {
    pub const GRAYSCALE: u8 = 0b0000_0001;
    pub const RENDER_BG_LEFT: u8 = 0b0000_0010;
    pub const RENDER_SPR_LEFT: u8 = 0b0000_0100;
    pub const RENDER_BG: u8 = 0b0000_1000;
    pub const RENDER_SPR: u8 = 0b0001_0000;

    pub fn new(val: u8) -> Self {
        Self(val)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn render_background(&self) -> bool {
        (self.0 & Self::RENDER_BG) != 0
    }

    pub fn render_sprites(&self) -> bool {
        (self.0 & Self::RENDER_SPR) != 0
    }

    pub fn grayscale(&self) -> bool {
        (self.0 & Self::GRAYSCALE) != 0
    }

    fn background_visible_at(&self, x: u16) -> bool {
        self.render_background() && (x >= 8 || (self.0 & Self::RENDER_BG_LEFT) != 0)
    }

    fn sprites_visible_at(&self, x: u16) -> bool {
        self.render_sprites() && (x >= 8 || (self.0 & Self::RENDER_SPR_LEFT) != 0)
    }
}

/// One completed picture: 256x240 palette indices, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            pixels: vec![0; FRAME_WIDTH * FRAME_HEIGHT],
        }
    }

    pub fn width(&self) -> usize {
        FRAME_WIDTH
    }

    pub fn height(&self) -> usize {
        FRAME_HEIGHT
    }

    /// Palette index at (x, y); out-of-range coordinates read 0
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        if x >= FRAME_WIDTH || y >= FRAME_HEIGHT {
            return 0;
        }
        self.pixels[y * FRAME_WIDTH + x]
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// True when every pixel has the same color
    pub fn is_blank(&self) -> bool {
        match self.pixels.first() {
            Some(&first) => self.pixels.iter().all(|&p| p == first),
            None => true,
        }
    }

    fn set(&mut self, x: usize, y: usize, color: u8) {
        if let Some(pixel) = self.pixels.get_mut(y * FRAME_WIDTH + x) {
            *pixel = color;
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

/// Palette RAM with the sprite backdrop mirrors ($3F10/$3F14/$3F18/$3F1C)
#[derive(Debug, Clone, Default)]
struct PaletteRam([u8; PALETTE_SIZE]);

impl PaletteRam {
    fn index(address: u16) -> usize {
        let index = usize::from(address & 0x1F);
        if index >= 0x10 && index % 4 == 0 {
            index - 0x10
        } else {
            index
        }
    }

    fn read(&self, address: u16) -> u8 {
        self.0[Self::index(address)] & 0x3F
    }

    fn write(&mut self, address: u16, value: u8) {
        self.0[Self::index(address)] = value & 0x3F;
    }
}

/// Sprite selected for the current scanline, pattern bytes pre-flipped
#[derive(Debug, Clone, Copy, Default)]
struct LineSprite {
    x: u8,
    pattern_lo: u8,
    pattern_hi: u8,
    attributes: u8,
    sprite_zero: bool,
}

impl LineSprite {
    fn pixel_at(&self, x: u16) -> u8 {
        let offset = x.wrapping_sub(u16::from(self.x));
        if offset >= 8 {
            return 0;
        }
        let bit = 7 - offset;
        let lo = (self.pattern_lo >> bit) & 1;
        let hi = (self.pattern_hi >> bit) & 1;
        (hi << 1) | lo
    }

    fn palette(&self) -> u8 {
        4 + (self.attributes & 0x03)
    }

    fn behind_background(&self) -> bool {
        (self.attributes & 0x20) != 0
    }
}

/// PPU internal state
#[derive(Debug, Clone)]
pub struct Ppu {
    ctrl: PpuCtrl,
    mask: PpuMask,
    status: PpuStatus,
    oam_addr: u8,
    oam: [u8; OAM_SIZE],

    /// Current VRAM address (15 bits)
    v: u16,
    /// Temporary VRAM address, the top-left of the screen
    t: u16,
    fine_x: u8,
    /// First/second write toggle shared by $2005 and $2006
    write_toggle: bool,
    read_buffer: u8,
    /// Last value written to any PPU register, read back by write-only ports
    io_latch: u8,

    patterns: Box<[u8; PATTERN_SIZE]>,
    chr_is_ram: bool,
    nametables: Box<[u8; NAMETABLE_RAM_SIZE]>,
    mirroring: Mirroring,
    palette: PaletteRam,

    scanline: u16,
    dot: u16,
    phase: ScanlinePhase,
    odd_frame: bool,

    next_tile: u8,
    next_attribute: u8,
    next_pattern_lo: u8,
    next_pattern_hi: u8,
    shift_pattern_lo: u16,
    shift_pattern_hi: u16,
    shift_attribute_lo: u16,
    shift_attribute_hi: u16,

    line_sprites: [LineSprite; MAX_SPRITES_PER_LINE],
    line_sprite_count: usize,

    frame: Frame,
    completed: Option<Frame>,
    frames_completed: u64,
    nmi_output: bool,
}

impl Ppu {
    /// Power-on state, parked at the start of the pre-render line
    pub fn new() -> Self {
        Self {
            ctrl: PpuCtrl::default(),
            mask: PpuMask::default(),
            status: PpuStatus::default(),
            oam_addr: 0,
            oam: [0; OAM_SIZE],
            v: 0,
            t: 0,
            fine_x: 0,
            write_toggle: false,
            read_buffer: 0,
            io_latch: 0,
            patterns: Box::new([0; PATTERN_SIZE]),
            chr_is_ram: false,
            nametables: Box::new([0; NAMETABLE_RAM_SIZE]),
            mirroring: Mirroring::Horizontal,
            palette: PaletteRam::default(),
            scanline: PRE_RENDER_SCANLINE,
            dot: 0,
            phase: ScanlinePhase::PreRender,
            odd_frame: false,
            next_tile: 0,
            next_attribute: 0,
            next_pattern_lo: 0,
            next_pattern_hi: 0,
            shift_pattern_lo: 0,
            shift_pattern_hi: 0,
            shift_attribute_lo: 0,
            shift_attribute_hi: 0,
            line_sprites: [LineSprite::default(); MAX_SPRITES_PER_LINE],
            line_sprite_count: 0,
            frame: Frame::new(),
            completed: None,
            frames_completed: 0,
            nmi_output: false,
        }
    }

    /// Copy the cartridge's pattern data into PPU memory
    pub fn load_cartridge(&mut self, chr: &[u8], chr_is_ram: bool, mirroring: Mirroring) {
        let len = chr.len().min(PATTERN_SIZE);
        self.patterns.fill(0);
        self.patterns[..len].copy_from_slice(&chr[..len]);
        self.chr_is_ram = chr_is_ram;
        self.mirroring = mirroring;
    }

    /// Reset button: registers clear, memories and counters survive
    pub fn reset(&mut self) {
        self.ctrl = PpuCtrl::default();
        self.mask = PpuMask::default();
        self.write_toggle = false;
        self.read_buffer = 0;
        self.fine_x = 0;
        self.t = 0;
        self.nmi_output = false;
    }

    /// Advance one dot
    pub fn step(&mut self) {
        match self.phase {
            ScanlinePhase::Visible => self.render_dot(true),
            ScanlinePhase::PreRender => {
                if self.dot == 1 {
                    self.status.remove(
                        PpuStatus::VBLANK | PpuStatus::SPRITE_ZERO_HIT | PpuStatus::SPRITE_OVERFLOW,
                    );
                }
                self.render_dot(false);
            }
            ScanlinePhase::PostRender => {}
            ScanlinePhase::VerticalBlank => {
                if self.scanline == VBLANK_SCANLINE && self.dot == 1 {
                    self.enter_vblank();
                }
            }
        }
        self.advance_dot();
    }

    fn advance_dot(&mut self) {
        // Odd frames drop the last pre-render dot while rendering
        if self.scanline == PRE_RENDER_SCANLINE
            && self.dot == 339
            && self.odd_frame
            && self.rendering_enabled()
        {
            self.dot = 340;
        }

        self.dot += 1;
        if self.dot >= DOTS_PER_SCANLINE {
            self.dot = 0;
            self.scanline += 1;
            if self.scanline >= SCANLINES_PER_FRAME {
                self.scanline = 0;
                self.odd_frame = !self.odd_frame;
            }
            self.phase = ScanlinePhase::of(self.scanline);
        }
    }

    fn enter_vblank(&mut self) {
        self.status.insert(PpuStatus::VBLANK);
        self.completed = Some(self.frame.clone());
        self.frames_completed += 1;
        trace!(frame = self.frames_completed, "frame complete");
        if self.ctrl.nmi_enable() {
            self.nmi_output = true;
        }
    }

    fn rendering_enabled(&self) -> bool {
        self.mask.render_background() || self.mask.render_sprites()
    }

    /// Work done on visible and pre-render lines
    fn render_dot(&mut self, visible: bool) {
        let dot = self.dot;
        if self.rendering_enabled() {
            if (2..=257).contains(&dot) || (322..=337).contains(&dot) {
                self.shift_background();
            }
            if (1..=256).contains(&dot) || (321..=336).contains(&dot) {
                self.fetch_background(dot);
            }
            match dot {
                256 => self.increment_y(),
                257 => {
                    self.load_background_shifters();
                    self.copy_horizontal();
                }
                280..=304 if !visible => self.copy_vertical(),
                _ => {}
            }
        }

        if dot == 257 {
            if visible && self.rendering_enabled() {
                self.evaluate_sprites();
            } else {
                self.line_sprite_count = 0;
            }
        }

        if visible && (1..=256).contains(&dot) {
            self.draw_pixel(dot - 1);
        }
    }

    fn fetch_background(&mut self, dot: u16) {
        match (dot - 1) % 8 {
            0 => {
                self.load_background_shifters();
                self.next_tile = self.read_vram(0x2000 | (self.v & 0x0FFF));
            }
            2 => {
                let address = 0x23C0
                    | (self.v & 0x0C00)
                    | ((self.v >> 4) & 0x38)
                    | ((self.v >> 2) & 0x07);
                let mut attribute = self.read_vram(address);
                if (self.v >> 5) & 0x02 != 0 {
                    attribute >>= 4;
                }
                if self.v & 0x02 != 0 {
                    attribute >>= 2;
                }
                self.next_attribute = attribute & 0x03;
            }
            4 => {
                let address = self.background_pattern_address();
                self.next_pattern_lo = self.read_vram(address);
            }
            6 => {
                let address = self.background_pattern_address() + 8;
                self.next_pattern_hi = self.read_vram(address);
            }
            7 => self.increment_x(),
            _ => {}
        }
    }

    fn background_pattern_address(&self) -> u16 {
        let fine_y = (self.v >> 12) & 0x07;
        self.ctrl.background_table() + u16::from(self.next_tile) * 16 + fine_y
    }

    fn load_background_shifters(&mut self) {
        self.shift_pattern_lo = (self.shift_pattern_lo & 0xFF00) | u16::from(self.next_pattern_lo);
        self.shift_pattern_hi = (self.shift_pattern_hi & 0xFF00) | u16::from(self.next_pattern_hi);
        let attribute_lo = if self.next_attribute & 0x01 != 0 { 0xFF } else { 0x00 };
        let attribute_hi = if self.next_attribute & 0x02 != 0 { 0xFF } else { 0x00 };
        self.shift_attribute_lo = (self.shift_attribute_lo & 0xFF00) | attribute_lo;
        self.shift_attribute_hi = (self.shift_attribute_hi & 0xFF00) | attribute_hi;
    }

    fn shift_background(&mut self) {
        if self.mask.render_background() {
            self.shift_pattern_lo <<= 1;
            self.shift_pattern_hi <<= 1;
            self.shift_attribute_lo <<= 1;
            self.shift_attribute_hi <<= 1;
        }
    }

    fn increment_x(&mut self) {
        if self.v & 0x001F == 31 {
            self.v &= !0x001F;
            self.v ^= 0x0400;
        } else {
            self.v += 1;
        }
    }

    fn increment_y(&mut self) {
        if self.v & 0x7000 != 0x7000 {
            self.v += 0x1000;
            return;
        }
        self.v &= !0x7000;
        let mut coarse_y = (self.v & 0x03E0) >> 5;
        if coarse_y == 29 {
            coarse_y = 0;
            self.v ^= 0x0800;
        } else if coarse_y == 31 {
            // Attribute rows wrap without switching name tables
            coarse_y = 0;
        } else {
            coarse_y += 1;
        }
        self.v = (self.v & !0x03E0) | (coarse_y << 5);
    }

    fn copy_horizontal(&mut self) {
        self.v = (self.v & !0x041F) | (self.t & 0x041F);
    }

    fn copy_vertical(&mut self) {
        self.v = (self.v & !0x7BE0) | (self.t & 0x7BE0);
    }

    fn evaluate_sprites(&mut self) {
        let height = self.ctrl.sprite_height();
        let line = self.scanline;
        self.line_sprite_count = 0;

        for index in 0..OAM_SIZE / 4 {
            let base = index * 4;
            let top = u16::from(self.oam[base]);
            if line < top || line - top >= height {
                continue;
            }
            if self.line_sprite_count == MAX_SPRITES_PER_LINE {
                self.status.insert(PpuStatus::SPRITE_OVERFLOW);
                break;
            }

            let tile = self.oam[base + 1];
            let attributes = self.oam[base + 2];
            let mut row = line - top;
            if attributes & 0x80 != 0 {
                row = height - 1 - row;
            }
            let address = if height == 16 {
                let table = u16::from(tile & 0x01) * 0x1000;
                let tile_index = u16::from(tile & 0xFE) + (row >> 3);
                table + tile_index * 16 + (row & 0x07)
            } else {
                self.ctrl.sprite_table() + u16::from(tile) * 16 + row
            };

            let mut pattern_lo = self.read_vram(address);
            let mut pattern_hi = self.read_vram(address + 8);
            if attributes & 0x40 != 0 {
                pattern_lo = pattern_lo.reverse_bits();
                pattern_hi = pattern_hi.reverse_bits();
            }

            self.line_sprites[self.line_sprite_count] = LineSprite {
                x: self.oam[base + 3],
                pattern_lo,
                pattern_hi,
                attributes,
                sprite_zero: index == 0,
            };
            self.line_sprite_count += 1;
        }
    }

    fn draw_pixel(&mut self, x: u16) {
        let mut background = 0;
        let mut background_palette = 0;
        if self.mask.background_visible_at(x) {
            let mux = 0x8000 >> self.fine_x;
            let lo = u8::from(self.shift_pattern_lo & mux != 0);
            let hi = u8::from(self.shift_pattern_hi & mux != 0);
            background = (hi << 1) | lo;
            let lo = u8::from(self.shift_attribute_lo & mux != 0);
            let hi = u8::from(self.shift_attribute_hi & mux != 0);
            background_palette = (hi << 1) | lo;
        }

        let sprite = if self.mask.sprites_visible_at(x) {
            self.line_sprites[..self.line_sprite_count]
                .iter()
                .map(|sprite| (sprite, sprite.pixel_at(x)))
                .find(|(_, pixel)| *pixel != 0)
        } else {
            None
        };

        let (palette, pixel) = match sprite {
            Some((sprite, pixel)) => {
                if background != 0 && sprite.sprite_zero && x != 255 {
                    self.status.insert(PpuStatus::SPRITE_ZERO_HIT);
                }
                if background != 0 && sprite.behind_background() {
                    (background_palette, background)
                } else {
                    (sprite.palette(), pixel)
                }
            }
            None => (background_palette, background),
        };

        let address = if pixel == 0 {
            0x3F00
        } else {
            0x3F00 | u16::from(palette) << 2 | u16::from(pixel)
        };
        let mut color = self.palette.read(address);
        if self.mask.grayscale() {
            color &= 0x30;
        }
        self.frame
            .set(usize::from(x), usize::from(self.scanline), color);
    }

    fn read_vram(&self, address: u16) -> u8 {
        let address = address & 0x3FFF;
        match address {
            0x0000..=0x1FFF => self.patterns[usize::from(address)],
            0x2000..=0x3EFF => self.nametables[self.mirroring.nametable_offset(address)],
            _ => self.palette.read(address),
        }
    }

    fn write_vram(&mut self, address: u16, value: u8) {
        let address = address & 0x3FFF;
        match address {
            0x0000..=0x1FFF => {
                if self.chr_is_ram {
                    self.patterns[usize::from(address)] = value;
                }
            }
            0x2000..=0x3EFF => {
                let offset = self.mirroring.nametable_offset(address);
                self.nametables[offset] = value;
            }
            _ => self.palette.write(address, value),
        }
    }

    fn increment_vram_address(&mut self) {
        self.v = self.v.wrapping_add(self.ctrl.vram_increment()) & 0x7FFF;
    }

    /// CPU read of register `$2000 + (register & 7)`
    pub fn read_register(&mut self, register: u16) -> u8 {
        let value = match register & 0x07 {
            2 => {
                let value = (self.status.bits() & 0xE0) | (self.io_latch & 0x1F);
                self.status.remove(PpuStatus::VBLANK);
                self.write_toggle = false;
                value
            }
            4 => {
                let value = self.oam[usize::from(self.oam_addr)];
                // Attribute bits 2-4 do not exist
                if self.oam_addr & 0x03 == 0x02 {
                    value & 0xE3
                } else {
                    value
                }
            }
            7 => {
                let address = self.v & 0x3FFF;
                let value = if address >= 0x3F00 {
                    // Palette reads bypass the buffer, which gets the name table underneath
                    self.read_buffer = self.read_vram(address - 0x1000);
                    (self.read_vram(address) & 0x3F) | (self.io_latch & 0xC0)
                } else {
                    let buffered = self.read_buffer;
                    self.read_buffer = self.read_vram(address);
                    buffered
                };
                self.increment_vram_address();
                value
            }
            _ => self.io_latch,
        };
        self.io_latch = value;
        value
    }

    /// CPU write of register `$2000 + (register & 7)`
    pub fn write_register(&mut self, register: u16, value: u8) {
        self.io_latch = value;
        match register & 0x07 {
            0 => {
                let was_enabled = self.ctrl.nmi_enable();
                self.ctrl = PpuCtrl::new(value);
                self.t = (self.t & !0x0C00) | (u16::from(value & 0x03) << 10);
                // Enabling NMI inside vblank fires immediately
                if !was_enabled && self.ctrl.nmi_enable() && self.status.vblank() {
                    self.nmi_output = true;
                }
            }
            1 => self.mask = PpuMask::new(value),
            3 => self.oam_addr = value,
            4 => {
                self.oam[usize::from(self.oam_addr)] = value;
                self.oam_addr = self.oam_addr.wrapping_add(1);
            }
            5 => {
                if !self.write_toggle {
                    self.t = (self.t & !0x001F) | u16::from(value >> 3);
                    self.fine_x = value & 0x07;
                } else {
                    self.t = (self.t & !0x73E0)
                        | (u16::from(value & 0x07) << 12)
                        | (u16::from(value & 0xF8) << 2);
                }
                self.write_toggle = !self.write_toggle;
            }
            6 => {
                if !self.write_toggle {
                    self.t = (self.t & 0x00FF) | (u16::from(value & 0x3F) << 8);
                } else {
                    self.t = (self.t & 0xFF00) | u16::from(value);
                    self.v = self.t;
                }
                self.write_toggle = !self.write_toggle;
            }
            7 => {
                self.write_vram(self.v, value);
                self.increment_vram_address();
            }
            _ => {}
        }
    }

    /// One byte of a $4014 DMA transfer
    pub fn write_oam_dma(&mut self, value: u8) {
        self.oam[usize::from(self.oam_addr)] = value;
        self.oam_addr = self.oam_addr.wrapping_add(1);
    }

    /// Hand off the most recent completed frame, if one is waiting
    pub fn take_frame(&mut self) -> Option<Frame> {
        self.completed.take()
    }

    /// Consume the vblank interrupt output
    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi_output)
    }

    /// Scroll latched in `t`/fine-x as (x, y) pixels
    pub fn scroll(&self) -> (u8, u8) {
        let x = (((self.t & 0x001F) << 3) as u8) | self.fine_x;
        let y = ((((self.t >> 5) & 0x001F) << 3) as u8) | ((self.t >> 12) & 0x07) as u8;
        (x, y)
    }

    /// Read PPU memory without side effects
    pub fn peek(&self, address: u16) -> u8 {
        self.read_vram(address)
    }

    pub fn status(&self) -> PpuStatus {
        self.status
    }

    pub fn ctrl(&self) -> PpuCtrl {
        self.ctrl
    }

    pub fn mask(&self) -> PpuMask {
        self.mask
    }

    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    pub fn dot(&self) -> u16 {
        self.dot
    }

    pub fn phase(&self) -> ScanlinePhase {
        self.phase
    }

    pub fn vram_address(&self) -> u16 {
        self.v
    }

    pub fn write_toggle(&self) -> bool {
        self.write_toggle
    }

    pub fn oam(&self) -> &[u8; OAM_SIZE] {
        &self.oam
    }

    /// Frames handed off since power-on
    pub fn frames_completed(&self) -> u64 {
        self.frames_completed
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}
