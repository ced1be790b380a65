//! Standard controller input
//!
//! Buttons are latched while strobe ($4016 bit 0) is high and shifted out one
//! bit per read afterwards, in the order A, B, Select, Start, Up, Down, Left,
//! Right. Reads past the eighth return 1, as on official pads.

use std::fmt;

/// Pressed-button set for one controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Buttons(u8);

impl Buttons {
    pub const A: u8 = 0b0000_0001;
    pub const B: u8 = 0b0000_0010;
    pub const SELECT: u8 = 0b0000_0100;
    pub const START: u8 = 0b0000_1000;
    pub const UP: u8 = 0b0001_0000;
    pub const DOWN: u8 = 0b0010_0000;
    pub const LEFT: u8 = 0b0100_0000;
    pub const RIGHT: u8 = 0b1000_0000;

    pub fn new(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_pressed(&self, button: u8) -> bool {
        (self.0 & button) != 0
    }

    pub fn set(&mut self, button: u8, pressed: bool) {
        self.0 = if pressed { self.0 | button } else { self.0 & !button };
    }

    /// Copy with `button` pressed
    pub fn with(mut self, button: u8) -> Self {
        self.set(button, true);
        self
    }
}

impl fmt::Display for Buttons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 8] = ["A", "B", "Select", "Start", "Up", "Down", "Left", "Right"];
        let pressed: Vec<&str> = NAMES
            .iter()
            .enumerate()
            .filter(|(bit, _)| self.is_pressed(1 << bit))
            .map(|(_, name)| *name)
            .collect();
        if pressed.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", pressed.join("+"))
        }
    }
}

/// Controller port selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPort {
    One,
    Two,
}

impl ControllerPort {
    pub(crate) fn index(self) -> usize {
        match self {
            ControllerPort::One => 0,
            ControllerPort::Two => 1,
        }
    }
}

/// Standard NES controller shift register
#[derive(Debug, Clone, Default)]
pub struct StandardController {
    buttons: Buttons,
    shift: u8,
    reads: u8,
    strobe: bool,
}

impl StandardController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the live button state
    pub fn set_buttons(&mut self, buttons: Buttons) {
        self.buttons = buttons;
        if self.strobe {
            self.reload();
        }
    }

    pub fn buttons(&self) -> Buttons {
        self.buttons
    }

    /// Handle a $4016 write
    pub fn write_strobe(&mut self, value: u8) {
        self.strobe = (value & 0x01) != 0;
        if self.strobe {
            self.reload();
        }
    }

    /// Serial read: bit 0 carries the next button
    pub fn read(&mut self) -> u8 {
        if self.strobe {
            return self.buttons.bits() & 0x01;
        }
        if self.reads >= 8 {
            return 0x01;
        }
        let bit = self.shift & 0x01;
        self.shift >>= 1;
        self.reads += 1;
        bit
    }

    fn reload(&mut self) {
        self.shift = self.buttons.bits();
        self.reads = 0;
    }
}
