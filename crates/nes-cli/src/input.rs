//! Scripted controller input
//!
//! A script is a comma-separated list of `BUTTON@FROM..TO` holds, where the
//! button is held on controller 1 for frames `FROM` up to but excluding `TO`:
//!
//! ```text
//! start@30..35,right@60..400,a@120..130
//! ```

use std::fmt;
use std::str::FromStr;

use nes_core::controller::Buttons;

/// Script that failed to parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    UnknownButton(String),
    /// Entry not of the form `BUTTON@FROM..TO`, or with `TO <= FROM`
    InvalidEntry(String),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::UnknownButton(name) => write!(f, "Unknown button: {}", name),
            InputError::InvalidEntry(entry) => {
                write!(f, "Invalid input entry '{}', expected BUTTON@FROM..TO", entry)
            }
        }
    }
}

impl std::error::Error for InputError {}

/// Parse a button name, case-insensitive
pub fn parse_button(name: &str) -> Result<u8, InputError> {
    match name.to_ascii_lowercase().as_str() {
        "a" => Ok(Buttons::A),
        "b" => Ok(Buttons::B),
        "select" => Ok(Buttons::SELECT),
        "start" => Ok(Buttons::START),
        "up" => Ok(Buttons::UP),
        "down" => Ok(Buttons::DOWN),
        "left" => Ok(Buttons::LEFT),
        "right" => Ok(Buttons::RIGHT),
        _ => Err(InputError::UnknownButton(name.to_string())),
    }
}

/// One button held over a frame range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonHold {
    pub button: u8,
    pub from: u64,
    pub to: u64,
}

impl FromStr for ButtonHold {
    type Err = InputError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let invalid = || InputError::InvalidEntry(entry.to_string());
        let (name, range) = entry.split_once('@').ok_or_else(invalid)?;
        let (from, to) = range.split_once("..").ok_or_else(invalid)?;
        let from: u64 = from.trim().parse().map_err(|_| invalid())?;
        let to: u64 = to.trim().parse().map_err(|_| invalid())?;
        if to <= from {
            return Err(invalid());
        }
        Ok(Self {
            button: parse_button(name.trim())?,
            from,
            to,
        })
    }
}

/// Parsed input script for controller 1
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputScript {
    holds: Vec<ButtonHold>,
}

impl InputScript {
    /// Buttons held during `frame`
    pub fn buttons_at(&self, frame: u64) -> Buttons {
        self.holds
            .iter()
            .filter(|hold| (hold.from..hold.to).contains(&frame))
            .fold(Buttons::default(), |buttons, hold| buttons.with(hold.button))
    }

    pub fn holds(&self) -> &[ButtonHold] {
        &self.holds
    }

    pub fn is_empty(&self) -> bool {
        self.holds.is_empty()
    }
}

impl FromStr for InputScript {
    type Err = InputError;

    fn from_str(script: &str) -> Result<Self, Self::Err> {
        let holds = script
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<ButtonHold>, _>>()?;
        Ok(Self { holds })
    }
}
