//! Host-side pieces of the headless NES runner: ROM files, colors, capture
//! and scripted input. The emulation itself lives in `nes-core`.

#![forbid(unsafe_code)]

pub mod capture;
pub mod input;
pub mod palette;
pub mod rom;
