//! NES CLI - Headless runner for the NES emulator core

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Parser;
use nes_cli::input::InputScript;
use nes_cli::{capture, rom};
use nes_core::cartridge::Mapper;
use nes_core::config::NesConfig;
use nes_core::controller::{Buttons, ControllerPort};
use nes_core::ppu::Frame;
use nes_core::system::NesSystem;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// NES Emulator CLI
#[derive(Parser, Debug)]
#[command(name = "nes-cli")]
#[command(about = "Run an NES ROM headless", long_about = None)]
struct Args {
    /// Path to the iNES ROM file
    #[arg(short, long)]
    rom: PathBuf,

    /// Number of frames to run
    #[arg(short, long, default_value = "60")]
    frames: u64,

    /// Controller 1 script, e.g. "start@30..35,right@60..400"
    #[arg(short, long)]
    input: Option<InputScript>,

    /// Save the last frame as a PNG
    #[arg(short, long)]
    screenshot: Option<PathBuf>,

    /// Save all audio as a WAV file
    #[arg(short, long)]
    wav: Option<PathBuf>,

    /// Audio sample rate in Hz
    #[arg(long, default_value = "44100")]
    sample_rate: u32,

    /// Dump CPU state after execution
    #[arg(short = 'c', long)]
    dump_cpu: bool,

    /// Dump PPU state after execution
    #[arg(short = 'p', long)]
    dump_ppu: bool,

    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let rom_data = fs::read(&args.rom)?;
    let header = rom::InesHeader::parse(&rom_data)?;
    println!("{}", header);

    let image = rom::parse(&rom_data)?;
    let config = NesConfig::default().with_sample_rate(args.sample_rate);
    let mut system = NesSystem::new(image, config)?;
    let script = args.input.clone().unwrap_or_default();

    info!(frames = args.frames, "running");
    let mut last_frame = Frame::new();
    let mut audio = Vec::new();
    let mut held = Buttons::default();
    for frame in 0..args.frames {
        let buttons = script.buttons_at(frame);
        if buttons != held {
            debug!(frame, buttons = %buttons, "controller 1");
            held = buttons;
        }
        system.set_buttons(ControllerPort::One, buttons);
        last_frame = system.run_frame()?;
        let samples = system.drain_samples();
        if args.wav.is_some() {
            audio.extend(samples);
        }
    }
    println!("Completed {} frames.", system.frame_count());

    if let Some(path) = &args.screenshot {
        capture::save_screenshot(&last_frame, path)?;
        info!(path = %path.display(), "screenshot saved");
    }
    if let Some(path) = &args.wav {
        capture::save_wav(&audio, config.sample_rate, path)?;
        info!(path = %path.display(), samples = audio.len(), "audio saved");
    }

    if args.dump_cpu {
        dump_cpu_state(&system);
    }
    if args.dump_ppu {
        dump_ppu_state(&system);
    }
    Ok(())
}

fn dump_cpu_state(system: &NesSystem) {
    let cpu = system.cpu();
    let regs = cpu.registers();

    println!("\nCPU State:");
    println!("  A:    ${:02X}", regs.a);
    println!("  X:    ${:02X}", regs.x);
    println!("  Y:    ${:02X}", regs.y);
    println!("  PC:   ${:04X}", regs.pc);
    println!("  SP:   ${:02X}", regs.sp);
    println!("  P:    {}", cpu.status());
    println!("  Cycles: {}", cpu.total_cycles());

    println!("\nCartridge:");
    let mapper = system.bus().mapper();
    match mapper {
        Mapper::Uxrom(board) => println!("  Mapper: {} (PRG bank {})", mapper.id(), board.bank()),
        Mapper::Nrom(_) => println!("  Mapper: {}", mapper.id()),
    }
}

fn dump_ppu_state(system: &NesSystem) {
    let ppu = system.ppu();
    let (scroll_x, scroll_y) = ppu.scroll();

    println!("\nPPU State:");
    println!("  Scanline: {} ({:?})", ppu.scanline(), ppu.phase());
    println!("  Dot: {}", ppu.dot());
    println!("  CTRL: ${:02X}  MASK: ${:02X}", ppu.ctrl().bits(), ppu.mask().bits());
    println!("  VBLANK: {}", ppu.status().vblank());
    println!("  Scroll: ({}, {})", scroll_x, scroll_y);
    println!("  Frames: {}", ppu.frames_completed());
}
