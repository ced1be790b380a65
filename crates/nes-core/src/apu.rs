//! APU (Audio Processing Unit) implementation
//!
//! The NES APU has five channels:
//! - Pulse 1 and Pulse 2 (duty cycle, envelope, sweep)
//! - Triangle (32-step sequence gated by a linear counter)
//! - Noise (15-bit LFSR)
//! - DMC (1-bit delta samples fetched from CPU memory)
//!
//! `step` is called once per CPU cycle. The frame sequencer clocks envelopes,
//! length counters and sweeps at fixed CPU-cycle boundaries, and the mixed
//! output is averaged down to the configured sample rate.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::config::NesConfig;

/// Length counter load values, indexed by the top 5 bits of $4003/$4007/$400B/$400F
const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, 12, 16, 24, 18, 48, 20, 96, 22,
    192, 24, 72, 26, 16, 28, 32, 30,
];

const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 1, 0, 0, 0, 0, 0, 0],
    [0, 1, 1, 0, 0, 0, 0, 0],
    [0, 1, 1, 1, 1, 0, 0, 0],
    [1, 0, 0, 1, 1, 1, 1, 1],
];

const TRIANGLE_SEQUENCE: [u8; 32] = [
    15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
    13, 14, 15,
];

/// Noise periods in APU cycles (two CPU cycles each)
const NOISE_PERIODS: [u16; 16] = [
    2, 4, 8, 16, 32, 48, 64, 80, 101, 127, 190, 254, 381, 508, 1017, 2034,
];

/// DMC output rates in CPU cycles
const DMC_RATES: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];

/// Frame sequencer boundaries in CPU cycles
const STEP_1: u32 = 7457;
const STEP_2: u32 = 14913;
const STEP_3: u32 = 22371;
const STEP_4: u32 = 29829;
const STEP_5: u32 = 37281;

#[derive(Debug, Clone, Default)]
struct LengthCounter {
    value: u8,
    halted: bool,
    enabled: bool,
}

impl LengthCounter {
    fn load(&mut self, index: u8) {
        if self.enabled {
            self.value = LENGTH_TABLE[usize::from(index & 0x1F)];
        }
    }

    fn clock(&mut self) {
        if !self.halted && self.value > 0 {
            self.value -= 1;
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.value = 0;
        }
    }

    fn active(&self) -> bool {
        self.value > 0
    }
}

#[derive(Debug, Clone, Default)]
struct Envelope {
    start: bool,
    looping: bool,
    constant: bool,
    period: u8,
    divider: u8,
    decay: u8,
}

impl Envelope {
    fn write(&mut self, value: u8) {
        self.looping = (value & 0x20) != 0;
        self.constant = (value & 0x10) != 0;
        self.period = value & 0x0F;
    }

    fn clock(&mut self) {
        if self.start {
            self.start = false;
            self.decay = 15;
            self.divider = self.period;
        } else if self.divider == 0 {
            self.divider = self.period;
            if self.decay > 0 {
                self.decay -= 1;
            } else if self.looping {
                self.decay = 15;
            }
        } else {
            self.divider -= 1;
        }
    }

    fn volume(&self) -> u8 {
        if self.constant {
            self.period
        } else {
            self.decay
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Sweep {
    enabled: bool,
    period: u8,
    negate: bool,
    shift: u8,
    divider: u8,
    reload: bool,
}

/// Pulse wave channel
#[derive(Debug, Clone, Default)]
struct PulseChannel {
    /// Pulse 1 negates in ones' complement
    ones_complement: bool,
    duty: u8,
    duty_step: u8,
    timer_period: u16,
    timer: u16,
    envelope: Envelope,
    sweep: Sweep,
    length: LengthCounter,
}

impl PulseChannel {
    fn new(ones_complement: bool) -> Self {
        Self {
            ones_complement,
            ..Self::default()
        }
    }

    fn write(&mut self, register: u16, value: u8) {
        match register {
            0 => {
                self.duty = value >> 6;
                self.length.halted = (value & 0x20) != 0;
                self.envelope.write(value);
            }
            1 => {
                self.sweep.enabled = (value & 0x80) != 0;
                self.sweep.period = (value >> 4) & 0x07;
                self.sweep.negate = (value & 0x08) != 0;
                self.sweep.shift = value & 0x07;
                self.sweep.reload = true;
            }
            2 => self.timer_period = (self.timer_period & 0x0700) | u16::from(value),
            _ => {
                self.timer_period = (self.timer_period & 0x00FF) | (u16::from(value & 0x07) << 8);
                self.length.load(value >> 3);
                self.duty_step = 0;
                self.envelope.start = true;
            }
        }
    }

    fn tick_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            self.duty_step = (self.duty_step + 1) & 0x07;
        } else {
            self.timer -= 1;
        }
    }

    fn sweep_target(&self) -> u16 {
        let change = self.timer_period >> self.sweep.shift;
        if self.sweep.negate {
            let extra = u16::from(self.ones_complement);
            self.timer_period.saturating_sub(change + extra)
        } else {
            self.timer_period + change
        }
    }

    fn muted(&self) -> bool {
        self.timer_period < 8 || self.sweep_target() > 0x07FF
    }

    fn clock_sweep(&mut self) {
        if self.sweep.divider == 0 && self.sweep.enabled && self.sweep.shift > 0 && !self.muted() {
            self.timer_period = self.sweep_target();
        }
        if self.sweep.divider == 0 || self.sweep.reload {
            self.sweep.divider = self.sweep.period;
            self.sweep.reload = false;
        } else {
            self.sweep.divider -= 1;
        }
    }

    fn output(&self) -> u8 {
        if !self.length.active()
            || self.muted()
            || DUTY_TABLE[usize::from(self.duty)][usize::from(self.duty_step)] == 0
        {
            0
        } else {
            self.envelope.volume()
        }
    }
}

/// Triangle wave channel
#[derive(Debug, Clone, Default)]
struct TriangleChannel {
    timer_period: u16,
    timer: u16,
    step: u8,
    linear_counter: u8,
    linear_reload_value: u8,
    linear_reload: bool,
    /// Doubles as the length counter halt flag
    control: bool,
    length: LengthCounter,
}

impl TriangleChannel {
    fn write(&mut self, register: u16, value: u8) {
        match register {
            0 => {
                self.control = (value & 0x80) != 0;
                self.length.halted = self.control;
                self.linear_reload_value = value & 0x7F;
            }
            1 => {}
            2 => self.timer_period = (self.timer_period & 0x0700) | u16::from(value),
            _ => {
                self.timer_period = (self.timer_period & 0x00FF) | (u16::from(value & 0x07) << 8);
                self.length.load(value >> 3);
                self.linear_reload = true;
            }
        }
    }

    fn tick_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            if self.length.active() && self.linear_counter > 0 {
                self.step = (self.step + 1) & 0x1F;
            }
        } else {
            self.timer -= 1;
        }
    }

    fn clock_linear(&mut self) {
        if self.linear_reload {
            self.linear_counter = self.linear_reload_value;
        } else if self.linear_counter > 0 {
            self.linear_counter -= 1;
        }
        if !self.control {
            self.linear_reload = false;
        }
    }

    fn output(&self) -> u8 {
        // Silenced channels drop to zero instead of holding the last step
        if !self.length.active() || self.linear_counter == 0 {
            return 0;
        }
        TRIANGLE_SEQUENCE[usize::from(self.step)]
    }
}

/// Noise channel
#[derive(Debug, Clone)]
struct NoiseChannel {
    short_mode: bool,
    timer_period: u16,
    timer: u16,
    shift: u16,
    envelope: Envelope,
    length: LengthCounter,
}

impl NoiseChannel {
    fn new() -> Self {
        Self {
            short_mode: false,
            timer_period: NOISE_PERIODS[0],
            timer: 0,
            shift: 1,
            envelope: Envelope::default(),
            length: LengthCounter::default(),
        }
    }

    fn write(&mut self, register: u16, value: u8) {
        match register {
            0 => {
                self.length.halted = (value & 0x20) != 0;
                self.envelope.write(value);
            }
            1 => {}
            2 => {
                self.short_mode = (value & 0x80) != 0;
                self.timer_period = NOISE_PERIODS[usize::from(value & 0x0F)];
            }
            _ => {
                self.length.load(value >> 3);
                self.envelope.start = true;
            }
        }
    }

    fn tick_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            let tap = if self.short_mode { 6 } else { 1 };
            let feedback = (self.shift & 0x01) ^ ((self.shift >> tap) & 0x01);
            self.shift = (self.shift >> 1) | (feedback << 14);
        } else {
            self.timer -= 1;
        }
    }

    fn output(&self) -> u8 {
        if !self.length.active() || (self.shift & 0x01) != 0 {
            0
        } else {
            self.envelope.volume()
        }
    }
}

/// Delta modulation channel
#[derive(Debug, Clone)]
struct DmcChannel {
    irq_enabled: bool,
    looping: bool,
    rate: u16,
    timer: u16,
    output_level: u8,
    sample_address: u16,
    sample_length: u16,
    current_address: u16,
    bytes_remaining: u16,
    sample_buffer: Option<u8>,
    shift: u8,
    bits_remaining: u8,
    silence: bool,
    irq_flag: bool,
}

impl DmcChannel {
    fn new() -> Self {
        Self {
            irq_enabled: false,
            looping: false,
            rate: DMC_RATES[0],
            timer: 0,
            output_level: 0,
            sample_address: 0xC000,
            sample_length: 1,
            current_address: 0xC000,
            bytes_remaining: 0,
            sample_buffer: None,
            shift: 0,
            bits_remaining: 8,
            silence: true,
            irq_flag: false,
        }
    }

    fn write(&mut self, register: u16, value: u8) {
        match register {
            0 => {
                self.irq_enabled = (value & 0x80) != 0;
                if !self.irq_enabled {
                    self.irq_flag = false;
                }
                self.looping = (value & 0x40) != 0;
                self.rate = DMC_RATES[usize::from(value & 0x0F)];
            }
            1 => self.output_level = value & 0x7F,
            2 => self.sample_address = 0xC000 | (u16::from(value) << 6),
            _ => self.sample_length = (u16::from(value) << 4) | 1,
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.bytes_remaining = 0;
        } else if self.bytes_remaining == 0 {
            self.restart();
        }
    }

    fn restart(&mut self) {
        self.current_address = self.sample_address;
        self.bytes_remaining = self.sample_length;
    }

    fn dma_request(&self) -> Option<u16> {
        if self.sample_buffer.is_none() && self.bytes_remaining > 0 {
            Some(self.current_address)
        } else {
            None
        }
    }

    fn fill(&mut self, value: u8) {
        self.sample_buffer = Some(value);
        self.current_address = if self.current_address == 0xFFFF {
            0x8000
        } else {
            self.current_address + 1
        };
        self.bytes_remaining = self.bytes_remaining.saturating_sub(1);
        if self.bytes_remaining == 0 {
            if self.looping {
                self.restart();
            } else if self.irq_enabled {
                self.irq_flag = true;
            }
        }
    }

    fn tick_timer(&mut self) {
        if self.timer > 0 {
            self.timer -= 1;
            return;
        }
        self.timer = self.rate - 1;

        if !self.silence {
            if self.shift & 0x01 != 0 {
                if self.output_level <= 125 {
                    self.output_level += 2;
                }
            } else if self.output_level >= 2 {
                self.output_level -= 2;
            }
        }
        self.shift >>= 1;
        self.bits_remaining -= 1;

        if self.bits_remaining == 0 {
            self.bits_remaining = 8;
            match self.sample_buffer.take() {
                Some(byte) => {
                    self.shift = byte;
                    self.silence = false;
                }
                None => self.silence = true,
            }
        }
    }

    fn output(&self) -> u8 {
        self.output_level
    }
}

/// Bounded queue of mixed samples waiting for the host
///
/// When full, new samples are dropped and counted; the host is expected to
/// drain at least once per frame.
#[derive(Debug, Clone)]
pub struct SampleRing {
    buffer: VecDeque<f32>,
    capacity: usize,
    dropped: u64,
    overflowing: bool,
}

impl SampleRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
            overflowing: false,
        }
    }

    pub fn push(&mut self, sample: f32) {
        if self.buffer.len() >= self.capacity {
            if !self.overflowing {
                warn!(capacity = self.capacity, "audio sample ring full, dropping samples");
                self.overflowing = true;
            }
            self.dropped += 1;
            return;
        }
        self.overflowing = false;
        self.buffer.push_back(sample);
    }

    pub fn drain(&mut self) -> Vec<f32> {
        self.overflowing = false;
        self.buffer.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples lost to overflow since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Non-linear mix of the channel levels into 0.0..=1.0
pub fn mix(pulse1: u8, pulse2: u8, triangle: u8, noise: u8, dmc: u8) -> f32 {
    let pulse_sum = f32::from(pulse1) + f32::from(pulse2);
    let pulse_out = if pulse_sum == 0.0 {
        0.0
    } else {
        95.88 / (8128.0 / pulse_sum + 100.0)
    };

    let tnd_sum =
        f32::from(triangle) / 8227.0 + f32::from(noise) / 12241.0 + f32::from(dmc) / 22638.0;
    let tnd_out = if tnd_sum == 0.0 {
        0.0
    } else {
        159.79 / (1.0 / tnd_sum + 100.0)
    };

    pulse_out + tnd_out
}

/// APU state
#[derive(Debug, Clone)]
pub struct Apu {
    pulse1: PulseChannel,
    pulse2: PulseChannel,
    triangle: TriangleChannel,
    noise: NoiseChannel,
    dmc: DmcChannel,

    five_step: bool,
    irq_inhibit: bool,
    frame_irq: bool,
    /// CPU cycles since the frame sequencer last restarted
    sequencer_cycle: u32,
    /// Pulse and noise timers run on every other CPU cycle
    odd_cycle: bool,
    cycle_count: u64,

    cycles_per_sample: f64,
    sample_clock: f64,
    sample_sum: f32,
    sample_count: u32,
    samples: SampleRing,
}

impl Apu {
    pub fn new(config: &NesConfig) -> Self {
        Self {
            pulse1: PulseChannel::new(true),
            pulse2: PulseChannel::new(false),
            triangle: TriangleChannel::default(),
            noise: NoiseChannel::new(),
            dmc: DmcChannel::new(),
            five_step: false,
            irq_inhibit: false,
            frame_irq: false,
            sequencer_cycle: 0,
            odd_cycle: false,
            cycle_count: 0,
            cycles_per_sample: config.cycles_per_sample(),
            sample_clock: 0.0,
            sample_sum: 0.0,
            sample_count: 0,
            samples: SampleRing::with_capacity(config.sample_capacity),
        }
    }

    /// Reset: silence all channels, keep the sample ring
    pub fn reset(&mut self) {
        for register in 0x4000..=0x4013 {
            self.write_register(register, 0);
        }
        self.write_register(0x4015, 0);
        self.dmc.irq_flag = false;
        self.frame_irq = false;
        self.sequencer_cycle = 0;
        self.odd_cycle = false;
    }

    /// Advance one CPU cycle
    pub fn step(&mut self) {
        self.cycle_count += 1;

        self.triangle.tick_timer();
        self.dmc.tick_timer();
        if self.odd_cycle {
            self.pulse1.tick_timer();
            self.pulse2.tick_timer();
            self.noise.tick_timer();
        }
        self.odd_cycle = !self.odd_cycle;

        self.step_sequencer();
        self.sample();
    }

    fn step_sequencer(&mut self) {
        self.sequencer_cycle += 1;
        match self.sequencer_cycle {
            STEP_1 | STEP_3 => self.clock_quarter_frame(),
            STEP_2 => {
                self.clock_quarter_frame();
                self.clock_half_frame();
            }
            STEP_4 if !self.five_step => {
                self.clock_quarter_frame();
                self.clock_half_frame();
                if !self.irq_inhibit {
                    self.frame_irq = true;
                }
                self.sequencer_cycle = 0;
            }
            STEP_5 => {
                self.clock_quarter_frame();
                self.clock_half_frame();
                self.sequencer_cycle = 0;
            }
            _ => {}
        }
    }

    fn clock_quarter_frame(&mut self) {
        self.pulse1.envelope.clock();
        self.pulse2.envelope.clock();
        self.noise.envelope.clock();
        self.triangle.clock_linear();
    }

    fn clock_half_frame(&mut self) {
        self.pulse1.length.clock();
        self.pulse2.length.clock();
        self.triangle.length.clock();
        self.noise.length.clock();
        self.pulse1.clock_sweep();
        self.pulse2.clock_sweep();
    }

    fn sample(&mut self) {
        self.sample_sum += self.output();
        self.sample_count += 1;
        self.sample_clock += 1.0;
        if self.sample_clock >= self.cycles_per_sample {
            self.sample_clock -= self.cycles_per_sample;
            let average = self.sample_sum / self.sample_count as f32;
            self.samples.push(average);
            self.sample_sum = 0.0;
            self.sample_count = 0;
        }
    }

    /// Instantaneous mixed output
    pub fn output(&self) -> f32 {
        mix(
            self.pulse1.output(),
            self.pulse2.output(),
            self.triangle.output(),
            self.noise.output(),
            self.dmc.output(),
        )
    }

    /// $4015 read: length counter, DMC and interrupt status
    ///
    /// Clears the frame interrupt flag. Bit 5 is open bus and left to the caller.
    pub fn read_status(&mut self) -> u8 {
        let mut status = 0;
        if self.pulse1.length.active() {
            status |= 0x01;
        }
        if self.pulse2.length.active() {
            status |= 0x02;
        }
        if self.triangle.length.active() {
            status |= 0x04;
        }
        if self.noise.length.active() {
            status |= 0x08;
        }
        if self.dmc.bytes_remaining > 0 {
            status |= 0x10;
        }
        if self.frame_irq {
            status |= 0x40;
        }
        if self.dmc.irq_flag {
            status |= 0x80;
        }
        self.frame_irq = false;
        status
    }

    /// Write to $4000-$4013, $4015 or $4017
    pub fn write_register(&mut self, address: u16, value: u8) {
        match address {
            0x4000..=0x4003 => self.pulse1.write(address - 0x4000, value),
            0x4004..=0x4007 => self.pulse2.write(address - 0x4004, value),
            0x4008..=0x400B => self.triangle.write(address - 0x4008, value),
            0x400C..=0x400F => self.noise.write(address - 0x400C, value),
            0x4010..=0x4013 => self.dmc.write(address - 0x4010, value),
            0x4015 => {
                self.pulse1.length.set_enabled(value & 0x01 != 0);
                self.pulse2.length.set_enabled(value & 0x02 != 0);
                self.triangle.length.set_enabled(value & 0x04 != 0);
                self.noise.length.set_enabled(value & 0x08 != 0);
                self.dmc.set_enabled(value & 0x10 != 0);
                self.dmc.irq_flag = false;
            }
            0x4017 => self.write_frame_counter(value),
            _ => {}
        }
    }

    fn write_frame_counter(&mut self, value: u8) {
        let five_step = (value & 0x80) != 0;
        if five_step != self.five_step {
            debug!(five_step, "frame sequencer mode");
        }
        self.five_step = five_step;
        self.irq_inhibit = (value & 0x40) != 0;
        if self.irq_inhibit {
            self.frame_irq = false;
        }
        self.sequencer_cycle = 0;
        if self.five_step {
            self.clock_quarter_frame();
            self.clock_half_frame();
        }
    }

    /// Level of the APU interrupt output (frame counter or DMC)
    pub fn irq_asserted(&self) -> bool {
        self.frame_irq || self.dmc.irq_flag
    }

    /// Address the DMC wants fetched, if its sample buffer is empty
    pub fn dmc_dma_request(&self) -> Option<u16> {
        self.dmc.dma_request()
    }

    /// Deliver a byte fetched for the DMC
    pub fn dmc_fill(&mut self, value: u8) {
        self.dmc.fill(value);
    }

    /// Hand all queued samples to the host
    pub fn drain_samples(&mut self) -> Vec<f32> {
        self.samples.drain()
    }

    pub fn samples(&self) -> &SampleRing {
        &self.samples
    }

    /// CPU cycles stepped since power-on
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new(&NesConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writing $4017 with bit 7 set clocks one quarter and one half frame
    fn clock_half_frame(apu: &mut Apu) {
        apu.write_register(0x4017, 0xC0);
    }

    #[test]
    fn test_length_counter_expiry() {
        let mut apu = Apu::default();
        apu.write_register(0x4015, 0x01);
        // Constant volume 15, duty 50%, period above the mute threshold
        apu.write_register(0x4000, 0b1001_1111);
        apu.write_register(0x4002, 0x40);
        // Length index 1 loads 254; index 3 loads 2
        apu.write_register(0x4003, 3 << 3);
        assert_eq!(apu.read_status() & 0x01, 0x01);

        clock_half_frame(&mut apu);
        assert_eq!(apu.read_status() & 0x01, 0x01);
        clock_half_frame(&mut apu);
        assert_eq!(apu.read_status() & 0x01, 0x00);

        for _ in 0..1000 {
            apu.step();
            assert_eq!(apu.pulse1.output(), 0);
        }
    }

    /// Restart pulse 1's envelope with `control` written to $4000
    fn start_envelope(apu: &mut Apu, control: u8) {
        apu.write_register(0x4015, 0x01);
        apu.write_register(0x4000, control);
        apu.write_register(0x4003, 1 << 3);
    }

    #[test]
    fn test_envelope_decays_to_zero() {
        let mut apu = Apu::default();
        start_envelope(&mut apu, 0x00);

        clock_half_frame(&mut apu);
        assert_eq!(apu.pulse1.envelope.volume(), 15);
        for expected in (0..15).rev() {
            clock_half_frame(&mut apu);
            assert_eq!(apu.pulse1.envelope.volume(), expected);
        }
        clock_half_frame(&mut apu);
        assert_eq!(apu.pulse1.envelope.volume(), 0);
    }

    #[test]
    fn test_envelope_loops_back_to_fifteen() {
        let mut apu = Apu::default();
        start_envelope(&mut apu, 0x20);
        for _ in 0..16 {
            clock_half_frame(&mut apu);
        }
        assert_eq!(apu.pulse1.envelope.volume(), 0);
        clock_half_frame(&mut apu);
        assert_eq!(apu.pulse1.envelope.volume(), 15);
    }

    #[test]
    fn test_envelope_period_divides_clock() {
        let mut apu = Apu::default();
        start_envelope(&mut apu, 0x02);
        clock_half_frame(&mut apu);
        assert_eq!(apu.pulse1.envelope.volume(), 15);
        // Period 2 steps the decay every third quarter frame
        for _ in 0..2 {
            clock_half_frame(&mut apu);
            assert_eq!(apu.pulse1.envelope.volume(), 15);
        }
        clock_half_frame(&mut apu);
        assert_eq!(apu.pulse1.envelope.volume(), 14);
    }

    #[test]
    fn test_constant_volume_ignores_decay() {
        let mut apu = Apu::default();
        start_envelope(&mut apu, 0x1A);
        for _ in 0..5 {
            clock_half_frame(&mut apu);
        }
        assert_eq!(apu.pulse1.envelope.volume(), 10);
    }

    #[test]
    fn test_length_halt_holds_counter() {
        let mut apu = Apu::default();
        apu.write_register(0x4015, 0x08);
        apu.write_register(0x400C, 0x30);
        apu.write_register(0x400F, 3 << 3);
        for _ in 0..5 {
            clock_half_frame(&mut apu);
        }
        assert_eq!(apu.read_status() & 0x08, 0x08);
    }

    #[test]
    fn test_disabled_channel_ignores_length_load() {
        let mut apu = Apu::default();
        apu.write_register(0x4003, 0x08);
        assert_eq!(apu.read_status() & 0x01, 0);

        apu.write_register(0x4015, 0x01);
        apu.write_register(0x4003, 0x08);
        assert_eq!(apu.read_status() & 0x01, 0x01);
        apu.write_register(0x4015, 0x00);
        assert_eq!(apu.read_status() & 0x01, 0);
    }

    #[test]
    fn test_frame_irq_four_step() {
        let mut apu = Apu::default();
        for _ in 0..STEP_4 - 1 {
            apu.step();
        }
        assert!(!apu.irq_asserted());
        apu.step();
        assert!(apu.irq_asserted());

        let status = apu.read_status();
        assert_eq!(status & 0x40, 0x40);
        assert!(!apu.irq_asserted());
    }

    #[test]
    fn test_frame_irq_inhibited() {
        let mut apu = Apu::default();
        apu.write_register(0x4017, 0x40);
        for _ in 0..STEP_4 * 2 {
            apu.step();
        }
        assert!(!apu.irq_asserted());
    }

    #[test]
    fn test_five_step_has_no_irq() {
        let mut apu = Apu::default();
        apu.write_register(0x4017, 0x80);
        for _ in 0..STEP_5 * 2 {
            apu.step();
        }
        assert!(!apu.irq_asserted());
    }

    #[test]
    fn test_silent_mix_is_zero() {
        assert_eq!(mix(0, 0, 0, 0, 0), 0.0);
        let loud = mix(15, 15, 15, 15, 127);
        assert!(loud > 0.9 && loud < 1.1);
    }

    #[test]
    fn test_pulse_produces_samples() {
        let mut apu = Apu::default();
        apu.write_register(0x4015, 0x01);
        apu.write_register(0x4000, 0b1011_1111);
        apu.write_register(0x4002, 0xFD);
        apu.write_register(0x4003, 0x08);

        for _ in 0..29_781 {
            apu.step();
        }
        let samples = apu.drain_samples();
        // 1789773 / 44100 CPU cycles per sample
        assert!((733..=734).contains(&samples.len()));
        assert!(samples.iter().any(|&s| s > 0.0));
        assert!(apu.samples().is_empty());
    }

    #[test]
    fn test_sample_ring_drops_when_full() {
        let mut ring = SampleRing::with_capacity(2);
        ring.push(0.1);
        ring.push(0.2);
        ring.push(0.3);
        ring.push(0.4);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.dropped(), 2);
        assert_eq!(ring.drain(), vec![0.1, 0.2]);
    }

    #[test]
    fn test_sweep_mutes_high_target() {
        let mut pulse = PulseChannel::new(false);
        pulse.length.enabled = true;
        pulse.write(0, 0b0011_1111);
        pulse.write(1, 0b1000_0001);
        pulse.write(2, 0xFF);
        pulse.write(3, 0x0F);
        // 0x7FF + (0x7FF >> 1) overflows the 11-bit timer
        assert!(pulse.muted());
        assert_eq!(pulse.output(), 0);
    }

    #[test]
    fn test_pulse1_sweep_ones_complement() {
        let mut pulse1 = PulseChannel::new(true);
        let mut pulse2 = PulseChannel::new(false);
        for pulse in [&mut pulse1, &mut pulse2] {
            pulse.write(1, 0b1000_1001);
            pulse.write(2, 0x00);
            pulse.write(3, 0x01);
        }
        assert_eq!(pulse1.sweep_target(), 0x100 - 0x80 - 1);
        assert_eq!(pulse2.sweep_target(), 0x100 - 0x80);
    }

    #[test]
    fn test_noise_lfsr_changes() {
        let mut noise = NoiseChannel::new();
        let initial = noise.shift;
        for _ in 0..10 {
            noise.tick_timer();
        }
        assert_ne!(noise.shift, initial);
        assert_ne!(noise.shift, 0);
    }

    #[test]
    fn test_dmc_fetch_and_irq() {
        let mut apu = Apu::default();
        apu.write_register(0x4010, 0x80);
        apu.write_register(0x4012, 0x00);
        apu.write_register(0x4013, 0x00);
        apu.write_register(0x4015, 0x10);

        assert_eq!(apu.dmc_dma_request(), Some(0xC000));
        apu.dmc_fill(0xFF);
        assert_eq!(apu.dmc_dma_request(), None);
        assert!(apu.irq_asserted());
        assert_eq!(apu.read_status() & 0x90, 0x80);

        apu.write_register(0x4015, 0x00);
        assert!(!apu.irq_asserted());
    }

    #[test]
    fn test_triangle_needs_linear_counter() {
        let mut apu = Apu::default();
        apu.write_register(0x4015, 0x04);
        apu.write_register(0x400A, 0x10);
        apu.write_register(0x400B, 0x08);
        let start = apu.triangle.step;
        for _ in 0..200 {
            apu.step();
        }
        assert_eq!(apu.triangle.step, start);

        apu.write_register(0x4008, 0x7F);
        apu.write_register(0x400B, 0x08);
        apu.write_register(0x4017, 0x80);
        for _ in 0..200 {
            apu.step();
        }
        assert_ne!(apu.triangle.step, start);
    }
}
