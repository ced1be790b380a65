//! System configuration and NTSC timing constants

/// NTSC CPU clock in Hz (master clock / 12)
pub const CPU_CLOCK_HZ: u32 = 1_789_773;

/// PPU dots per CPU cycle
pub const PPU_DOTS_PER_CPU_CYCLE: u32 = 3;

/// APU ticks per CPU cycle
pub const APU_TICKS_PER_CPU_CYCLE: u32 = 1;

/// CPU cycles in one NTSC frame (341 * 262 / 3, rounded up)
pub const CPU_CYCLES_PER_FRAME: u64 = 29_781;

/// Default audio output rate
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Default sample ring capacity (about 90ms at 44.1kHz)
pub const DEFAULT_SAMPLE_CAPACITY: usize = 4096;

/// Host-tunable settings for a `NesSystem`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NesConfig {
    /// Audio output rate in Hz
    pub sample_rate: u32,
    /// Maximum number of undrained samples held by the APU
    pub sample_capacity: usize,
}

impl NesConfig {
    pub fn new() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            sample_capacity: DEFAULT_SAMPLE_CAPACITY,
        }
    }

    /// Set the audio output rate. Zero is clamped to 1 Hz.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate.max(1);
        self
    }

    /// Set the sample ring capacity. Zero is clamped to one sample.
    pub fn with_sample_capacity(mut self, capacity: usize) -> Self {
        self.sample_capacity = capacity.max(1);
        self
    }

    /// CPU cycles per output sample
    pub fn cycles_per_sample(&self) -> f64 {
        f64::from(CPU_CLOCK_HZ) / f64::from(self.sample_rate.max(1))
    }
}

impl Default for NesConfig {
    fn default() -> Self {
        Self::new()
    }
}
