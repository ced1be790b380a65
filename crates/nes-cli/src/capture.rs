//! Headless capture: PNG screenshots and WAV audio dumps

use std::error::Error;
use std::fs;
use std::io::BufWriter;
use std::path::Path;

use nes_core::ppu::Frame;

use crate::palette;

/// Save a frame as an RGBA PNG file.
pub fn save_screenshot(frame: &Frame, path: &Path) -> Result<(), Box<dyn Error>> {
    let file = fs::File::create(path)?;
    let w = BufWriter::new(file);
    let mut encoder = png::Encoder::new(w, frame.width() as u32, frame.height() as u32);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&palette::frame_to_rgba(frame))?;
    Ok(())
}

/// Write mono samples as 16-bit PCM.
pub fn save_wav(samples: &[f32], sample_rate: u32, path: &Path) -> Result<(), Box<dyn Error>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(to_pcm(sample))?;
    }
    writer.finalize()?;
    Ok(())
}

fn to_pcm(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}
