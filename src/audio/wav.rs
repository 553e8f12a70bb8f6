//! 16-bit PCM mono WAV I/O.
//!
//! hound writes the canonical 44-byte header for this format: `RIFF`,
//! `WAVE`, a 16-byte `fmt ` chunk with format code 1, then `data`.

use std::io::{Cursor, Seek, Write};
use std::path::Path;

use crate::Result;

const CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

fn spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: CHANNELS,
        sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Clamp to [-1, 1] and scale to i16.
fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn write_samples<W: Write + Seek>(writer: W, samples: &[f32], sample_rate: u32) -> Result<()> {
    let mut writer = hound::WavWriter::new(writer, spec(sample_rate))?;
    for &s in samples {
        writer.write_sample(to_pcm16(s))?;
    }
    writer.finalize()?;
    Ok(())
}

/// Write mono f32 samples as a 16-bit PCM WAV file.
pub fn write_wav(path: impl AsRef<Path>, samples: &[f32], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_samples(file, samples, sample_rate)?;
    tracing::debug!(path = %path.display(), samples = samples.len(), sample_rate, "wrote wav");
    Ok(())
}

/// Encode mono f32 samples as 16-bit PCM WAV bytes.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    write_samples(&mut cursor, samples, sample_rate)?;
    Ok(cursor.into_inner())
}

/// Scale so the loudest sample sits at ±1. Silence is left alone.
pub fn peak_normalize(samples: &mut [f32]) {
    let max_abs = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    if max_abs > 1e-8 {
        let scale = 1.0 / max_abs;
        for s in samples.iter_mut() {
            *s *= scale;
        }
    }
}
