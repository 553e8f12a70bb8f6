//! Audio output.
//!
//! The vocoder emits a mono f32 waveform; it is stored as 16-bit PCM WAV.

mod wav;

pub use wav::{encode_wav, peak_normalize, write_wav};
