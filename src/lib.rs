//! MusicGen text-to-music inference in Rust.
//!
//! The neural networks run in an external engine (ONNX Runtime behind the
//! `onnx` feature); this crate owns everything around them: tokenization
//! that reproduces the reference vocabulary's ids, the autoregressive
//! sampling loop with classifier-free guidance, the codebook layout the
//! vocoder expects, and WAV output.
//!
//! ## Architecture
//!
//! ```text
//! prompt → Tokenizer (BPE | Unigram) → SequencePacker ──→ text encoder
//!                                                             ↓
//!                          GenerationController (decoder × maxNewTokens)
//!                                                             ↓
//!                                   CodebookExpander → vocoder → WAV
//! ```
//!
//! ## Modules
//!
//! - [`tokenizer`]: vocabulary loading, BPE and Unigram encoders, packing
//! - [`model`]: engine traits, sampling, generation loop, codebook layout
//! - [`audio`]: 16-bit PCM WAV I/O
//! - [`pipeline`]: end-to-end inference pipeline
//! - [`manager`]: resident pipeline serving queued requests
//! - [`config`]: serde configuration with defaults

pub mod audio;
pub mod config;
pub mod manager;
pub mod model;
pub mod pipeline;
pub mod tokenizer;

mod error;

pub use error::{Error, Result};
