//! MusicGen CLI: text prompt to 16-bit mono WAV.
//!
//! Loads the tokenizer and three ONNX graphs (text encoder, decoder,
//! vocoder) from `--model-dir` unless individual paths are given.
//!
//! # Output
//!
//! Writes the WAV file to --output and prints a one-line JSON summary to stdout:
//!
//! ```json
//! {"path":"/tmp/music.wav","duration_s":1.28,"sample_rate":32000,"channels":1,"tokens":1120}
//! ```
//!
//! Exit code 0 on success, non-zero on error.

use std::path::PathBuf;

use clap::Parser;
use musicgen_rs::{
    audio::write_wav,
    config::MusicGenConfig,
    pipeline::{GenerationParams, ModelPaths, OnnxPipeline},
};

#[derive(Parser, Debug)]
#[command(
    name = "musicgen",
    about = "Text-to-music generation with exported MusicGen ONNX graphs"
)]
struct Args {
    /// Text description of the music to generate.
    #[arg(long, short = 'p')]
    prompt: String,

    /// Text to steer away from. Only used with --guidance-scale other than 1.0.
    #[arg(long, short = 'n')]
    negative_prompt: Option<String>,

    /// Directory holding tokenizer.json, text_encoder.onnx, decoder_model.onnx
    /// and encodec_decode.onnx.
    #[arg(long, short = 'm', default_value = "models")]
    model_dir: PathBuf,

    /// Tokenizer definition (overrides --model-dir).
    #[arg(long)]
    tokenizer: Option<PathBuf>,

    /// Text encoder graph (overrides --model-dir).
    #[arg(long)]
    text_encoder: Option<PathBuf>,

    /// Decoder graph (overrides --model-dir).
    #[arg(long)]
    decoder: Option<PathBuf>,

    /// Vocoder graph (overrides --model-dir).
    #[arg(long)]
    vocoder: Option<PathBuf>,

    /// JSON config file. Missing fields take their defaults.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Output WAV path.
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Random seed. Omit for a random seed each run.
    #[arg(long, short = 's')]
    seed: Option<u64>,

    /// Number of tokens to generate.
    #[arg(long)]
    max_new_tokens: Option<usize>,

    /// Classifier-free guidance scale (1.0 disables guidance).
    #[arg(long, short = 'g')]
    guidance_scale: Option<f32>,

    /// Candidates kept for sampling.
    #[arg(long, short = 'k')]
    top_k: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => MusicGenConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("failed to load config {}: {e}", path.display()))?,
        None => MusicGenConfig::default(),
    };

    let defaults = ModelPaths::in_dir(&args.model_dir);
    let paths = ModelPaths {
        tokenizer: args.tokenizer.unwrap_or(defaults.tokenizer),
        text_encoder: args.text_encoder.unwrap_or(defaults.text_encoder),
        decoder: args.decoder.unwrap_or(defaults.decoder),
        vocoder: args.vocoder.unwrap_or(defaults.vocoder),
    };

    if let Some(parent) = args.output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!("Loading MusicGen pipeline...");
    let mut pipeline = OnnxPipeline::load(&paths, config)
        .map_err(|e| anyhow::anyhow!("failed to load pipeline: {e}"))?;

    let params = GenerationParams {
        prompt: args.prompt,
        negative_prompt: args.negative_prompt,
        max_new_tokens: args.max_new_tokens,
        guidance_scale: args.guidance_scale,
        top_k: args.top_k,
        seed: args.seed,
    };

    let audio = pipeline
        .generate(&params)
        .map_err(|e| anyhow::anyhow!("generation failed: {e}"))?;

    write_wav(&args.output, &audio.samples, audio.sample_rate)
        .map_err(|e| anyhow::anyhow!("failed to write audio: {e}"))?;

    let summary = serde_json::json!({
        "path": args.output,
        "duration_s": audio.duration_s(),
        "sample_rate": audio.sample_rate,
        "channels": audio.channels,
        "tokens": audio.tokens.len(),
    });
    println!("{summary}");

    Ok(())
}
