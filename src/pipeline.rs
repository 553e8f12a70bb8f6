//! End-to-end inference pipeline.
//!
//! Orchestrates text-to-music generation:
//! 1. Tokenize the prompt (BPE or Unigram) and pack it to the text window
//! 2. Encode the packed ids into a conditioning context (plus a negative one under guidance)
//! 3. Run the fixed-length decode loop
//! 4. Lay the token stream out for the vocoder and synthesize the waveform

use candle_core::{Device, Tensor};

use crate::audio::peak_normalize;
use crate::config::{GenerationConfig, MusicGenConfig};
use crate::model::codebook::vocoder_codes;
use crate::model::generation::{Conditioning, GenerationController};
use crate::model::{Decoder, TextEncoder, Vocoder};
use crate::tokenizer::Tokenizer;
use crate::tokenizer::packing::PackedSequence;
use crate::Result;

/// Per-request parameters. `None` fields fall back to the pipeline config.
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    pub prompt: String,
    /// Text to steer away from. Only used when the guidance scale is not 1.0.
    pub negative_prompt: Option<String>,
    pub max_new_tokens: Option<usize>,
    pub guidance_scale: Option<f32>,
    pub top_k: Option<usize>,
    pub seed: Option<u64>,
}

impl GenerationParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// `base` with this request's overrides applied.
    pub fn resolve(&self, base: &GenerationConfig) -> GenerationConfig {
        GenerationConfig {
            max_new_tokens: self.max_new_tokens.unwrap_or(base.max_new_tokens),
            guidance_scale: self.guidance_scale.unwrap_or(base.guidance_scale),
            top_k: self.top_k.unwrap_or(base.top_k),
            num_codebooks: base.num_codebooks,
            seed: self.seed.or(base.seed),
        }
    }
}

/// Generated waveform plus the token sequence it was decoded from.
#[derive(Debug, Clone)]
pub struct GeneratedAudio {
    /// Mono f32 samples.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Prompt ids followed by the sampled ids.
    pub tokens: Vec<i64>,
}

impl GeneratedAudio {
    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Tokenizer plus the three inference engines.
pub struct MusicGenPipeline<E, D, V> {
    tokenizer: Tokenizer,
    text_encoder: E,
    decoder: D,
    vocoder: V,
    config: MusicGenConfig,
    device: Device,
}

impl<E: TextEncoder, D: Decoder, V: Vocoder> MusicGenPipeline<E, D, V> {
    /// Assemble a pipeline. Fails if the config is invalid or the vocabulary has no PAD token.
    pub fn new(
        tokenizer: Tokenizer,
        text_encoder: E,
        decoder: D,
        vocoder: V,
        config: MusicGenConfig,
    ) -> Result<Self> {
        config.validate()?;
        tokenizer.packer(&config.tokenizer)?;
        Ok(Self {
            tokenizer,
            text_encoder,
            decoder,
            vocoder,
            config,
            device: Device::Cpu,
        })
    }

    pub fn config(&self) -> &MusicGenConfig {
        &self.config
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Run one request from prompt text to waveform.
    pub fn generate(&mut self, params: &GenerationParams) -> Result<GeneratedAudio> {
        let generation = params.resolve(&self.config.generation);
        generation.validate()?;

        let packed = self.tokenizer.encode_packed(&params.prompt, &self.config.tokenizer)?;
        let conditioning = self.condition(&packed)?;

        let negative = match &params.negative_prompt {
            Some(text) if generation.guidance_active() => {
                let packed = self.tokenizer.encode_packed(text, &self.config.tokenizer)?;
                Some(self.condition(&packed)?)
            }
            _ => None,
        };

        let num_codebooks = generation.num_codebooks;
        let mut controller = GenerationController::new(&mut self.decoder, generation)?;
        let sequence = controller.generate(&packed.ids_i64(), &conditioning, negative.as_ref())?;

        let codes = vocoder_codes(
            &sequence.tokens,
            self.config.audio.vocoder_input,
            num_codebooks,
            &self.device,
        )?;
        let mut samples = self.vocoder.decode(&codes)?;
        if self.config.audio.peak_normalize {
            peak_normalize(&mut samples);
        }

        tracing::info!(
            tokens = sequence.len(),
            samples = samples.len(),
            "generation complete"
        );

        Ok(GeneratedAudio {
            samples,
            sample_rate: self.config.audio.sample_rate,
            channels: 1,
            tokens: sequence.tokens,
        })
    }

    fn condition(&mut self, packed: &PackedSequence) -> Result<Conditioning> {
        let len = packed.len();
        let input_ids = Tensor::from_vec(packed.ids_i64(), (1, len), &self.device)?;
        let attention_mask = Tensor::from_vec(packed.mask_i64(), (1, len), &self.device)?;
        let hidden_states = self.text_encoder.encode(&input_ids, &attention_mask)?;
        Ok(Conditioning {
            hidden_states,
            attention_mask,
        })
    }
}

#[cfg(feature = "onnx")]
mod onnx_loading {
    use std::path::{Path, PathBuf};

    use super::MusicGenPipeline;
    use crate::config::MusicGenConfig;
    use crate::model::onnx::{OnnxDecoder, OnnxTextEncoder, OnnxVocoder};
    use crate::tokenizer::Tokenizer;
    use crate::Result;

    /// On-disk locations of the tokenizer definition and the three exported graphs.
    #[derive(Debug, Clone)]
    pub struct ModelPaths {
        pub tokenizer: PathBuf,
        pub text_encoder: PathBuf,
        pub decoder: PathBuf,
        pub vocoder: PathBuf,
    }

    impl ModelPaths {
        /// Conventional file names inside one directory.
        pub fn in_dir(dir: impl AsRef<Path>) -> Self {
            let dir = dir.as_ref();
            Self {
                tokenizer: dir.join("tokenizer.json"),
                text_encoder: dir.join("text_encoder.onnx"),
                decoder: dir.join("decoder_model.onnx"),
                vocoder: dir.join("encodec_decode.onnx"),
            }
        }
    }

    /// Pipeline backed by ONNX Runtime sessions.
    pub type OnnxPipeline = MusicGenPipeline<OnnxTextEncoder, OnnxDecoder, OnnxVocoder>;

    impl OnnxPipeline {
        pub fn load(paths: &ModelPaths, config: MusicGenConfig) -> Result<Self> {
            tracing::info!("Loading tokenizer from {:?}", paths.tokenizer);
            let tokenizer = Tokenizer::from_file(&paths.tokenizer, &config.tokenizer)?;
            let text_encoder = OnnxTextEncoder::load(&paths.text_encoder)?;
            let decoder = OnnxDecoder::load(&paths.decoder)?;
            let vocoder = OnnxVocoder::load(&paths.vocoder)?;
            MusicGenPipeline::new(tokenizer, text_encoder, decoder, vocoder, config)
        }
    }
}

#[cfg(feature = "onnx")]
pub use onnx_loading::{ModelPaths, OnnxPipeline};

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::codebook::VocoderInput;
    use crate::tokenizer::vocab::Vocabulary;
    use crate::Error;

    pub(crate) const DEFINITION: &str = r#"{
        "model": {"type": "BPE", "vocab": {"<pad>": 0, "<unk>": 1, "c": 2, "a": 3, "l": 4, "m": 5,
            "ca": 6, "lm": 7, "calm": 8, "p": 9, "i": 10, "n": 11, "o": 12}, "merges": ["c a", "l m", "ca lm"]},
        "added_tokens": []
    }"#;

    pub(crate) fn tokenizer() -> Tokenizer {
        let config = MusicGenConfig::default();
        let vocab = Vocabulary::from_json_str(DEFINITION, &config.tokenizer.special_tokens).unwrap();
        Tokenizer::from_vocabulary(Arc::new(vocab), &config.tokenizer).unwrap()
    }

    pub(crate) fn small_config() -> MusicGenConfig {
        let mut config = MusicGenConfig::default();
        config.tokenizer.max_text_length = 6;
        config.generation.max_new_tokens = 3;
        config.generation.seed = Some(5);
        config
    }

    /// Hidden state per position: 1.0 for a real token, 0.0 for PAD.
    #[derive(Default)]
    pub(crate) struct EchoEncoder {
        pub(crate) calls: usize,
    }

    impl TextEncoder for EchoEncoder {
        fn encode(&mut self, input_ids: &Tensor, _attention_mask: &Tensor) -> Result<Tensor> {
            self.calls += 1;
            let ids: Vec<i64> = input_ids.squeeze(0)?.to_vec1()?;
            let hidden: Vec<f32> = ids.iter().map(|&id| if id == 0 { 0.0 } else { 1.0 }).collect();
            Ok(Tensor::from_vec(hidden, (1, ids.len(), 1), input_ids.device())?)
        }
    }

    /// Always prefers token 7.
    #[derive(Default)]
    pub(crate) struct FixedDecoder {
        pub(crate) calls: usize,
    }

    impl Decoder for FixedDecoder {
        fn forward(
            &mut self,
            input_ids: &Tensor,
            _encoder_hidden_states: &Tensor,
            _encoder_attention_mask: &Tensor,
        ) -> Result<Tensor> {
            self.calls += 1;
            let len = input_ids.dims()[1];
            let mut logits = vec![0f32; len * 10];
            for t in 0..len {
                logits[t * 10 + 7] = 100.0;
            }
            Ok(Tensor::from_vec(logits, (1, len, 10), input_ids.device())?)
        }
    }

    /// Two samples per code column; records the shape it was given.
    #[derive(Default)]
    pub(crate) struct ShapeVocoder {
        pub(crate) seen: Option<Vec<usize>>,
    }

    impl Vocoder for ShapeVocoder {
        fn decode(&mut self, codes: &Tensor) -> Result<Vec<f32>> {
            self.seen = Some(codes.dims().to_vec());
            let len = codes.dims().last().copied().unwrap_or(0);
            Ok((0..len * 2).map(|i| if i % 2 == 0 { 0.25 } else { -0.5 }).collect())
        }
    }

    #[test]
    fn test_end_to_end_shapes() {
        let mut encoder = EchoEncoder::default();
        let mut decoder = FixedDecoder::default();
        let mut vocoder = ShapeVocoder::default();
        let mut pipeline = MusicGenPipeline::new(
            tokenizer(),
            &mut encoder,
            &mut decoder,
            &mut vocoder,
            small_config(),
        )
        .unwrap();

        let audio = pipeline.generate(&GenerationParams::new("calm piano")).unwrap();
        // "calm" → [8], "piano" → p i a n o = [9, 10, 3, 11, 12], packed to 6.
        assert_eq!(&audio.tokens[..6], &[8, 9, 10, 3, 11, 12]);
        assert_eq!(&audio.tokens[6..], &[7, 7, 7]);
        assert_eq!(audio.sample_rate, 32000);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.samples.len(), 18);
        drop(pipeline);

        assert_eq!(encoder.calls, 1);
        assert_eq!(decoder.calls, 3);
        assert_eq!(vocoder.seen, Some(vec![1, 1, 4, 9]));
    }

    #[test]
    fn test_short_prompt_is_padded() {
        let mut pipeline = MusicGenPipeline::new(
            tokenizer(),
            EchoEncoder::default(),
            FixedDecoder::default(),
            ShapeVocoder::default(),
            small_config(),
        )
        .unwrap();
        let audio = pipeline.generate(&GenerationParams::new("calm")).unwrap();
        assert_eq!(&audio.tokens[..6], &[8, 0, 0, 0, 0, 0]);
        assert_eq!(audio.tokens.len(), 9);
    }

    #[test]
    fn test_negative_prompt_only_under_guidance() {
        let mut encoder = EchoEncoder::default();
        let mut decoder = FixedDecoder::default();
        let mut pipeline = MusicGenPipeline::new(
            tokenizer(),
            &mut encoder,
            &mut decoder,
            ShapeVocoder::default(),
            small_config(),
        )
        .unwrap();

        let mut params = GenerationParams::new("calm");
        params.negative_prompt = Some("noise".into());
        pipeline.generate(&params).unwrap();

        params.guidance_scale = Some(3.0);
        pipeline.generate(&params).unwrap();
        drop(pipeline);

        // 1 encode for the first request, 2 for the guided one.
        assert_eq!(encoder.calls, 3);
        // 3 steps unguided, 6 forwards guided.
        assert_eq!(decoder.calls, 9);
    }

    #[test]
    fn test_single_stream_vocoder_and_normalization() {
        let mut config = small_config();
        config.audio.vocoder_input = VocoderInput::SingleStream;
        config.audio.peak_normalize = true;
        let mut vocoder = ShapeVocoder::default();
        let mut pipeline = MusicGenPipeline::new(
            tokenizer(),
            EchoEncoder::default(),
            FixedDecoder::default(),
            &mut vocoder,
            config,
        )
        .unwrap();
        let audio = pipeline.generate(&GenerationParams::new("calm")).unwrap();
        assert_eq!(audio.samples[..2], [0.5, -1.0]);
        drop(pipeline);
        assert_eq!(vocoder.seen, Some(vec![1, 9]));
    }

    #[test]
    fn test_request_overrides() {
        let base = small_config().generation;
        let params = GenerationParams {
            max_new_tokens: Some(10),
            top_k: Some(2),
            ..GenerationParams::new("x")
        };
        let resolved = params.resolve(&base);
        assert_eq!(resolved.max_new_tokens, 10);
        assert_eq!(resolved.top_k, 2);
        assert_eq!(resolved.guidance_scale, base.guidance_scale);
        assert_eq!(resolved.seed, Some(5));
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut pipeline = MusicGenPipeline::new(
            tokenizer(),
            EchoEncoder::default(),
            FixedDecoder::default(),
            ShapeVocoder::default(),
            small_config(),
        )
        .unwrap();
        let params = GenerationParams {
            top_k: Some(0),
            ..GenerationParams::new("calm")
        };
        assert!(matches!(pipeline.generate(&params), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_pad_rejected_up_front() {
        let config = MusicGenConfig::default();
        let vocab = Vocabulary::from_json_str(
            r#"{"model": {"type": "BPE", "vocab": {"a": 0}, "merges": []}}"#,
            &config.tokenizer.special_tokens,
        )
        .unwrap();
        let tokenizer = Tokenizer::from_vocabulary(Arc::new(vocab), &config.tokenizer).unwrap();
        let result = MusicGenPipeline::new(
            tokenizer,
            EchoEncoder::default(),
            FixedDecoder::default(),
            ShapeVocoder::default(),
            config,
        );
        assert!(matches!(result, Err(Error::MissingToken(_))));
    }
}
