//! Configuration for the MusicGen pipeline.
//!
//! Defaults match the reference deployment: a 1088-token text window,
//! 32 new tokens, 4 codebooks, top-k of 8 and 32 kHz mono output.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::codebook::VocoderInput;
use crate::tokenizer::bpe::Affix;
use crate::tokenizer::packing::MaskPolicy;
use crate::tokenizer::vocab::SpecialRole;
use crate::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicGenConfig {
    pub tokenizer: TokenizerConfig,
    pub generation: GenerationConfig,
    pub audio: AudioConfig,
}

impl MusicGenConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.tokenizer.max_text_length == 0 {
            return Err(Error::Config("tokenizer.max_text_length must be > 0".into()));
        }
        self.generation.validate()?;
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be > 0".into()));
        }
        Ok(())
    }
}

/// Content string of each special-token role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialTokenNames {
    pub bos: String,
    pub eos: String,
    pub pad: String,
    pub unk: String,
}

impl Default for SpecialTokenNames {
    fn default() -> Self {
        Self {
            bos: "<s>".to_string(),
            eos: "</s>".to_string(),
            pad: "<pad>".to_string(),
            unk: "<unk>".to_string(),
        }
    }
}

impl SpecialTokenNames {
    pub fn content(&self, role: SpecialRole) -> &str {
        match role {
            SpecialRole::Bos => &self.bos,
            SpecialRole::Eos => &self.eos,
            SpecialRole::Pad => &self.pad,
            SpecialRole::Unk => &self.unk,
        }
    }

    /// Role whose configured content equals `content`, if any.
    pub fn role_of(&self, content: &str) -> Option<SpecialRole> {
        SpecialRole::ALL
            .into_iter()
            .find(|&role| self.content(role) == content)
    }
}

/// Tokenization and packing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub special_tokens: SpecialTokenNames,
    /// BOS handling for the BPE strategy.
    pub bos: Affix,
    /// EOS handling for the BPE strategy.
    pub eos: Affix,
    /// Fixed length every encoded prompt is padded or truncated to.
    pub max_text_length: usize,
    pub mask_policy: MaskPolicy,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            special_tokens: SpecialTokenNames::default(),
            bos: Affix::IfPresent,
            eos: Affix::IfPresent,
            max_text_length: 1088,
            mask_policy: MaskPolicy::AllReal,
        }
    }
}

/// Autoregressive sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Exact number of decode steps; there is no early stop on EOS.
    pub max_new_tokens: usize,
    /// Classifier-free guidance scale. 1.0 disables guidance.
    pub guidance_scale: f32,
    pub top_k: usize,
    /// Rows the running sequence is replicated across for the decoder.
    pub num_codebooks: usize,
    /// Fixed seed for reproducible sampling. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 32,
            guidance_scale: 1.0,
            top_k: 8,
            num_codebooks: 4,
            seed: None,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::Config("generation.top_k must be > 0".into()));
        }
        if self.num_codebooks == 0 {
            return Err(Error::Config("generation.num_codebooks must be > 0".into()));
        }
        if !self.guidance_scale.is_finite() {
            return Err(Error::Config(format!(
                "generation.guidance_scale must be finite, got {}",
                self.guidance_scale
            )));
        }
        Ok(())
    }

    /// True when a negative context would actually change the logits.
    pub fn guidance_active(&self) -> bool {
        self.guidance_scale != 1.0
    }
}

/// Vocoder and output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub vocoder_input: VocoderInput,
    pub peak_normalize: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 32000,
            vocoder_input: VocoderInput::Codebooks,
            peak_normalize: false,
        }
    }
}
