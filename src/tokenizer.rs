//! Text tokenization.
//!
//! One [`Tokenizer`] capability with two strategies, picked once from the
//! definition file's model type and never mixed per request:
//!
//! - [`bpe`]: greedy merge-rank byte-pair encoding
//! - [`unigram`]: Viterbi maximum-score segmentation
//!
//! [`vocab`] loads and normalizes the definition; [`packing`] pads or
//! truncates the result to the model's fixed text length.

pub mod bpe;
pub mod packing;
pub mod unigram;
pub mod vocab;

use std::path::Path;
use std::sync::Arc;

use crate::config::TokenizerConfig;
use crate::Result;
use bpe::BpeEncoder;
use packing::{PackedSequence, SequencePacker};
use unigram::UnigramEncoder;
use vocab::{ModelType, SpecialRole, Vocabulary};

/// Tokenizer selected from model metadata.
#[derive(Debug, Clone)]
pub enum Tokenizer {
    BytePairEncoding(BpeEncoder),
    UnigramViterbi(UnigramEncoder),
}

impl Tokenizer {
    /// Load a definition file and build the matching strategy.
    pub fn from_file(path: impl AsRef<Path>, config: &TokenizerConfig) -> Result<Self> {
        let vocab = Vocabulary::from_file_with_names(path, &config.special_tokens)?;
        Self::from_vocabulary(Arc::new(vocab), config)
    }

    /// Fails if a role the strategy requires (per `config`) is not mapped.
    pub fn from_vocabulary(vocab: Arc<Vocabulary>, config: &TokenizerConfig) -> Result<Self> {
        Ok(match vocab.model_type() {
            ModelType::Bpe => {
                Tokenizer::BytePairEncoding(BpeEncoder::new(vocab, config.bos, config.eos)?)
            }
            ModelType::Unigram => Tokenizer::UnigramViterbi(UnigramEncoder::new(vocab)),
        })
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        match self {
            Tokenizer::BytePairEncoding(enc) => enc.vocabulary(),
            Tokenizer::UnigramViterbi(enc) => enc.vocabulary(),
        }
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let ids = match self {
            Tokenizer::BytePairEncoding(enc) => enc.encode(text)?,
            Tokenizer::UnigramViterbi(enc) => enc.encode(text),
        };
        tracing::debug!("encoded {} chars into {} tokens", text.chars().count(), ids.len());
        Ok(ids)
    }

    /// Packer for this vocabulary's PAD token. Fails if PAD is not mapped.
    pub fn packer(&self, config: &TokenizerConfig) -> Result<SequencePacker> {
        let pad_id = self.vocabulary().require_special(SpecialRole::Pad)?;
        Ok(SequencePacker::new(config.max_text_length, pad_id).with_mask_policy(config.mask_policy))
    }

    /// Encode and pack to `config.max_text_length`.
    pub fn encode_packed(&self, text: &str, config: &TokenizerConfig) -> Result<PackedSequence> {
        let packer = self.packer(config)?;
        Ok(packer.pack(&self.encode(text)?))
    }
}
