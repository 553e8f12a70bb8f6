//! Autoregressive token generation.
//!
//! `GenerationController` runs exactly `max_new_tokens` decode steps. Each step:
//!
//! 1. replicate the running sequence across `num_codebooks` rows
//! 2. call the decoder with the conditioning context, keep the last position's logits
//! 3. with guidance active and a negative context, call it again and extrapolate
//! 4. top-k sample the next token and append it
//!
//! There is no end-of-sequence check. A decoder failure aborts the whole
//! request and the partial sequence is dropped.

use candle_core::{DType, Device, IndexOp, Tensor};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::sampling::{apply_guidance, sample_top_k};
use super::Decoder;
use crate::config::GenerationConfig;
use crate::{Error, Result};

/// Encoder output the decoder attends to.
#[derive(Debug, Clone)]
pub struct Conditioning {
    /// f32 `[1, textLength, hiddenDim]`
    pub hidden_states: Tensor,
    /// i64 `[1, textLength]`
    pub attention_mask: Tensor,
}

/// Prompt ids followed by the generated ids, as a single row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSequence {
    pub tokens: Vec<i64>,
    pub prompt_len: usize,
}

impl GeneratedSequence {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Only the sampled ids.
    pub fn generated(&self) -> &[i64] {
        &self.tokens[self.prompt_len..]
    }

    /// i64 tensor `[1, len]`.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_vec(self.tokens.clone(), (1, self.tokens.len()), device)?)
    }
}

/// Fixed-iteration sampling loop over an injected decoder.
pub struct GenerationController<D: Decoder> {
    decoder: D,
    config: GenerationConfig,
}

impl<D: Decoder> GenerationController<D> {
    pub fn new(decoder: D, config: GenerationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { decoder, config })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Generate with an RNG seeded from the config (or from the OS when unset).
    pub fn generate(
        &mut self,
        prompt: &[i64],
        conditioning: &Conditioning,
        negative: Option<&Conditioning>,
    ) -> Result<GeneratedSequence> {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.generate_with_rng(prompt, conditioning, negative, &mut rng)
    }

    pub fn generate_with_rng<R: rand::Rng>(
        &mut self,
        prompt: &[i64],
        conditioning: &Conditioning,
        negative: Option<&Conditioning>,
        rng: &mut R,
    ) -> Result<GeneratedSequence> {
        if prompt.is_empty() {
            return Err(Error::Config("generation needs at least one prompt token".into()));
        }
        let negative = negative.filter(|_| self.config.guidance_active());

        let mut sequence = Vec::with_capacity(prompt.len() + self.config.max_new_tokens);
        sequence.extend_from_slice(prompt);

        tracing::info!(
            prompt_len = prompt.len(),
            max_new_tokens = self.config.max_new_tokens,
            guidance = negative.is_some(),
            "starting generation"
        );

        for step in 0..self.config.max_new_tokens {
            let next = self.step(&sequence, conditioning, negative, rng)?;
            tracing::debug!(step, token = next, "sampled token");
            sequence.push(next);
        }

        Ok(GeneratedSequence {
            tokens: sequence,
            prompt_len: prompt.len(),
        })
    }

    fn step<R: rand::Rng>(
        &mut self,
        sequence: &[i64],
        conditioning: &Conditioning,
        negative: Option<&Conditioning>,
        rng: &mut R,
    ) -> Result<i64> {
        let device = conditioning.hidden_states.device();
        let input_ids = replicate_rows(sequence, self.config.num_codebooks, device)?;

        let pos = self.last_logits(&input_ids, conditioning)?;
        let neg = match negative {
            Some(negative) => Some(self.last_logits(&input_ids, negative)?),
            None => None,
        };
        let logits = apply_guidance(pos, neg.as_deref(), self.config.guidance_scale)?;

        Ok(i64::from(sample_top_k(&logits, self.config.top_k, rng)?))
    }

    fn last_logits(&mut self, input_ids: &Tensor, conditioning: &Conditioning) -> Result<Vec<f32>> {
        let logits = self.decoder.forward(
            input_ids,
            &conditioning.hidden_states,
            &conditioning.attention_mask,
        )?;
        last_position(&logits)
    }
}

/// The running sequence copied into each of `rows` rows: i64 `[rows, len]`.
pub fn replicate_rows(sequence: &[i64], rows: usize, device: &Device) -> Result<Tensor> {
    let flat: Vec<i64> = std::iter::repeat_n(sequence, rows).flatten().copied().collect();
    Ok(Tensor::from_vec(flat, (rows, sequence.len()), device)?)
}

/// Final time step of `[1, T, V]` logits as f32.
pub fn last_position(logits: &Tensor) -> Result<Vec<f32>> {
    let &[_, t, _] = logits.dims() else {
        return Err(Error::Inference(format!(
            "expected logits [1, T, V], got {:?}",
            logits.dims()
        )));
    };
    if t == 0 {
        return Err(Error::Inference("decoder returned zero time steps".into()));
    }
    Ok(logits.i((0, t - 1))?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
}
