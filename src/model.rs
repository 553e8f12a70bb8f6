//! Inference-engine contracts and the generation logic built on them.
//!
//! The neural networks are opaque: each stage is a trait taking and returning
//! candle tensors. Engines are constructed by the caller and lent to the
//! pipeline, so their lifetime (and the release of any session they own) is
//! tied to the owning value.
//!
//! ## Components
//!
//! - [`sampling`]: classifier-free guidance and top-k sampling
//! - [`generation`]: fixed-length autoregressive decode loop
//! - [`codebook`]: replication of the generated stream into vocoder rows
//! - `onnx`: ONNX Runtime engines (feature `onnx`)

pub mod codebook;
pub mod generation;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod sampling;

use candle_core::Tensor;

use crate::Result;

/// Text encoder: packed prompt → conditioning hidden states.
pub trait TextEncoder {
    /// - `input_ids`: i64 `[1, textLength]`
    /// - `attention_mask`: i64 `[1, textLength]`
    ///
    /// Returns f32 `[1, textLength, hiddenDim]`.
    fn encode(&mut self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor>;
}

/// Autoregressive decoder producing next-token logits.
pub trait Decoder {
    /// - `input_ids`: i64 `[numCodebooks, sequenceLength]`
    /// - `encoder_hidden_states`: f32 `[1, textLength, hiddenDim]`
    /// - `encoder_attention_mask`: i64 `[1, textLength]`
    ///
    /// Returns f32 logits `[1, sequenceLength, vocabSize]`.
    fn forward(
        &mut self,
        input_ids: &Tensor,
        encoder_hidden_states: &Tensor,
        encoder_attention_mask: &Tensor,
    ) -> Result<Tensor>;
}

/// Vocoder: audio codes → mono waveform.
pub trait Vocoder {
    /// `codes` is i64 `[1, 1, numCodebooks, T]` or `[1, T]` depending on the model variant.
    fn decode(&mut self, codes: &Tensor) -> Result<Vec<f32>>;
}

impl<T: TextEncoder + ?Sized> TextEncoder for &mut T {
    fn encode(&mut self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        (**self).encode(input_ids, attention_mask)
    }
}

impl<T: Decoder + ?Sized> Decoder for &mut T {
    fn forward(
        &mut self,
        input_ids: &Tensor,
        encoder_hidden_states: &Tensor,
        encoder_attention_mask: &Tensor,
    ) -> Result<Tensor> {
        (**self).forward(input_ids, encoder_hidden_states, encoder_attention_mask)
    }
}

impl<T: Vocoder + ?Sized> Vocoder for &mut T {
    fn decode(&mut self, codes: &Tensor) -> Result<Vec<f32>> {
        (**self).decode(codes)
    }
}
