//! ONNX Runtime engines for exported MusicGen graphs.
//!
//! Each engine owns one `ort` session; dropping the engine releases it.
//! Tensors are copied between candle (CPU) and ONNX Runtime at the boundary.

use std::borrow::Cow;
use std::path::Path;

use candle_core::{Device, Tensor};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::DynValue;

use super::{Decoder, TextEncoder, Vocoder};
use crate::{Error, Result};

fn load_session(path: &Path, name: &str) -> Result<Session> {
    if !path.exists() {
        return Err(Error::Inference(format!(
            "{name} model not found: {}",
            path.display()
        )));
    }
    tracing::info!("Loading {} session from {:?}", name, path);
    Session::builder()
        .map_err(|e| Error::Inference(format!("{name} session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| Error::Inference(format!("{name} optimization level: {e}")))?
        .commit_from_file(path)
        .map_err(|e| Error::Inference(format!("failed to load {name}: {e}")))
}

fn shape_i64(t: &Tensor) -> Vec<i64> {
    t.dims().iter().map(|&d| d as i64).collect()
}

fn i64_input(t: &Tensor) -> Result<SessionInputValue<'static>> {
    let data = t.flatten_all()?.to_vec1::<i64>()?;
    let value = ort::value::Tensor::from_array((shape_i64(t), data))
        .map_err(|e| Error::Inference(format!("i64 input tensor: {e}")))?;
    Ok(value.into())
}

fn f32_input(t: &Tensor) -> Result<SessionInputValue<'static>> {
    let data = t.flatten_all()?.to_vec1::<f32>()?;
    let value = ort::value::Tensor::from_array((shape_i64(t), data))
        .map_err(|e| Error::Inference(format!("f32 input tensor: {e}")))?;
    Ok(value.into())
}

/// An f32 output as a CPU candle tensor.
fn to_candle(value: &DynValue, name: &str) -> Result<Tensor> {
    let (shape, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|e| Error::Inference(format!("{name} output: {e}")))?;
    let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
    Ok(Tensor::from_vec(data.to_vec(), dims, &Device::Cpu)?)
}

/// Text encoder graph: `input_ids`, `attention_mask` → last hidden state.
pub struct OnnxTextEncoder {
    session: Session,
}

impl OnnxTextEncoder {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            session: load_session(path.as_ref(), "text encoder")?,
        })
    }
}

impl TextEncoder for OnnxTextEncoder {
    fn encode(&mut self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let inputs: Vec<(Cow<str>, SessionInputValue)> = vec![
            ("input_ids".into(), i64_input(input_ids)?),
            ("attention_mask".into(), i64_input(attention_mask)?),
        ];
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| Error::Inference(format!("text encoder: {e}")))?;
        to_candle(&outputs[0], "text encoder")
    }
}

/// Decoder graph: `input_ids`, `encoder_hidden_states`, `encoder_attention_mask` → logits.
pub struct OnnxDecoder {
    session: Session,
}

impl OnnxDecoder {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            session: load_session(path.as_ref(), "decoder")?,
        })
    }
}

impl Decoder for OnnxDecoder {
    fn forward(
        &mut self,
        input_ids: &Tensor,
        encoder_hidden_states: &Tensor,
        encoder_attention_mask: &Tensor,
    ) -> Result<Tensor> {
        let inputs: Vec<(Cow<str>, SessionInputValue)> = vec![
            ("input_ids".into(), i64_input(input_ids)?),
            ("encoder_hidden_states".into(), f32_input(encoder_hidden_states)?),
            ("encoder_attention_mask".into(), i64_input(encoder_attention_mask)?),
        ];
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| Error::Inference(format!("decoder: {e}")))?;
        to_candle(&outputs[0], "decoder")
    }
}

/// Vocoder graph: `audio_codes` (grid) or `input_audio` (single stream) → waveform.
pub struct OnnxVocoder {
    session: Session,
}

impl OnnxVocoder {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            session: load_session(path.as_ref(), "vocoder")?,
        })
    }
}

impl Vocoder for OnnxVocoder {
    fn decode(&mut self, codes: &Tensor) -> Result<Vec<f32>> {
        let input_name = if codes.rank() == 4 {
            "audio_codes"
        } else {
            "input_audio"
        };
        let inputs: Vec<(Cow<str>, SessionInputValue)> =
            vec![(input_name.into(), i64_input(codes)?)];
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| Error::Inference(format!("vocoder: {e}")))?;
        // [B, 1, samples] or [B, samples]; batch size is 1.
        let waveform = to_candle(&outputs[0], "vocoder")?;
        Ok(waveform.flatten_all()?.to_vec1::<f32>()?)
    }
}
