//! Codebook layout for the vocoder.
//!
//! The decoder produces one token stream. The vocoder expects
//! `numCodebooks` parallel streams, so the stream is copied into every row.
//! No sampling happens here; per-codebook generation would replace this.

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Input layout of the vocoder model variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocoderInput {
    /// `[1, 1, numCodebooks, T]` grid.
    #[default]
    Codebooks,
    /// `[1, T]` single stream.
    SingleStream,
}

/// Row-major `(num_codebooks, len)` grid of codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodebookGrid {
    num_codebooks: usize,
    len: usize,
    codes: Vec<i64>,
}

impl CodebookGrid {
    /// Replicate `stream` into `num_codebooks` identical rows.
    pub fn expand(stream: &[i64], num_codebooks: usize) -> Self {
        let codes = std::iter::repeat_n(stream, num_codebooks)
            .flatten()
            .copied()
            .collect();
        Self {
            num_codebooks,
            len: stream.len(),
            codes,
        }
    }

    /// `(num_codebooks, len)`
    pub fn shape(&self) -> (usize, usize) {
        (self.num_codebooks, self.len)
    }

    pub fn row(&self, codebook: usize) -> &[i64] {
        &self.codes[codebook * self.len..(codebook + 1) * self.len]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[i64]> {
        (0..self.num_codebooks).map(|codebook| self.row(codebook))
    }

    /// i64 tensor `[1, 1, num_codebooks, len]`.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_vec(
            self.codes.clone(),
            (1, 1, self.num_codebooks, self.len),
            device,
        )?)
    }
}

/// Build the vocoder input tensor for `stream` in the given layout.
pub fn vocoder_codes(
    stream: &[i64],
    layout: VocoderInput,
    num_codebooks: usize,
    device: &Device,
) -> Result<Tensor> {
    match layout {
        VocoderInput::Codebooks => CodebookGrid::expand(stream, num_codebooks).to_tensor(device),
        VocoderInput::SingleStream => {
            Ok(Tensor::from_vec(stream.to_vec(), (1, stream.len()), device)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_row_is_the_stream() {
        let stream = [5, 9, 2, 7];
        let grid = CodebookGrid::expand(&stream, 4);
        assert_eq!(grid.shape(), (4, 4));
        assert_eq!(grid.rows().count(), 4);
        for row in grid.rows() {
            assert_eq!(row, &stream);
        }
    }

    #[test]
    fn test_grid_tensor_shape() {
        let grid = CodebookGrid::expand(&[1, 2, 3], 4);
        let t = grid.to_tensor(&Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[1, 1, 4, 3]);
        let rows: Vec<Vec<i64>> = t.squeeze(0).unwrap().squeeze(0).unwrap().to_vec2().unwrap();
        assert!(rows.iter().all(|r| r == &[1, 2, 3]));
    }

    #[test]
    fn test_empty_stream() {
        let grid = CodebookGrid::expand(&[], 3);
        assert_eq!(grid.shape(), (3, 0));
        assert!(grid.rows().all(|r| r.is_empty()));
    }

    #[test]
    fn test_single_stream_layout() {
        let t = vocoder_codes(&[4, 5], VocoderInput::SingleStream, 4, &Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[1, 2]);
        let t = vocoder_codes(&[4, 5], VocoderInput::Codebooks, 2, &Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[1, 1, 2, 2]);
    }
}
