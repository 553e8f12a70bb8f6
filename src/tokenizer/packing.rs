//! Fixed-length packing of token sequences.

use serde::{Deserialize, Serialize};

/// Which positions the attention mask marks as real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskPolicy {
    /// Every position is 1, padding included.
    #[default]
    AllReal,
    /// Padding positions are 0.
    MaskPadding,
}

/// A packed sequence and its parallel attention mask (always the same length).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedSequence {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u8>,
}

impl PackedSequence {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Ids widened to the model's integer type.
    pub fn ids_i64(&self) -> Vec<i64> {
        self.input_ids.iter().map(|&id| i64::from(id)).collect()
    }

    pub fn mask_i64(&self) -> Vec<i64> {
        self.attention_mask.iter().map(|&m| i64::from(m)).collect()
    }
}

/// Pads or truncates to a fixed target length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePacker {
    pub target_len: usize,
    pub pad_id: u32,
    pub mask_policy: MaskPolicy,
}

impl SequencePacker {
    pub fn new(target_len: usize, pad_id: u32) -> Self {
        Self {
            target_len,
            pad_id,
            mask_policy: MaskPolicy::AllReal,
        }
    }

    pub fn with_mask_policy(mut self, mask_policy: MaskPolicy) -> Self {
        self.mask_policy = mask_policy;
        self
    }

    pub fn pack(&self, ids: &[u32]) -> PackedSequence {
        if ids.len() > self.target_len {
            tracing::warn!(
                len = ids.len(),
                target = self.target_len,
                "token sequence truncated"
            );
        }
        let input_ids = pack(ids, self.target_len, self.pad_id);
        let real = ids.len().min(self.target_len);
        let attention_mask = match self.mask_policy {
            MaskPolicy::AllReal => vec![1; self.target_len],
            MaskPolicy::MaskPadding => (0..self.target_len).map(|i| u8::from(i < real)).collect(),
        };
        PackedSequence {
            input_ids,
            attention_mask,
        }
    }
}

/// Pad with `pad_id` or keep the first `target_len` ids. Over-length input is not an error.
pub fn pack(ids: &[u32], target_len: usize, pad_id: u32) -> Vec<u32> {
    let mut out = Vec::with_capacity(target_len);
    out.extend_from_slice(&ids[..ids.len().min(target_len)]);
    out.resize(target_len, pad_id);
    out
}
