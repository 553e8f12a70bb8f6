//! Byte-pair-encoding segmentation.
//!
//! Text is lowercased, every character outside `[a-z0-9']` becomes a space,
//! and each whitespace-separated word is segmented independently:
//!
//! 1. start from single-character symbols
//! 2. among the adjacent pairs present, pick the one with the lowest merge rank
//! 3. merge every non-overlapping occurrence of it, left to right
//! 4. repeat until no present pair has a rank
//!
//! Symbols missing from the vocabulary map to the UNK token.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::vocab::{SpecialRole, Vocabulary};
use crate::Result;

/// How a BOS/EOS marker is added around the encoded words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affix {
    /// Never add the marker.
    Never,
    /// Add it when the vocabulary maps the role, skip it otherwise.
    IfPresent,
    /// Add it; a vocabulary without the role is a `MissingToken` error.
    Required,
}

/// Greedy merge-rank BPE encoder over a shared vocabulary.
#[derive(Debug, Clone)]
pub struct BpeEncoder {
    vocab: Arc<Vocabulary>,
    ranks: HashMap<(String, String), usize>,
    bos: Option<u32>,
    eos: Option<u32>,
}

impl BpeEncoder {
    /// Fails with `MissingToken` when a `Required` marker has no mapped token.
    pub fn new(vocab: Arc<Vocabulary>, bos: Affix, eos: Affix) -> Result<Self> {
        let bos = affix_id(&vocab, bos, SpecialRole::Bos)?;
        let eos = affix_id(&vocab, eos, SpecialRole::Eos)?;
        // A duplicated rule keeps the rank of its last occurrence.
        let ranks = vocab
            .merges()
            .iter()
            .enumerate()
            .map(|(rank, rule)| ((rule.left.clone(), rule.right.clone()), rank))
            .collect();
        Ok(Self {
            vocab,
            ranks,
            bos,
            eos,
        })
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocab
    }

    /// Encode `text` to token ids, with BOS/EOS per the configured [`Affix`] policy.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let mut ids = Vec::new();
        ids.extend(self.bos);

        let mut unk: Option<u32> = None;
        for word in normalize(text).split_whitespace() {
            for symbol in self.segment(word) {
                let id = match self.vocab.id(&symbol) {
                    Some(id) => id,
                    None => match unk {
                        Some(id) => id,
                        None => {
                            let id = self.vocab.require_special(SpecialRole::Unk)?;
                            unk = Some(id);
                            id
                        }
                    },
                };
                ids.push(id);
            }
        }

        ids.extend(self.eos);
        Ok(ids)
    }

    /// Split one word into merged symbols.
    pub fn segment(&self, word: &str) -> Vec<String> {
        let mut symbols: Vec<String> = word.chars().map(String::from).collect();

        loop {
            let best = symbols
                .windows(2)
                .filter_map(|pair| {
                    self.ranks
                        .get(&(pair[0].clone(), pair[1].clone()))
                        .map(|&rank| (rank, pair))
                })
                .min_by_key(|&(rank, _)| rank)
                .map(|(_, pair)| (pair[0].clone(), pair[1].clone()));

            let Some((left, right)) = best else {
                break;
            };

            let mut merged = Vec::with_capacity(symbols.len());
            let mut i = 0;
            while i < symbols.len() {
                if i + 1 < symbols.len() && symbols[i] == left && symbols[i + 1] == right {
                    merged.push(format!("{left}{right}"));
                    i += 2;
                } else {
                    merged.push(std::mem::take(&mut symbols[i]));
                    i += 1;
                }
            }
            symbols = merged;
        }

        symbols
    }
}

fn affix_id(vocab: &Vocabulary, affix: Affix, role: SpecialRole) -> Result<Option<u32>> {
    match affix {
        Affix::Never => Ok(None),
        Affix::IfPresent => Ok(vocab.special_id(role)),
        Affix::Required => vocab.require_special(role).map(Some),
    }
}

/// Lowercase and replace everything outside `[a-z0-9']` with a space.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '\'' => c,
            _ => ' ',
        })
        .collect()
}
