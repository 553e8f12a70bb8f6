//! Tokenizer definition loading.
//!
//! Normalizes every supported vocabulary shape into one [`Vocabulary`]:
//!
//! - `model.vocab` as a `{token: id}` map (BPE-style, no scores)
//! - `model.vocab` as a `[[token, score], ...]` list, id = list position (Unigram-style)
//! - `model.merges` as `"left right"` strings or `["left", "right"]` pairs, rank = position
//! - top-level `added_tokens` as `{id, content}`, applied last and overriding base entries
//!
//! A vocabulary is built once and then shared read-only (usually behind an `Arc`).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::config::SpecialTokenNames;
use crate::{Error, Result};

/// Structural role of a special token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialRole {
    Bos,
    Eos,
    Pad,
    Unk,
}

impl SpecialRole {
    pub const ALL: [SpecialRole; 4] = [Self::Bos, Self::Eos, Self::Pad, Self::Unk];

    pub fn name(self) -> &'static str {
        match self {
            Self::Bos => "BOS",
            Self::Eos => "EOS",
            Self::Pad => "PAD",
            Self::Unk => "UNK",
        }
    }
}

/// Segmentation strategy declared by the definition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    Bpe,
    Unigram,
}

/// One vocabulary entry. `score` is only present for Unigram-style vocabularies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VocabEntry {
    pub id: u32,
    pub score: Option<f32>,
}

/// An ordered merge rule. Its rank is its index in [`Vocabulary::merges`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeRule {
    pub left: String,
    pub right: String,
}

/// An added token from the definition file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialToken {
    pub content: String,
    pub id: u32,
    pub role: Option<SpecialRole>,
}

/// Normalized, immutable tokenizer vocabulary.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    model_type: ModelType,
    entries: HashMap<String, VocabEntry>,
    merges: Vec<MergeRule>,
    special_tokens: Vec<SpecialToken>,
    roles: HashMap<SpecialRole, u32>,
    max_token_chars: usize,
}

// ── On-disk shapes ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct DefinitionFile {
    model: ModelSection,
    #[serde(default)]
    added_tokens: Vec<AddedToken>,
}

#[derive(Deserialize)]
struct ModelSection {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    vocab: VocabSource,
    #[serde(default)]
    merges: Option<Vec<MergeSource>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VocabSource {
    Map(HashMap<String, u32>),
    Scored(Vec<(String, f64)>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MergeSource {
    Joined(String),
    Pair(String, String),
}

#[derive(Deserialize)]
struct AddedToken {
    id: u32,
    content: String,
}

impl MergeSource {
    fn into_rule(self, rank: usize) -> Result<MergeRule> {
        match self {
            MergeSource::Joined(line) => parse_merge_line(&line)
                .ok_or_else(|| Error::Parse(format!("merge rule {rank} is not \"left right\": {line:?}"))),
            MergeSource::Pair(left, right) => Ok(MergeRule { left, right }),
        }
    }
}

fn parse_merge_line(line: &str) -> Option<MergeRule> {
    let mut parts = line.split_whitespace();
    let left = parts.next()?;
    let right = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(MergeRule {
        left: left.to_string(),
        right: right.to_string(),
    })
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl Vocabulary {
    /// Load a `tokenizer.json`-style definition with the default role names.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with_names(path, &SpecialTokenNames::default())
    }

    pub fn from_file_with_names(path: impl AsRef<Path>, names: &SpecialTokenNames) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Loading tokenizer definition from {:?}", path);
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Parse(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text, names)
    }

    /// Parse a definition document already in memory.
    pub fn from_json_str(text: &str, names: &SpecialTokenNames) -> Result<Self> {
        let file: DefinitionFile = serde_json::from_str(text)
            .map_err(|e| Error::Parse(format!("tokenizer definition: {e}")))?;

        let scored = matches!(file.model.vocab, VocabSource::Scored(_));
        let model_type = match file.model.kind.as_deref() {
            Some("BPE") => ModelType::Bpe,
            Some("Unigram") => ModelType::Unigram,
            Some(other) => {
                return Err(Error::Parse(format!("unsupported model type {other:?}")));
            }
            None if scored => ModelType::Unigram,
            None => ModelType::Bpe,
        };

        let entries: HashMap<String, VocabEntry> = match file.model.vocab {
            VocabSource::Map(map) => map
                .into_iter()
                .map(|(token, id)| (token, VocabEntry { id, score: None }))
                .collect(),
            VocabSource::Scored(list) => {
                let mut entries = HashMap::with_capacity(list.len());
                for (position, (token, score)) in list.into_iter().enumerate() {
                    let id = u32::try_from(position)
                        .map_err(|_| Error::Parse("vocabulary exceeds u32 ids".into()))?;
                    entries.insert(
                        token,
                        VocabEntry {
                            id,
                            score: Some(score as f32),
                        },
                    );
                }
                entries
            }
        };

        let merges = file
            .model
            .merges
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(rank, merge)| merge.into_rule(rank))
            .collect::<Result<Vec<_>>>()?;

        let added = file
            .added_tokens
            .into_iter()
            .map(|t| (t.content, t.id))
            .collect();

        let vocab = Self::assemble(model_type, entries, merges, added, names);
        tracing::debug!(
            model_type = ?vocab.model_type,
            entries = vocab.entries.len(),
            merges = vocab.merges.len(),
            special = vocab.special_tokens.len(),
            "tokenizer definition loaded"
        );
        Ok(vocab)
    }

    /// Load a BPE vocabulary split across `vocab.json` and `merges.txt`.
    ///
    /// Blank lines and lines starting with `#` in the merges file are skipped.
    /// Special tokens are recognised among the vocab entries by their role names.
    pub fn from_vocab_and_merges(
        vocab_path: impl AsRef<Path>,
        merges_path: impl AsRef<Path>,
        names: &SpecialTokenNames,
    ) -> Result<Self> {
        let vocab_path = vocab_path.as_ref();
        let merges_path = merges_path.as_ref();
        let vocab_text = std::fs::read_to_string(vocab_path)
            .map_err(|e| Error::Parse(format!("{}: {e}", vocab_path.display())))?;
        let merges_text = std::fs::read_to_string(merges_path)
            .map_err(|e| Error::Parse(format!("{}: {e}", merges_path.display())))?;
        Self::from_vocab_and_merges_str(&vocab_text, &merges_text, names)
    }

    pub fn from_vocab_and_merges_str(
        vocab_text: &str,
        merges_text: &str,
        names: &SpecialTokenNames,
    ) -> Result<Self> {
        let map: HashMap<String, u32> = serde_json::from_str(vocab_text)
            .map_err(|e| Error::Parse(format!("vocab file: {e}")))?;
        let entries = map
            .into_iter()
            .map(|(token, id)| (token, VocabEntry { id, score: None }))
            .collect();

        let mut merges = Vec::new();
        for (line_no, line) in merges_text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let rule = parse_merge_line(line).ok_or_else(|| {
                Error::Parse(format!("merges line {}: expected \"left right\": {line:?}", line_no + 1))
            })?;
            merges.push(rule);
        }

        Ok(Self::assemble(ModelType::Bpe, entries, merges, Vec::new(), names))
    }

    fn assemble(
        model_type: ModelType,
        mut entries: HashMap<String, VocabEntry>,
        merges: Vec<MergeRule>,
        added: Vec<(String, u32)>,
        names: &SpecialTokenNames,
    ) -> Self {
        let mut special_tokens = Vec::with_capacity(added.len());
        for (content, id) in added {
            // Special ids win over the base entry; a Unigram score is kept.
            let score = entries.get(&content).and_then(|e| e.score);
            entries.insert(content.clone(), VocabEntry { id, score });
            special_tokens.push(SpecialToken {
                role: names.role_of(&content),
                content,
                id,
            });
        }

        let mut roles = HashMap::new();
        for role in SpecialRole::ALL {
            let content = names.content(role);
            let from_added = special_tokens
                .iter()
                .rev()
                .find(|t| t.content == content)
                .map(|t| t.id);
            if let Some(id) = from_added.or_else(|| entries.get(content).map(|e| e.id)) {
                roles.insert(role, id);
            }
        }

        let max_token_chars = entries
            .keys()
            .map(|token| token.chars().count())
            .max()
            .unwrap_or(0);

        Self {
            model_type,
            entries,
            merges,
            special_tokens,
            roles,
            max_token_chars,
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.entries.get(token).map(|e| e.id)
    }

    pub fn entry(&self, token: &str) -> Option<&VocabEntry> {
        self.entries.get(token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge rules in rank order (index 0 = applied first).
    pub fn merges(&self) -> &[MergeRule] {
        &self.merges
    }

    pub fn special_tokens(&self) -> &[SpecialToken] {
        &self.special_tokens
    }

    /// Id mapped to `role`, if any.
    pub fn special_id(&self, role: SpecialRole) -> Option<u32> {
        self.roles.get(&role).copied()
    }

    /// Id mapped to `role`, or [`Error::MissingToken`].
    pub fn require_special(&self, role: SpecialRole) -> Result<u32> {
        self.special_id(role).ok_or_else(|| {
            Error::MissingToken(format!("no {} token in the loaded vocabulary", role.name()))
        })
    }

    /// Length in characters of the longest vocabulary entry.
    pub fn max_token_chars(&self) -> usize {
        self.max_token_chars
    }
}
