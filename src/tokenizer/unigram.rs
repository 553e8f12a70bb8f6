//! Unigram segmentation via Viterbi over a scored vocabulary.
//!
//! `best[i]` holds the highest total score of any segmentation of the first
//! `i` characters. Candidate split points `j` are visited in increasing order
//! and only a strictly greater score replaces the current best, so equal-score
//! ties resolve to the smallest `j`. Text with no full segmentation encodes to
//! an empty sequence.

use std::sync::Arc;

use super::vocab::Vocabulary;

/// Word-boundary marker substituted for spaces before segmentation.
pub const WORD_BOUNDARY: char = '\u{2581}';

#[derive(Debug, Clone, Copy)]
struct Cell {
    score: f32,
    /// Character index where the last piece starts.
    start: usize,
    id: u32,
}

/// Viterbi Unigram encoder over a shared vocabulary.
#[derive(Debug, Clone)]
pub struct UnigramEncoder {
    vocab: Arc<Vocabulary>,
}

impl UnigramEncoder {
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self { vocab }
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocab
    }

    /// Lowercase, mark word boundaries, then segment.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        self.segment(&prepare(text))
    }

    /// Maximum-score segmentation of `text` as-is.
    ///
    /// Entries without a score are not candidates.
    pub fn segment(&self, text: &str) -> Vec<u32> {
        // Byte offset of every char boundary, including the end.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let len = bounds.len() - 1;
        let max_piece = self.vocab.max_token_chars();

        let mut best: Vec<Option<Cell>> = vec![None; len + 1];
        let mut prefix_scores: Vec<Option<f32>> = vec![None; len + 1];
        prefix_scores[0] = Some(0.0);

        for i in 1..=len {
            // Pieces longer than the longest entry cannot match.
            for j in i.saturating_sub(max_piece)..i {
                let Some(prev) = prefix_scores[j] else {
                    continue;
                };
                let Some(entry) = self.vocab.entry(&text[bounds[j]..bounds[i]]) else {
                    continue;
                };
                let Some(piece_score) = entry.score else {
                    continue;
                };
                let score = prev + piece_score;
                if best[i].is_none_or(|cell| score > cell.score) {
                    best[i] = Some(Cell {
                        score,
                        start: j,
                        id: entry.id,
                    });
                }
            }
            prefix_scores[i] = best[i].map(|cell| cell.score);
        }

        if len > 0 && best[len].is_none() {
            tracing::debug!("no unigram segmentation for {:?}", text);
            return Vec::new();
        }

        let mut ids = Vec::new();
        let mut end = len;
        while end > 0 {
            let Some(cell) = best[end] else {
                return Vec::new();
            };
            ids.push(cell.id);
            end = cell.start;
        }
        ids.reverse();
        ids
    }
}

/// Lowercase and replace every space with [`WORD_BOUNDARY`].
pub fn prepare(text: &str) -> String {
    text.to_lowercase().replace(' ', &WORD_BOUNDARY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecialTokenNames;

    fn encoder(json: &str) -> UnigramEncoder {
        let vocab = Vocabulary::from_json_str(json, &SpecialTokenNames::default()).unwrap();
        UnigramEncoder::new(Arc::new(vocab))
    }

    #[test]
    fn test_prefers_higher_total_score() {
        // ids by position: a=0, b=1, ab=2
        let enc = encoder(r#"{"model": {"vocab": [["a", 1.0], ["b", 1.0], ["ab", 5.0]]}}"#);
        assert_eq!(enc.encode("ab"), vec![2]);
    }

    #[test]
    fn test_split_beats_weak_whole() {
        let enc = encoder(r#"{"model": {"vocab": [["a", -1.0], ["b", -1.0], ["ab", -5.0]]}}"#);
        assert_eq!(enc.encode("ab"), vec![0, 1]);
    }

    #[test]
    fn test_tie_keeps_earliest_split() {
        // Two segmentations of "abc" with score 2.0:
        //   j=1: "a" + "bc"   (examined first)
        //   j=2: "ab" + "c"
        let enc = encoder(
            r#"{"model": {"vocab": [["a", 1.0], ["bc", 1.0], ["ab", 1.0], ["c", 1.0]]}}"#,
        );
        assert_eq!(enc.segment("abc"), vec![0, 1]);
    }

    #[test]
    fn test_tie_with_whole_piece_keeps_split_from_zero() {
        // "ab" whole (j=0) vs "a"+"b" (j=1) both score 2.0; j=0 is examined first.
        let enc = encoder(r#"{"model": {"vocab": [["a", 1.0], ["b", 1.0], ["ab", 2.0]]}}"#);
        assert_eq!(enc.segment("ab"), vec![2]);
    }

    #[test]
    fn test_unsegmentable_is_empty() {
        let enc = encoder(r#"{"model": {"vocab": [["a", -1.0]]}}"#);
        assert!(enc.encode("ax").is_empty());
        assert!(enc.encode("").is_empty());
    }

    #[test]
    fn test_word_boundary_marker() {
        assert_eq!(prepare("Calm Piano"), "calm\u{2581}piano");
        let enc = encoder(
            r#"{"model": {"vocab": [["calm", -1.0], ["▁piano", -1.0], ["▁", -3.0],
                ["piano", -2.0]]}}"#,
        );
        assert_eq!(enc.encode("Calm Piano"), vec![0, 1]);
    }

    #[test]
    fn test_multibyte_characters() {
        let enc = encoder(r#"{"model": {"vocab": [["é", -1.0], ["té", -0.5], ["t", -1.0]]}}"#);
        assert_eq!(enc.segment("té"), vec![1]);
        assert_eq!(enc.segment("tét"), vec![1, 2]);
    }

    #[test]
    fn test_unscored_entries_are_skipped() {
        let enc = encoder(
            r#"{"model": {"vocab": [["a", -1.0]]}, "added_tokens": [{"id": 7, "content": "b"}]}"#,
        );
        assert!(enc.segment("ab").is_empty());
        assert_eq!(enc.segment("a"), vec![0]);
    }

    #[test]
    fn test_deterministic() {
        let enc = encoder(
            r#"{"model": {"vocab": [["a", -1.0], ["b", -1.0], ["ab", -2.0], ["ba", -2.0]]}}"#,
        );
        let first = enc.encode("abba ab");
        for _ in 0..5 {
            assert_eq!(enc.encode("abba ab"), first);
        }
    }
}
