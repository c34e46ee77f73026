//! Fixed-size word-index vocabulary.
//!
//! The pretrained weights were fitted against a specific tokenizer family,
//! so this module reproduces its semantics exactly: lowercase, replace
//! filter characters with spaces, split on whitespace, rank words by
//! descending frequency (ties broken by first occurrence), and assign
//! indices starting at 1. Index 0 is reserved for padding; when an
//! out-of-vocabulary token is configured it takes index 1 and real words
//! start at 2.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConformaError, Result};

/// Default character set replaced with spaces before splitting.
pub const DEFAULT_FILTERS: &str = "!\"#$%&()*+,-./:;<=>?@[\\]^_`{|}~\t\n";

/// Tokenizer settings fixed at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabConfig {
    /// Number of most-frequent words retained.
    pub max_words: usize,
    pub lowercase: bool,
    pub filters: String,
    /// When set, unknown words map to index 1 instead of being dropped.
    pub oov_token: Option<String>,
}

impl Default for VocabConfig {
    fn default() -> Self {
        Self {
            max_words: 10_000,
            lowercase: true,
            filters: DEFAULT_FILTERS.to_string(),
            oov_token: None,
        }
    }
}

/// Word-to-index table produced by [`Vocabulary::fit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    config: VocabConfig,
    index: HashMap<String, u32>,
    oov_index: Option<u32>,
    document_count: usize,
}

impl Vocabulary {
    /// Fit a vocabulary over a corpus.
    ///
    /// Indices are dense: `1..=len` without an OOV token, `2..=len+1` with
    /// one (the OOV token itself holds index 1).
    pub fn fit<I, S>(texts: I, config: VocabConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if config.max_words == 0 {
            return Err(ConformaError::InvalidConfig {
                field: "vocab.max_words".into(),
                reason: "must be at least 1".into(),
            });
        }

        // Count word frequencies, remembering first-seen order for ties.
        let mut counts: HashMap<String, (u64, usize)> = HashMap::new();
        let mut document_count = 0usize;
        for text in texts {
            document_count += 1;
            for token in tokenize(text.as_ref(), &config) {
                let first_seen = counts.len();
                let entry = counts.entry(token).or_insert((0, first_seen));
                entry.0 += 1;
            }
        }

        let mut ordered: Vec<(String, u64, usize)> = counts
            .into_iter()
            .map(|(word, (count, first_seen))| (word, count, first_seen))
            .collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ordered.truncate(config.max_words);

        let base: u32 = if config.oov_token.is_some() { 2 } else { 1 };
        let mut index = HashMap::with_capacity(ordered.len());
        for (i, (word, _, _)) in ordered.into_iter().enumerate() {
            index.insert(word, base + i as u32);
        }
        let oov_index = config.oov_token.as_ref().map(|_| 1);

        info!(
            words = index.len(),
            documents = document_count,
            oov = config.oov_token.is_some(),
            "fitted vocabulary"
        );
        Ok(Self {
            config,
            index,
            oov_index,
            document_count,
        })
    }

    /// Number of retained words (the OOV slot is not counted).
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Index for a word, honoring the OOV mapping.
    pub fn get(&self, word: &str) -> Option<u32> {
        self.index.get(word).copied().or(self.oov_index)
    }

    pub fn oov_index(&self) -> Option<u32> {
        self.oov_index
    }

    pub fn document_count(&self) -> usize {
        self.document_count
    }

    pub fn config(&self) -> &VocabConfig {
        &self.config
    }

    /// Number of embedding rows needed to cover every index plus padding
    /// row 0.
    pub fn rows(&self) -> usize {
        let oov_slot = usize::from(self.oov_index.is_some());
        1 + oov_slot + self.index.len()
    }

    /// Encode a text into token ids. Words outside the vocabulary map to
    /// the OOV index when configured, otherwise they are dropped.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        tokenize(text, &self.config)
            .into_iter()
            .filter_map(|token| self.index.get(&token).copied().or(self.oov_index))
            .collect()
    }

    /// Encode and pad in one step.
    pub fn encode_padded(&self, text: &str, seq_len: usize) -> Vec<u32> {
        pad(&self.encode(text), seq_len)
    }

    /// Iterate over `(word, index)` pairs in arbitrary order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, u32)> {
        self.index.iter().map(|(w, i)| (w.as_str(), *i))
    }

    /// Write the vocabulary as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json).map_err(|e| {
            ConformaError::Vocab(format!(
                "failed to write {}: {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Load a vocabulary saved by [`Vocabulary::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref()).map_err(|e| {
            ConformaError::Vocab(format!("failed to read {}: {}", path.as_ref().display(), e))
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Pad or truncate to exactly `seq_len` ids.
///
/// Shorter sequences are pre-padded with 0; longer ones keep their tail.
/// These are the defaults the pretrained weights were trained against.
pub fn pad(ids: &[u32], seq_len: usize) -> Vec<u32> {
    if ids.len() >= seq_len {
        ids[ids.len() - seq_len..].to_vec()
    } else {
        let mut out = vec![0u32; seq_len - ids.len()];
        out.extend_from_slice(ids);
        out
    }
}

fn tokenize(text: &str, config: &VocabConfig) -> Vec<String> {
    let lowered;
    let text = if config.lowercase {
        lowered = text.to_lowercase();
        &lowered
    } else {
        text
    };
    let mut cleaned = String::with_capacity(text.len());
    for ch in text.chars() {
        if config.filters.contains(ch) {
            cleaned.push(' ');
        } else {
            cleaned.push(ch);
        }
    }
    cleaned
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(texts: &[&str], config: VocabConfig) -> Vocabulary {
        Vocabulary::fit(texts.iter().copied(), config).unwrap()
    }

    #[test]
    fn test_filters_become_spaces() {
        let v = fit(&["state-of-the-art brake!"], VocabConfig::default());
        assert_eq!(v.len(), 5);
        assert!(v.get("state").is_some());
        assert!(v.get("art").is_some());
        assert!(v.get("brake").is_some());
        assert!(v.get("state-of-the-art").is_none());
    }

    #[test]
    fn test_frequency_ranking_starts_at_one() {
        let v = fit(&["b b a a a c"], VocabConfig::default());
        assert_eq!(v.get("a"), Some(1));
        assert_eq!(v.get("b"), Some(2));
        assert_eq!(v.get("c"), Some(3));
        assert_eq!(v.rows(), 4);
    }

    #[test]
    fn test_ties_broken_by_first_occurrence() {
        let v = fit(&["zeta quay zeta quay"], VocabConfig::default());
        assert_eq!(v.get("zeta"), Some(1));
        assert_eq!(v.get("quay"), Some(2));
    }

    #[test]
    fn test_oov_takes_index_one() {
        let config = VocabConfig {
            oov_token: Some("<oov>".into()),
            ..VocabConfig::default()
        };
        let v = fit(&["alpha alpha beta"], config);
        assert_eq!(v.oov_index(), Some(1));
        assert_eq!(v.get("alpha"), Some(2));
        assert_eq!(v.get("beta"), Some(3));
        assert_eq!(v.get("missing"), Some(1));
        assert_eq!(v.rows(), 4);
    }

    #[test]
    fn test_max_words_keeps_most_frequent() {
        let config = VocabConfig {
            max_words: 2,
            ..VocabConfig::default()
        };
        let v = fit(&["a a a b b c"], config);
        assert_eq!(v.len(), 2);
        assert_eq!(v.get("a"), Some(1));
        assert_eq!(v.get("b"), Some(2));
        assert_eq!(v.get("c"), None);
        assert_eq!(v.encode("a c b"), vec![1, 2]);
    }

    #[test]
    fn test_unknown_words_dropped_without_oov() {
        let v = fit(&["weld seam"], VocabConfig::default());
        assert_eq!(v.encode("weld unknown seam"), vec![v.get("weld").unwrap(), v.get("seam").unwrap()]);
    }

    #[test]
    fn test_encode_empty_is_empty() {
        let v = fit(&["some words"], VocabConfig::default());
        assert!(v.encode("").is_empty());
        assert!(v.encode("!!! ...").is_empty());
    }

    #[test]
    fn test_lowercase_toggle() {
        let config = VocabConfig {
            lowercase: false,
            ..VocabConfig::default()
        };
        let v = fit(&["Brake brake"], config);
        assert_eq!(v.len(), 2);
        assert_ne!(v.get("Brake"), v.get("brake"));
    }

    #[test]
    fn test_pad_prepends_zeros() {
        assert_eq!(pad(&[5, 6], 5), vec![0, 0, 0, 5, 6]);
    }

    #[test]
    fn test_pad_truncates_keeping_tail() {
        assert_eq!(pad(&[1, 2, 3, 4, 5], 3), vec![3, 4, 5]);
    }

    #[test]
    fn test_pad_exact_length_unchanged() {
        assert_eq!(pad(&[7, 8, 9], 3), vec![7, 8, 9]);
    }

    #[test]
    fn test_encode_padded() {
        let v = fit(&["one two three"], VocabConfig::default());
        let ids = v.encode_padded("one three", 4);
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[0], 0);
        assert_eq!(ids[1], 0);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.json");
        let config = VocabConfig {
            oov_token: Some("<oov>".into()),
            max_words: 50,
            ..VocabConfig::default()
        };
        let v = fit(&["compliant brake hose", "non compliant weld"], config);
        v.save(&path).unwrap();
        let loaded = Vocabulary::load(&path).unwrap();
        assert_eq!(loaded.len(), v.len());
        assert_eq!(loaded.encode("compliant weld"), v.encode("compliant weld"));
        assert_eq!(loaded.oov_index(), v.oov_index());
    }

    #[test]
    fn test_zero_max_words_rejected() {
        let config = VocabConfig {
            max_words: 0,
            ..VocabConfig::default()
        };
        let err = Vocabulary::fit(["text"], config).unwrap_err();
        assert!(matches!(err, ConformaError::InvalidConfig { .. }));
    }
}
