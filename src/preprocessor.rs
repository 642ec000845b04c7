//! Word-level preprocessing: text <-> token ids.

use anyhow::{Context, Result};
use burn::tensor::{Int, Tensor, backend::Backend};
use std::collections::HashMap;
use std::path::Path;

use crate::utils::{ids_to_tensor, mask_to_tensor};

pub const PAD: &str = "<pad>";
pub const UNK: &str = "<unk>";
pub const BOS: &str = "<bos>";
pub const EOS: &str = "<eos>";

#[derive(Debug, Clone)]
pub struct Preprocessor {
    words: Vec<String>,
    word_to_id: HashMap<String, usize>,
    pad_id: usize,
    unk_id: usize,
    bos_id: usize,
    eos_id: usize,
}

impl Preprocessor {
    /// Builds the vocabulary from `words` in order. Special tokens missing
    /// from the list are inserted at the front (`<pad>` first), duplicates
    /// keep their first id.
    pub fn new<S: AsRef<str>>(words: &[S]) -> Self {
        let mut vocab: Vec<String> = Vec::with_capacity(words.len() + 4);
        let present: Vec<&str> = words.iter().map(AsRef::as_ref).collect();
        for special in [PAD, UNK, BOS, EOS] {
            if !present.contains(&special) {
                vocab.push(special.to_string());
            }
        }
        vocab.extend(present.iter().map(|w| w.to_string()));

        let mut word_to_id = HashMap::with_capacity(vocab.len());
        let mut words = Vec::with_capacity(vocab.len());
        for word in vocab {
            if !word_to_id.contains_key(&word) {
                word_to_id.insert(word.clone(), words.len());
                words.push(word);
            }
        }

        // all four were inserted above if absent
        let id = |w: &str| word_to_id[w];
        let (pad_id, unk_id, bos_id, eos_id) = (id(PAD), id(UNK), id(BOS), id(EOS));

        Self {
            words,
            word_to_id,
            pad_id,
            unk_id,
            bos_id,
            eos_id,
        }
    }

    /// One word per line; blank lines are skipped. Words are lowercased to
    /// match `tokenize`.
    pub fn from_vocab_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read vocab file: {:?}", path))?;
        let words: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        Ok(Self::new(&words))
    }

    pub fn vocab_size(&self) -> usize {
        self.words.len()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn word_to_id(&self) -> &HashMap<String, usize> {
        &self.word_to_id
    }

    pub fn pad_id(&self) -> usize {
        self.pad_id
    }

    pub fn unk_id(&self) -> usize {
        self.unk_id
    }

    pub fn bos_id(&self) -> usize {
        self.bos_id
    }

    pub fn eos_id(&self) -> usize {
        self.eos_id
    }

    /// Lowercased whitespace tokenization.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_lowercase).collect()
    }

    pub fn words_to_ids<S: AsRef<str>>(&self, words: &[S]) -> Vec<i64> {
        words
            .iter()
            .map(|w| *self.word_to_id.get(w.as_ref()).unwrap_or(&self.unk_id) as i64)
            .collect()
    }

    /// Pads id rows to the longest row and builds the matching masks.
    pub fn pad_ids(&self, rows: Vec<Vec<i64>>) -> (Vec<Vec<i64>>, Vec<Vec<f32>>) {
        let max_len = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut masks = Vec::with_capacity(rows.len());
        let padded = rows
            .into_iter()
            .map(|mut row| {
                let mut mask = vec![1.0f32; row.len()];
                mask.resize(max_len, 0.0);
                masks.push(mask);
                row.resize(max_len, self.pad_id as i64);
                row
            })
            .collect();
        (padded, masks)
    }

    pub fn preprocess_tokenized<S: AsRef<str>>(
        &self,
        batch: &[Vec<S>],
    ) -> (Vec<Vec<i64>>, Vec<Vec<f32>>) {
        self.pad_ids(batch.iter().map(|words| self.words_to_ids(words)).collect())
    }

    /// Tokenizes, maps and pads a batch of texts.
    /// Returns ids [B, T] and mask [B, T].
    pub fn preprocess<B: Backend, S: AsRef<str>>(
        &self,
        texts: &[S],
        device: &B::Device,
    ) -> (Tensor<B, 2, Int>, Tensor<B, 2>) {
        let tokenized: Vec<Vec<String>> = texts.iter().map(|t| self.tokenize(t.as_ref())).collect();
        let (ids, mask) = self.preprocess_tokenized(&tokenized);
        (ids_to_tensor(&ids, device), mask_to_tensor(&mask, device))
    }

    /// Turns id rows back into text. Stops at the first pad or `<eos>`,
    /// skips `<bos>`.
    pub fn decode(&self, batch: &[Vec<i64>]) -> Vec<String> {
        batch
            .iter()
            .map(|ids| {
                ids.iter()
                    .map(|&id| id as usize)
                    .take_while(|&id| id != self.pad_id && id != self.eos_id)
                    .filter(|&id| id != self.bos_id)
                    .map(|id| self.words.get(id).map_or(UNK, String::as_str))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }
}
