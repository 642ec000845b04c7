//! Word embedding tables: pretrained vectors (fastText text format) or
//! seeded random rows. The pad row is always zero and the table is frozen.

use anyhow::{Context, Result, bail, ensure};
use burn::{
    module::{Module, Param},
    nn::{Embedding, EmbeddingConfig},
    tensor::{Tensor, TensorData, backend::Backend},
};
use log::{debug, info};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, StandardNormal};
use std::path::Path;

use crate::preprocessor::Preprocessor;

/// Builds a frozen embedding from a row-major [vocab_size, dim] table.
/// The `pad_id` row is overwritten with zeros.
pub fn word_embedding_from_table<B: Backend>(
    mut table: Vec<f32>,
    vocab_size: usize,
    dim: usize,
    pad_id: usize,
    device: &B::Device,
) -> Embedding<B> {
    assert_eq!(
        table.len(),
        vocab_size * dim,
        "embedding table must hold vocab_size * dim values"
    );
    assert!(pad_id < vocab_size, "pad_id {} out of range", pad_id);
    table[pad_id * dim..(pad_id + 1) * dim].fill(0.0);

    let weight = Tensor::<B, 2>::from_data(TensorData::new(table, [vocab_size, dim]), device);
    let mut embedding = EmbeddingConfig::new(vocab_size, dim).init(device);
    embedding.weight = Param::from_tensor(weight);
    embedding.no_grad()
}

/// Every row drawn from N(0, 1) with a fixed seed, pad row zero.
pub fn random_word_embedding<B: Backend>(
    vocab_size: usize,
    dim: usize,
    pad_id: usize,
    seed: u64,
    device: &B::Device,
) -> Embedding<B> {
    let mut rng = StdRng::seed_from_u64(seed);
    let table: Vec<f32> = (0..vocab_size * dim)
        .map(|_| StandardNormal.sample(&mut rng))
        .collect();
    word_embedding_from_table(table, vocab_size, dim, pad_id, device)
}

/// Loads a vectors file of the form
///
/// ```text
/// <count> <dim>
/// <word> <f32> <f32> ...
/// ```
///
/// into a table sized to the preprocessor's vocabulary. Words missing from
/// the file get N(0, 1) rows from a `seed`-ed RNG; the pad row is zero.
pub fn load_word_vectors<B: Backend>(
    path: impl AsRef<Path>,
    preprocessor: &Preprocessor,
    seed: u64,
    device: &B::Device,
) -> Result<Embedding<B>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read word vectors: {:?}", path))?;
    let mut lines = text.lines();

    let header = lines.next().context("word vectors file is empty")?;
    let fields: Vec<&str> = header.split_whitespace().collect();
    ensure!(
        fields.len() == 2,
        "expected '<count> <dim>' header, got {:?}",
        header
    );
    let dim: usize = fields[1]
        .parse()
        .with_context(|| format!("invalid dimension in header {:?}", header))?;
    ensure!(dim > 0, "embedding dimension must be > 0");

    let vocab_size = preprocessor.vocab_size();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut table: Vec<f32> = (0..vocab_size * dim)
        .map(|_| StandardNormal.sample(&mut rng))
        .collect();

    let mut found = 0usize;
    for (line_no, line) in lines.enumerate() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let (word, rest) = match line.split_once(' ') {
            Some(parts) => parts,
            None => bail!("line {}: missing vector values", line_no + 2),
        };
        let Some(&id) = preprocessor.word_to_id().get(word) else {
            continue;
        };
        let values = rest
            .split_whitespace()
            .map(str::parse::<f32>)
            .collect::<Result<Vec<f32>, _>>()
            .with_context(|| format!("line {}: invalid float for {:?}", line_no + 2, word))?;
        ensure!(
            values.len() == dim,
            "line {}: expected {} values for {:?}, got {}",
            line_no + 2,
            dim,
            word,
            values.len()
        );
        table[id * dim..(id + 1) * dim].copy_from_slice(&values);
        found += 1;
        debug!("word vector loaded for {:?} (id {})", word, id);
    }

    info!(
        "Loaded {} / {} word vectors (dim {}) from {:?}",
        found, vocab_size, dim, path
    );
    Ok(word_embedding_from_table(
        table,
        vocab_size,
        dim,
        preprocessor.pad_id(),
        device,
    ))
}
