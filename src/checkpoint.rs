// src/checkpoint.rs

//! Checkpoint save/load for observation generators
//!
//! Keeps config, vocabulary and weights in separate files:
//! `config.json`, `vocab.txt`, `model.mpk`.

use anyhow::{Context, Result, ensure};
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::config::ModelConfig;
use crate::embedding::random_word_embedding;
use crate::obsgen::ObsGenModel;
use crate::preprocessor::Preprocessor;

/// Everything needed to rebuild the module skeleton before loading weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub model: ModelConfig,
    pub vocab_size: usize,
    pub pad_id: usize,
}

/// Save model, config and vocabulary to a checkpoint directory
pub fn save_checkpoint<B: Backend>(
    model: &ObsGenModel<B>,
    config: &ModelConfig,
    preprocessor: &Preprocessor,
    checkpoint_dir: impl AsRef<Path>,
) -> Result<()> {
    let dir = checkpoint_dir.as_ref();
    std::fs::create_dir_all(dir).context("Failed to create checkpoint directory")?;

    let meta = CheckpointMeta {
        model: config.clone(),
        vocab_size: preprocessor.vocab_size(),
        pad_id: preprocessor.pad_id(),
    };
    let config_path = dir.join("config.json");
    let config_file = File::create(&config_path)
        .with_context(|| format!("Failed to create config file: {:?}", config_path))?;
    serde_json::to_writer_pretty(BufWriter::new(config_file), &meta)
        .context("Failed to serialize config")?;

    let vocab_path = dir.join("vocab.txt");
    let mut vocab_file = BufWriter::new(
        File::create(&vocab_path)
            .with_context(|| format!("Failed to create vocab file: {:?}", vocab_path))?,
    );
    for word in preprocessor.words() {
        writeln!(vocab_file, "{}", word).context("Failed to write vocab")?;
    }
    vocab_file.flush().context("Failed to write vocab")?;

    // MessagePack-based record
    let record_path = dir.join("model.mpk");
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(record_path, &recorder)
        .context("Failed to save model record")?;

    log::info!("Checkpoint saved to {:?}", dir);
    Ok(())
}

/// Load model, config and vocabulary from a checkpoint directory
pub fn load_checkpoint<B: Backend>(
    checkpoint_dir: impl AsRef<Path>,
    device: &B::Device,
) -> Result<(ObsGenModel<B>, ModelConfig, Preprocessor)> {
    let dir = checkpoint_dir.as_ref();

    let config_path = dir.join("config.json");
    let config_file = File::open(&config_path)
        .with_context(|| format!("Failed to open config file: {:?}", config_path))?;
    let meta: CheckpointMeta = serde_json::from_reader(BufReader::new(config_file))
        .context("Failed to deserialize config")?;
    meta.model.validate()?;

    let preprocessor = Preprocessor::from_vocab_file(dir.join("vocab.txt"))?;
    ensure!(
        preprocessor.vocab_size() == meta.vocab_size && preprocessor.pad_id() == meta.pad_id,
        "vocab.txt ({} words, pad {}) does not match config.json ({} words, pad {})",
        preprocessor.vocab_size(),
        preprocessor.pad_id(),
        meta.vocab_size,
        meta.pad_id
    );

    // Skeleton with the right shapes; every weight is replaced by the record.
    let word_embedding = random_word_embedding(
        meta.vocab_size,
        meta.model.word_emb_dim,
        meta.pad_id,
        0,
        device,
    );
    let model = ObsGenModel::<B>::new(&meta.model, word_embedding, meta.pad_id, device);

    let record_path = dir.join("model.mpk");
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let model = model
        .load_file(record_path, &recorder, device)
        .context("Failed to load model record")?;

    log::info!("Checkpoint loaded from {:?}", dir);
    Ok((model, meta.model, preprocessor))
}
