//! Configuration for the observation generator.
//!
//! One JSON document with three sections (`model`, `training`, `data`).
//! Every field has a default so partial files are accepted.

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObsGenConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub data: DataConfig,
}

/// Architecture of the graph collaborator and the text decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Width shared by node states, action states and decoder blocks. Must be even.
    pub hidden_dim: usize,
    pub word_emb_dim: usize,
    /// Fixed number of graph node slots.
    pub num_nodes: usize,
    /// Length of the precomputed positional table.
    pub max_positions: usize,
    pub text_decoder_num_blocks: usize,
    pub text_decoder_num_heads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_dim: 32,
            word_emb_dim: 32,
            num_nodes: 16,
            max_positions: 512,
            text_decoder_num_blocks: 1,
            text_decoder_num_heads: 1,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.hidden_dim > 0, "hidden_dim must be > 0");
        ensure!(
            self.hidden_dim % 2 == 0,
            "hidden_dim has to be even for positional encoding, got {}",
            self.hidden_dim
        );
        ensure!(
            self.text_decoder_num_heads > 0
                && self.hidden_dim % self.text_decoder_num_heads == 0,
            "hidden_dim ({}) must be divisible by text_decoder_num_heads ({})",
            self.hidden_dim,
            self.text_decoder_num_heads
        );
        ensure!(self.word_emb_dim > 0, "word_emb_dim must be > 0");
        ensure!(self.num_nodes > 0, "num_nodes must be > 0");
        ensure!(self.max_positions > 0, "max_positions must be > 0");
        ensure!(
            self.text_decoder_num_blocks > 0,
            "text_decoder_num_blocks must be > 0"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    /// Episodes per batch.
    pub batch_size: usize,
    pub max_epochs: usize,
    /// Epochs without validation improvement before stopping. `None` disables.
    pub patience: Option<usize>,
    /// Optimizer steps between refreshes of the frozen evaluation copy.
    pub eval_sync_interval: usize,
    pub grad_clip_norm: Option<f32>,
    /// Number of (ground truth, generated) pairs sampled into the log table.
    pub sample_k_gen_obs: usize,
    pub seed: u64,
    pub run_test: bool,
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            batch_size: 4,
            max_epochs: 10,
            patience: Some(3),
            eval_sync_interval: 1,
            grad_clip_norm: Some(1.0),
            sample_k_gen_obs: 5,
            seed: 42,
            run_test: true,
            checkpoint_dir: None,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.learning_rate > 0.0, "learning_rate must be positive");
        ensure!(self.batch_size > 0, "batch_size must be > 0");
        ensure!(self.eval_sync_interval > 0, "eval_sync_interval must be > 0");
        Ok(())
    }
}

/// File locations. Episodes are JSON lines, one `EpisodeRecord` per line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub word_vocab_path: Option<PathBuf>,
    pub pretrained_word_embedding_path: Option<PathBuf>,
    pub train_path: Option<PathBuf>,
    pub val_path: Option<PathBuf>,
    pub test_path: Option<PathBuf>,
}

impl ObsGenConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open config file: {:?}", path))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate().context("invalid model config")?;
        self.training.validate().context("invalid training config")?;
        Ok(())
    }
}
