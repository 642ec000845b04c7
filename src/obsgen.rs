//! Observation generation over whole episodes.
//!
//! Steps are processed strictly in order: the recurrent state `h_t` returned
//! by the graph collaborator at step i is passed explicitly into step i + 1.
//! Nothing else crosses step boundaries.

use anyhow::Result;
use burn::{
    module::Module,
    nn::{Embedding, Linear, LinearConfig},
    tensor::{ElementConversion, Int, Tensor, activation, backend::Backend},
};
use log::{debug, info};
use std::path::Path;

use crate::config::ModelConfig;
use crate::data::{EpisodeBatch, StepBatch};
use crate::decoder::TextDecoder;
use crate::embedding::{load_word_vectors, random_word_embedding};
use crate::graph::{BaselineGraphUpdater, GraphRepresentation, GraphRepresentationOutput};
use crate::preprocessor::Preprocessor;
use crate::utils::{sequence_f1, tensor_to_ids};

// ─────────────────────────────────────────────────────────────────────────────
// Loss and decoding
// ─────────────────────────────────────────────────────────────────────────────

/// Per-example summed cross-entropy.
///
/// logits: [B, T, V], targets: [B, T] -> [B]
///
/// Positions whose target equals `ignore_index` are dropped by index: their
/// loss term is removed after the log-prob lookup, so they contribute
/// neither value nor gradient.
pub fn masked_cross_entropy<B: Backend>(
    logits: Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    ignore_index: usize,
) -> Tensor<B, 1> {
    let [b, t, _v] = logits.dims();
    assert_eq!(
        targets.dims(),
        [b, t],
        "targets {:?} do not match logits [B={}, T={}]",
        targets.dims(),
        b,
        t
    );

    let log_probs = activation::log_softmax(logits, 2);
    let picked = log_probs
        .gather(2, targets.clone().reshape([b, t, 1]))
        .reshape([b, t]);
    let ignored = targets.equal_elem(ignore_index as i64);

    picked.neg().mask_fill(ignored, 0.0).sum_dim(1).reshape([b])
}

/// Arg-max token at every position, replaced by `pad_id` wherever the
/// ground truth is pad so predictions line up with the reference.
///
/// This reads the ground truth, so it is only meaningful for offline
/// evaluation against known observations.
pub fn greedy_predictions<B: Backend>(
    logits: Tensor<B, 3>,
    groundtruth: Tensor<B, 2, Int>,
    pad_id: usize,
) -> Tensor<B, 2, Int> {
    let [b, t, _v] = logits.dims();
    let pred = logits.argmax(2).reshape([b, t]);
    pred.mask_fill(groundtruth.equal_elem(pad_id as i64), pad_id as i64)
}

// ─────────────────────────────────────────────────────────────────────────────
// Outputs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StepOutput<B: Backend> {
    /// [B, H]
    pub h_t: Tensor<B, 2>,
    /// [B], summed over positions
    pub batch_loss: Tensor<B, 1>,
    /// [B, O]
    pub pred_obs_word_ids: Tensor<B, 2, Int>,
}

#[derive(Debug, Clone)]
pub struct EpisodeOutput<B: Backend> {
    /// [1]: per-example mean over valid steps, then mean over the batch
    pub loss: Tensor<B, 1>,
    /// [1] per step: batch mean over episodes for which the step is valid
    pub step_losses: Vec<Tensor<B, 1>>,
    pub steps: Vec<StepOutput<B>>,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationOutput {
    pub loss: f32,
    /// (ground truth, generated)
    pub pairs: Vec<(String, String)>,
    pub f1_scores: Vec<f64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoder head
// ─────────────────────────────────────────────────────────────────────────────

/// Text decoder plus vocabulary projection. Works with any graph
/// collaborator.
#[derive(Module, Debug)]
pub struct ObsDecoderHead<B: Backend> {
    text_decoder: TextDecoder<B>,
    target_word_prj: Linear<B>,
    pad_id: usize,
}

impl<B: Backend> ObsDecoderHead<B> {
    pub fn new(config: &ModelConfig, vocab_size: usize, pad_id: usize, device: &B::Device) -> Self {
        assert!(pad_id < vocab_size, "pad_id {} out of range", pad_id);
        Self {
            text_decoder: TextDecoder::new(
                config.text_decoder_num_blocks,
                config.hidden_dim,
                config.text_decoder_num_heads,
                config.max_positions,
                device,
            ),
            target_word_prj: LinearConfig::new(config.hidden_dim, vocab_size)
                .with_bias(false)
                .init(device),
            pad_id,
        }
    }

    pub fn pad_id(&self) -> usize {
        self.pad_id
    }

    /// Vocabulary logits for one step: [B, O, V]
    pub fn logits(&self, repr: &GraphRepresentationOutput<B>, step: &StepBatch<B>) -> Tensor<B, 3> {
        let decoded = self.text_decoder.forward(
            repr.prj_obs.clone(),
            step.obs_mask.clone(),
            repr.node_hidden.clone(),
            repr.prev_action_hidden.clone(),
            step.prev_action_mask.clone(),
        );
        self.target_word_prj.forward(decoded)
    }

    pub fn step<G: GraphRepresentation<B>>(
        &self,
        graph: &G,
        step: &StepBatch<B>,
        prev_hidden: Option<Tensor<B, 2>>,
    ) -> StepOutput<B> {
        let repr = graph.represent(
            step.obs_word_ids.clone(),
            step.prev_action_word_ids.clone(),
            step.obs_mask.clone(),
            step.prev_action_mask.clone(),
            prev_hidden,
        );
        let logits = self.logits(&repr, step);
        debug!("ObsDecoderHead: logits {:?}", logits.dims());

        let batch_loss = masked_cross_entropy(
            logits.clone(),
            step.groundtruth_obs_word_ids.clone(),
            self.pad_id,
        );
        let pred_obs_word_ids =
            greedy_predictions(logits, step.groundtruth_obs_word_ids.clone(), self.pad_id);

        StepOutput {
            h_t: repr.h_t,
            batch_loss,
            pred_obs_word_ids,
        }
    }

    /// Runs every step of the batch in order, threading `h_t`.
    pub fn process_episode<G: GraphRepresentation<B>>(
        &self,
        graph: &G,
        batch: &EpisodeBatch<B>,
    ) -> EpisodeOutput<B> {
        assert!(batch.num_steps() > 0, "episode batch has no steps");
        let b = batch.batch_size();

        let mut h_t: Option<Tensor<B, 2>> = None;
        let mut steps = Vec::with_capacity(batch.num_steps());
        let mut step_losses = Vec::with_capacity(batch.num_steps());
        for (i, step) in batch.steps.iter().enumerate() {
            let out = self.step(graph, step, h_t.take());
            h_t = Some(out.h_t.clone());

            let valid = batch.step_validity(i);
            step_losses.push((out.batch_loss.clone() * valid.clone()).sum() / valid.sum());
            steps.push(out);
        }

        let losses: Tensor<B, 2> =
            Tensor::stack(steps.iter().map(|s| s.batch_loss.clone()).collect(), 1);
        let per_example = (losses * batch.step_mask.clone()).sum_dim(1)
            / batch.step_mask.clone().sum_dim(1);
        let loss = per_example.reshape([b]).mean();

        EpisodeOutput {
            loss,
            step_losses,
            steps,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Full model
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct ObsGenModel<B: Backend> {
    graph_updater: BaselineGraphUpdater<B>,
    head: ObsDecoderHead<B>,
}

impl<B: Backend> ObsGenModel<B> {
    pub fn new(
        config: &ModelConfig,
        word_embedding: Embedding<B>,
        pad_id: usize,
        device: &B::Device,
    ) -> Self {
        let [vocab_size, _] = word_embedding.weight.val().dims();
        info!("═══════════════════════════════════════");
        info!("Initializing ObsGenModel");
        info!("  vocab_size: {}", vocab_size);
        info!("  hidden_dim: {}", config.hidden_dim);
        info!("  num_nodes: {}", config.num_nodes);
        info!("  decoder blocks: {}", config.text_decoder_num_blocks);
        info!("  decoder heads: {}", config.text_decoder_num_heads);
        info!("═══════════════════════════════════════");

        Self {
            graph_updater: BaselineGraphUpdater::new(config, word_embedding, device),
            head: ObsDecoderHead::new(config, vocab_size, pad_id, device),
        }
    }

    /// Builds the word embedding from pretrained vectors when a path is
    /// given, otherwise from seeded random rows.
    pub fn from_preprocessor(
        config: &ModelConfig,
        preprocessor: &Preprocessor,
        pretrained_word_embedding_path: Option<&Path>,
        seed: u64,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;
        let word_embedding = match pretrained_word_embedding_path {
            Some(path) => {
                let embedding = load_word_vectors(path, preprocessor, seed, device)?;
                let [_, dim] = embedding.weight.val().dims();
                anyhow::ensure!(
                    dim == config.word_emb_dim,
                    "pretrained vectors have width {}, config word_emb_dim is {}",
                    dim,
                    config.word_emb_dim
                );
                embedding
            }
            None => random_word_embedding(
                preprocessor.vocab_size(),
                config.word_emb_dim,
                preprocessor.pad_id(),
                seed,
                device,
            ),
        };
        Ok(Self::new(config, word_embedding, preprocessor.pad_id(), device))
    }

    pub fn pad_id(&self) -> usize {
        self.head.pad_id()
    }

    /// Frozen word table shared by observation and action encoding.
    pub fn word_embedding(&self) -> &Embedding<B> {
        self.graph_updater.word_embedding()
    }

    pub fn forward(&self, step: &StepBatch<B>, prev_hidden: Option<Tensor<B, 2>>) -> StepOutput<B> {
        self.head.step(&self.graph_updater, step, prev_hidden)
    }

    pub fn process_batch(&self, batch: &EpisodeBatch<B>) -> EpisodeOutput<B> {
        self.head.process_episode(&self.graph_updater, batch)
    }

    /// Scalar [1] training loss for one episode batch.
    pub fn training_loss(&self, batch: &EpisodeBatch<B>) -> Tensor<B, 1> {
        self.process_batch(batch).loss
    }

    /// Loss, decoded (ground truth, generated) pairs and per-observation F1
    /// for every valid step. Pairs whose ground truth is a single word are
    /// left out of the text table but still scored.
    pub fn validation_step(
        &self,
        batch: &EpisodeBatch<B>,
        preprocessor: &Preprocessor,
    ) -> ValidationOutput {
        let output = self.process_batch(batch);
        let pad = preprocessor.pad_id() as i64;
        let eos = preprocessor.eos_id() as i64;
        let strip = |row: &[i64]| -> Vec<i64> {
            row.iter()
                .copied()
                .take_while(|&id| id != pad && id != eos)
                .collect()
        };

        let mut pairs = Vec::new();
        let mut f1_scores = Vec::new();
        for (i, (step, result)) in batch.steps.iter().zip(&output.steps).enumerate() {
            let valid: Vec<f32> = batch.step_validity(i).into_data().iter::<f32>().collect();
            let groundtruth = tensor_to_ids(step.groundtruth_obs_word_ids.clone());
            let predicted = tensor_to_ids(result.pred_obs_word_ids.clone());

            for ((gt, pred), v) in groundtruth.iter().zip(&predicted).zip(valid) {
                if v == 0.0 {
                    continue;
                }
                f1_scores.push(sequence_f1(&strip(pred), &strip(gt)));

                let texts = preprocessor.decode(&[gt.clone(), pred.clone()]);
                if texts[0].split_whitespace().count() > 1 {
                    pairs.push((texts[0].clone(), texts[1].clone()));
                }
            }
        }

        ValidationOutput {
            loss: output.loss.into_scalar().elem::<f32>(),
            pairs,
            f1_scores,
        }
    }
}
