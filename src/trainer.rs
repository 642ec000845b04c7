//! Training loop for the observation generator.
//!
//! Batches are processed one after another; early stopping and
//! checkpointing only happen between epochs, never inside an episode.

use anyhow::Result;
use burn::{
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{ElementConversion, backend::AutodiffBackend, backend::Backend},
};
use log::{debug, info, warn};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::checkpoint::save_checkpoint;
use crate::config::{ModelConfig, TrainingConfig};
use crate::data::{EpisodeRecord, collate_episodes};
use crate::metrics::ObsGenMetrics;
use crate::obsgen::ObsGenModel;
use crate::preprocessor::Preprocessor;
use crate::target::FrozenTwin;
use crate::utils::batchify;

#[derive(Debug, Clone, Default)]
pub struct TrainSummary {
    pub epochs_run: usize,
    /// Mean training loss per epoch.
    pub train_losses: Vec<f32>,
    /// Mean validation loss per epoch (empty without validation data).
    pub val_losses: Vec<f32>,
    pub best_val_loss: Option<f32>,
    pub stopped_early: bool,
}

pub struct Trainer<'a, B: AutodiffBackend> {
    model_config: &'a ModelConfig,
    config: &'a TrainingConfig,
    preprocessor: &'a Preprocessor,
    device: B::Device,
}

impl<'a, B: AutodiffBackend> Trainer<'a, B> {
    pub fn new(
        model_config: &'a ModelConfig,
        config: &'a TrainingConfig,
        preprocessor: &'a Preprocessor,
        device: B::Device,
    ) -> Self {
        Self {
            model_config,
            config,
            preprocessor,
            device,
        }
    }

    /// Trains for up to `max_epochs`, evaluating a frozen copy of the model
    /// on `val` after each epoch. Returns the final model.
    pub fn fit(
        &self,
        mut model: ObsGenModel<B>,
        train: &[EpisodeRecord],
        val: &[EpisodeRecord],
    ) -> Result<(ObsGenModel<B>, TrainSummary)> {
        self.config.validate()?;
        anyhow::ensure!(!train.is_empty(), "no training episodes");
        info!(
            "Training on {} episodes ({} validation), batch_size={}, lr={}",
            train.len(),
            val.len(),
            self.config.batch_size,
            self.config.learning_rate
        );

        let mut optim = AdamConfig::new()
            .with_grad_clipping(self.config.grad_clip_norm.map(GradientClippingConfig::Norm))
            .init::<B, ObsGenModel<B>>();
        let mut twin =
            FrozenTwin::<B, ObsGenModel<B>>::new(&model, self.config.eval_sync_interval);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut order: Vec<usize> = (0..train.len()).collect();

        let mut summary = TrainSummary::default();
        let mut epochs_without_improvement = 0usize;

        for epoch in 0..self.config.max_epochs {
            order.shuffle(&mut rng);
            let shuffled: Vec<EpisodeRecord> = order.iter().map(|&i| train[i].clone()).collect();

            let (updated, train_loss) = self.train_epoch(model, &mut optim, &mut twin, &shuffled)?;
            model = updated;
            summary.train_losses.push(train_loss);
            summary.epochs_run = epoch + 1;
            info!("Epoch {}: train_loss={:.4}", epoch, train_loss);

            if val.is_empty() {
                continue;
            }

            // the frozen copy is what gets scored and checkpointed
            let metrics = evaluate(
                twin.view(),
                val,
                self.preprocessor,
                self.config.batch_size,
                &self.device,
            )?;
            metrics.log_table(
                &format!("Generated Observations Val Epoch {}", epoch),
                self.config.sample_k_gen_obs,
                self.config.seed,
            );
            let val_loss = metrics.mean_loss().unwrap_or(f32::INFINITY);
            summary.val_losses.push(val_loss);

            let improved = summary.best_val_loss.is_none_or(|best| val_loss < best);
            if improved {
                summary.best_val_loss = Some(val_loss);
                epochs_without_improvement = 0;
                if let Some(dir) = &self.config.checkpoint_dir {
                    save_checkpoint(twin.view(), self.model_config, self.preprocessor, dir)?;
                }
            } else {
                epochs_without_improvement += 1;
                if let Some(patience) = self.config.patience {
                    if epochs_without_improvement >= patience {
                        info!(
                            "Early stopping after epoch {} (no improvement for {} epochs)",
                            epoch, epochs_without_improvement
                        );
                        summary.stopped_early = true;
                        break;
                    }
                }
            }
        }

        Ok((model, summary))
    }

    /// One pass over `episodes`; returns the updated model and the mean loss.
    pub fn train_epoch<O: Optimizer<ObsGenModel<B>, B>>(
        &self,
        mut model: ObsGenModel<B>,
        optim: &mut O,
        twin: &mut FrozenTwin<B, ObsGenModel<B>>,
        episodes: &[EpisodeRecord],
    ) -> Result<(ObsGenModel<B>, f32)> {
        let mut total = 0.0f32;
        let mut batches = 0usize;

        for (i, chunk) in batchify(episodes, self.config.batch_size).enumerate() {
            let batch = collate_episodes::<B>(chunk, self.preprocessor, &self.device)?;
            let output = model.process_batch(&batch);
            let step_losses: Vec<f32> = output
                .step_losses
                .iter()
                .map(|l| l.clone().into_scalar().elem::<f32>())
                .collect();
            debug!("Batch {}: step losses {:?}", i, step_losses);
            let loss = output.loss;
            let loss_value = loss.clone().into_scalar().elem::<f32>();
            if !loss_value.is_finite() {
                warn!("Batch {}: non-finite loss {}", i, loss_value);
            }

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(self.config.learning_rate, model, grads);
            if twin.on_update(&model) {
                debug!("Batch {}: evaluation copy refreshed", i);
            }

            debug!("Batch {}: loss={:.4}", i, loss_value);
            total += loss_value;
            batches += 1;
        }

        Ok((model, total / batches.max(1) as f32))
    }
}

/// Runs the model over `episodes` without gradients and collects metrics.
pub fn evaluate<B: Backend>(
    model: &ObsGenModel<B>,
    episodes: &[EpisodeRecord],
    preprocessor: &Preprocessor,
    batch_size: usize,
    device: &B::Device,
) -> Result<ObsGenMetrics> {
    let mut metrics = ObsGenMetrics::new();
    for chunk in batchify(episodes, batch_size) {
        let batch = collate_episodes::<B>(chunk, preprocessor, device)?;
        metrics.record(model.validation_step(&batch, preprocessor));
    }
    Ok(metrics)
}

/// Evaluates the non-autodiff view of a trainable model.
pub fn evaluate_trained<B: AutodiffBackend>(
    model: &ObsGenModel<B>,
    episodes: &[EpisodeRecord],
    preprocessor: &Preprocessor,
    batch_size: usize,
    device: &B::Device,
) -> Result<ObsGenMetrics> {
    evaluate(&model.valid(), episodes, preprocessor, batch_size, device)
}
