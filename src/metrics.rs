//! Accumulates losses, F1 scores and generated text for one evaluation pass.

use log::info;
use rand::{SeedableRng, rngs::StdRng, seq::IndexedRandom};

use crate::obsgen::ValidationOutput;

#[derive(Debug, Clone, Default)]
pub struct ObsGenMetrics {
    losses: Vec<f32>,
    f1_scores: Vec<f64>,
    pairs: Vec<(String, String)>,
}

impl ObsGenMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, output: ValidationOutput) {
        self.losses.push(output.loss);
        self.f1_scores.extend(output.f1_scores);
        self.pairs.extend(output.pairs);
    }

    pub fn num_batches(&self) -> usize {
        self.losses.len()
    }

    pub fn mean_loss(&self) -> Option<f32> {
        if self.losses.is_empty() {
            return None;
        }
        Some(self.losses.iter().sum::<f32>() / self.losses.len() as f32)
    }

    pub fn mean_f1(&self) -> Option<f64> {
        if self.f1_scores.is_empty() {
            return None;
        }
        Some(self.f1_scores.iter().sum::<f64>() / self.f1_scores.len() as f64)
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// At most `k` (ground truth, generated) pairs. When more than `k` were
    /// collected a seeded uniform sample is returned, otherwise all of them.
    pub fn sample_pairs(&self, k: usize, seed: u64) -> Vec<(String, String)> {
        if self.pairs.len() <= k {
            return self.pairs.clone();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        self.pairs.choose_multiple(&mut rng, k).cloned().collect()
    }

    /// Logs the summary and a sampled table of generated observations.
    pub fn log_table(&self, title: &str, k: usize, seed: u64) {
        info!(
            "{}: loss={:.4} f1={:.4} ({} batches, {} observations)",
            title,
            self.mean_loss().unwrap_or(f32::NAN),
            self.mean_f1().unwrap_or(f64::NAN),
            self.num_batches(),
            self.f1_scores.len()
        );
        for (groundtruth, generated) in self.sample_pairs(k, seed) {
            info!("  groundtruth: {}", groundtruth);
            info!("  generated:   {}", generated);
        }
    }
}
