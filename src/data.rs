//! Episode data: text records on disk and padded tensor batches.
//!
//! Each step is teacher-forced: the decoder reads `<bos> obs` and is scored
//! against `obs <eos>`.

use anyhow::{Context, Result, ensure};
use burn::tensor::{Int, Tensor, backend::Backend};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::preprocessor::Preprocessor;
use crate::utils::{ids_to_tensor, mask_to_tensor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub observation: String,
    /// Empty on the first step of an episode.
    #[serde(default)]
    pub previous_action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub steps: Vec<StepRecord>,
}

/// One episode per line. Blank lines are ignored.
pub fn load_episodes(path: impl AsRef<Path>) -> Result<Vec<EpisodeRecord>> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Failed to open episodes file: {:?}", path))?;
    let mut episodes = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {:?}", path))?;
        if line.trim().is_empty() {
            continue;
        }
        let episode: EpisodeRecord = serde_json::from_str(&line)
            .with_context(|| format!("{:?}:{}: invalid episode record", path, i + 1))?;
        ensure!(
            !episode.steps.is_empty(),
            "{:?}:{}: episode has no steps",
            path,
            i + 1
        );
        episodes.push(episode);
    }
    debug!("Loaded {} episodes from {:?}", episodes.len(), path);
    Ok(episodes)
}

/// Tensors for one step across the batch.
#[derive(Debug, Clone)]
pub struct StepBatch<B: Backend> {
    /// [B, O]
    pub obs_word_ids: Tensor<B, 2, Int>,
    /// [B, O]
    pub obs_mask: Tensor<B, 2>,
    /// [B, A]
    pub prev_action_word_ids: Tensor<B, 2, Int>,
    /// [B, A]
    pub prev_action_mask: Tensor<B, 2>,
    /// [B, O], pad where there is nothing to predict
    pub groundtruth_obs_word_ids: Tensor<B, 2, Int>,
}

#[derive(Debug, Clone)]
pub struct EpisodeBatch<B: Backend> {
    pub steps: Vec<StepBatch<B>>,
    /// [B, S], 1.0 for real steps, 0.0 for steps past an episode's end
    pub step_mask: Tensor<B, 2>,
}

impl<B: Backend> EpisodeBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.step_mask.dims()[0]
    }

    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    /// Validity of step `i` for every episode: [B]
    pub fn step_validity(&self, i: usize) -> Tensor<B, 1> {
        let b = self.batch_size();
        self.step_mask.clone().slice([0..b, i..i + 1]).reshape([b])
    }
}

/// Pads a slice of episodes into one `EpisodeBatch`.
///
/// Steps beyond an episode's length are filled with a single `<bos>` token
/// for observation and action (so masked means stay defined) and an all-pad
/// ground truth; their step mask is 0. An empty previous action is encoded
/// as `<bos>` for the same reason.
pub fn collate_episodes<B: Backend>(
    episodes: &[EpisodeRecord],
    preprocessor: &Preprocessor,
    device: &B::Device,
) -> Result<EpisodeBatch<B>> {
    ensure!(!episodes.is_empty(), "cannot collate an empty batch");
    ensure!(
        episodes.iter().all(|e| !e.steps.is_empty()),
        "every episode needs at least one step"
    );

    let num_steps = episodes.iter().map(|e| e.steps.len()).max().unwrap_or(0);
    let bos = preprocessor.bos_id() as i64;
    let eos = preprocessor.eos_id() as i64;
    let pad = preprocessor.pad_id() as i64;

    let mut steps = Vec::with_capacity(num_steps);
    for i in 0..num_steps {
        let mut obs_rows = Vec::with_capacity(episodes.len());
        let mut gt_rows = Vec::with_capacity(episodes.len());
        let mut action_rows = Vec::with_capacity(episodes.len());

        for episode in episodes {
            match episode.steps.get(i) {
                Some(step) => {
                    let obs = preprocessor.words_to_ids(&preprocessor.tokenize(&step.observation));
                    let mut input = Vec::with_capacity(obs.len() + 1);
                    input.push(bos);
                    input.extend_from_slice(&obs);
                    let mut target = obs;
                    target.push(eos);
                    obs_rows.push(input);
                    gt_rows.push(target);

                    let action =
                        preprocessor.words_to_ids(&preprocessor.tokenize(&step.previous_action));
                    action_rows.push(if action.is_empty() { vec![bos] } else { action });
                }
                None => {
                    obs_rows.push(vec![bos]);
                    gt_rows.push(vec![pad]);
                    action_rows.push(vec![bos]);
                }
            }
        }

        let (obs_ids, obs_mask) = preprocessor.pad_ids(obs_rows);
        let (gt_ids, _) = preprocessor.pad_ids(gt_rows);
        let (action_ids, action_mask) = preprocessor.pad_ids(action_rows);

        steps.push(StepBatch {
            obs_word_ids: ids_to_tensor(&obs_ids, device),
            obs_mask: mask_to_tensor(&obs_mask, device),
            prev_action_word_ids: ids_to_tensor(&action_ids, device),
            prev_action_mask: mask_to_tensor(&action_mask, device),
            groundtruth_obs_word_ids: ids_to_tensor(&gt_ids, device),
        });
    }

    let step_mask: Vec<Vec<f32>> = episodes
        .iter()
        .map(|e| {
            (0..num_steps)
                .map(|i| if i < e.steps.len() { 1.0 } else { 0.0 })
                .collect()
        })
        .collect();

    debug!(
        "Collated {} episodes into {} steps",
        episodes.len(),
        num_steps
    );
    Ok(EpisodeBatch {
        steps,
        step_mask: mask_to_tensor(&step_mask, device),
    })
}
