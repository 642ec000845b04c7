//! Shared fixtures: a tiny vocabulary, episodes and model config.

use crate::config::ModelConfig;
use crate::data::{EpisodeRecord, StepRecord};
use crate::preprocessor::Preprocessor;

pub fn small_config() -> ModelConfig {
    ModelConfig {
        hidden_dim: 8,
        word_emb_dim: 6,
        num_nodes: 4,
        max_positions: 32,
        text_decoder_num_blocks: 1,
        text_decoder_num_heads: 2,
    }
}

pub fn small_preprocessor() -> Preprocessor {
    Preprocessor::new(&[
        "you", "are", "in", "the", "kitchen", "garden", "open", "fridge", "go", "east", "take",
        "apple", "a", "there", "is", ".",
    ])
}

pub fn episode(steps: &[(&str, &str)]) -> EpisodeRecord {
    EpisodeRecord {
        steps: steps
            .iter()
            .map(|(action, obs)| StepRecord {
                observation: obs.to_string(),
                previous_action: action.to_string(),
            })
            .collect(),
    }
}

/// Two episodes of different lengths (3 and 1 steps).
pub fn small_episodes() -> Vec<EpisodeRecord> {
    vec![
        episode(&[
            ("", "you are in the kitchen"),
            ("open fridge", "there is a apple"),
            ("take apple", "you take the apple"),
        ]),
        episode(&[("", "you are in the garden")]),
    ]
}

pub fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() < tol,
            "index {}: got {}, expected {} (tol {})",
            i,
            a,
            e,
            tol
        );
    }
}
