//! ObsGen - graph-conditioned observation generation in Rust using Burn
//!
//! This library trains a text decoder that, at every step of an episode,
//! regenerates the current observation from a graph representation of the
//! world and the previous action, carrying a recurrent state across steps.
// Copyright [2025] tuned.org.uk, Mec-iS
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod attention;
pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod decoder;
pub mod embedding;
pub mod graph;
pub mod metrics;
pub mod obsgen;
pub mod positional;
pub mod preprocessor;
pub mod target;
pub mod trainer;
pub mod utils;

#[cfg(test)]
mod tests;

pub use backend::{AutoBackend, AutoTrainBackend, get_device, print_backend_info};
pub use checkpoint::{load_checkpoint, save_checkpoint};
pub use config::{DataConfig, ModelConfig, ObsGenConfig, TrainingConfig};
pub use obsgen::ObsGenModel;
pub use preprocessor::Preprocessor;
pub use trainer::{TrainSummary, Trainer};

use std::sync::Once;

static INIT: Once = Once::new();

pub fn init() {
    INIT.call_once(|| {
        // Read RUST_LOG env variable, default to "debug" if not set
        let env = env_logger::Env::default().default_filter_or("debug");

        // don't panic if called multiple times across binaries
        let _ = env_logger::Builder::from_env(env)
            .is_test(true) // nicer formatting for tests
            .try_init();
    });
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        backend::{AutoBackend, AutoTrainBackend, get_device},
        config::{ModelConfig, ObsGenConfig, TrainingConfig},
        data::{EpisodeBatch, EpisodeRecord, StepBatch, StepRecord, collate_episodes},
        graph::{BaselineGraphUpdater, GraphRepresentation, GraphRepresentationOutput},
        obsgen::ObsGenModel,
        preprocessor::Preprocessor,
        trainer::Trainer,
    };
}
