//! Graph collaborator contract and a small baseline implementation.
//!
//! The decoder only consumes what a graph updater produces: node states,
//! previous-action states, a projected observation and the recurrent state
//! `h_t`. `BaselineGraphUpdater` fills that contract with learned node slots
//! conditioned on a pooled recurrent summary; it keeps the pipeline
//! runnable without the full relational graph encoder.

use burn::{
    module::Module,
    nn::{Embedding, EmbeddingConfig, Linear, LinearConfig},
    tensor::{Int, Tensor, backend::Backend},
};
use log::{debug, info};

use crate::config::ModelConfig;
use crate::utils::masked_mean;

/// Everything the decoder needs from the graph side for one step.
#[derive(Debug, Clone)]
pub struct GraphRepresentationOutput<B: Backend> {
    /// [B, H], fed back on the next step
    pub h_t: Tensor<B, 2>,
    /// [B, N, H]
    pub node_hidden: Tensor<B, 3>,
    /// [B, A, H]
    pub prev_action_hidden: Tensor<B, 3>,
    /// [B, O, H], decoder input
    pub prj_obs: Tensor<B, 3>,
}

pub trait GraphRepresentation<B: Backend> {
    fn hidden_dim(&self) -> usize;

    /// `prev_hidden` is `None` at the start of an episode.
    fn represent(
        &self,
        obs_word_ids: Tensor<B, 2, Int>,
        prev_action_word_ids: Tensor<B, 2, Int>,
        obs_mask: Tensor<B, 2>,
        prev_action_mask: Tensor<B, 2>,
        prev_hidden: Option<Tensor<B, 2>>,
    ) -> GraphRepresentationOutput<B>;
}

#[derive(Module, Debug)]
pub struct BaselineGraphUpdater<B: Backend> {
    word_embedding: Embedding<B>,
    word_prj: Linear<B>,
    node_embedding: Embedding<B>,
    hidden_update: Linear<B>,
    hidden_dim: usize,
    num_nodes: usize,
}

impl<B: Backend> BaselineGraphUpdater<B> {
    /// `word_embedding` is expected to be frozen with a zero pad row (see
    /// `crate::embedding`). Its width must equal `config.word_emb_dim`.
    pub fn new(config: &ModelConfig, word_embedding: Embedding<B>, device: &B::Device) -> Self {
        let [vocab_size, word_emb_dim] = word_embedding.weight.val().dims();
        assert_eq!(
            word_emb_dim, config.word_emb_dim,
            "word embedding width {} does not match word_emb_dim {}",
            word_emb_dim, config.word_emb_dim
        );
        info!(
            "Creating BaselineGraphUpdater: vocab={}, nodes={}, hidden={}",
            vocab_size, config.num_nodes, config.hidden_dim
        );

        let h = config.hidden_dim;
        Self {
            word_embedding,
            word_prj: LinearConfig::new(word_emb_dim, h).init(device),
            node_embedding: EmbeddingConfig::new(config.num_nodes, h).init(device),
            hidden_update: LinearConfig::new(3 * h, h).init(device),
            hidden_dim: h,
            num_nodes: config.num_nodes,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn word_embedding(&self) -> &Embedding<B> {
        &self.word_embedding
    }

    fn embed(&self, word_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        self.word_prj.forward(self.word_embedding.forward(word_ids))
    }
}

impl<B: Backend> GraphRepresentation<B> for BaselineGraphUpdater<B> {
    fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    fn represent(
        &self,
        obs_word_ids: Tensor<B, 2, Int>,
        prev_action_word_ids: Tensor<B, 2, Int>,
        obs_mask: Tensor<B, 2>,
        prev_action_mask: Tensor<B, 2>,
        prev_hidden: Option<Tensor<B, 2>>,
    ) -> GraphRepresentationOutput<B> {
        let [b, o] = obs_word_ids.dims();
        let [ab, a] = prev_action_word_ids.dims();
        assert_eq!(b, ab, "observation/action batch mismatch");
        let (h, n) = (self.hidden_dim, self.num_nodes);
        let device = obs_word_ids.device();
        debug!("BaselineGraphUpdater: [B={}, O={}, A={}]", b, o, a);

        let prj_obs = self.embed(obs_word_ids);
        let prev_action_hidden = self.embed(prev_action_word_ids);

        let h_prev = match prev_hidden {
            Some(h_prev) => {
                assert_eq!(h_prev.dims(), [b, h], "prev_hidden must be [B, H]");
                h_prev
            }
            None => Tensor::zeros([b, h], &device),
        };
        let pooled = Tensor::cat(
            vec![
                masked_mean(prj_obs.clone(), obs_mask),
                masked_mean(prev_action_hidden.clone(), prev_action_mask),
                h_prev,
            ],
            1,
        );
        let h_t = self.hidden_update.forward(pooled).tanh();

        let node_ids = Tensor::<B, 1, Int>::arange(0..n as i64, &device)
            .reshape([1, n])
            .expand([b, n]);
        let node_hidden =
            self.node_embedding.forward(node_ids) + h_t.clone().reshape([b, 1, h]).expand([b, n, h]);

        GraphRepresentationOutput {
            h_t,
            node_hidden,
            prev_action_hidden,
            prj_obs,
        }
    }
}
