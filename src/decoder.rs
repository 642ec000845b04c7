//! Graph-conditioned causal text decoder.
//!
//! Each block runs causal self-attention over the observation being
//! generated, then two independent cross-attentions (graph nodes and the
//! previous action) whose outputs are fused, masked and added back.

use burn::{
    module::Module,
    nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig},
    tensor::{Tensor, activation, backend::Backend},
};
use log::{debug, info};

use crate::attention::MultiHeadAttention;
use crate::positional::PositionalEncoder;
use crate::utils::generate_square_subsequent_mask;

// ─────────────────────────────────────────────────────────────────────────────
// Feed-forward
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct FeedForward<B: Backend> {
    fc_in: Linear<B>,
    fc_out: Linear<B>,
}

impl<B: Backend> FeedForward<B> {
    pub fn new(hidden_dim: usize, device: &B::Device) -> Self {
        Self {
            fc_in: LinearConfig::new(hidden_dim, hidden_dim).init(device),
            fc_out: LinearConfig::new(hidden_dim, hidden_dim).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = activation::relu(self.fc_in.forward(x));
        self.fc_out.forward(x)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Block
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct TextDecoderBlock<B: Backend> {
    layer_idx: usize,
    hidden_dim: usize,
    pos_encoder: PositionalEncoder<B>,
    self_attn: MultiHeadAttention<B>,
    self_attn_layer_norm: LayerNorm<B>,
    node_attn: MultiHeadAttention<B>,
    prev_action_attn: MultiHeadAttention<B>,
    combine_node_prev_action: Linear<B>,
    linear_layer_norm: LayerNorm<B>,
    linear_layers: FeedForward<B>,
}

impl<B: Backend> TextDecoderBlock<B> {
    pub fn new(
        hidden_dim: usize,
        num_heads: usize,
        max_positions: usize,
        layer_idx: usize,
        device: &B::Device,
    ) -> Self {
        assert!(
            hidden_dim % 2 == 0,
            "hidden_dim has to be even for positional encoding"
        );
        debug!(
            "TextDecoderBlock {}: hidden_dim={}, num_heads={}",
            layer_idx, hidden_dim, num_heads
        );

        Self {
            layer_idx,
            hidden_dim,
            pos_encoder: PositionalEncoder::new(hidden_dim, max_positions, device),
            self_attn: MultiHeadAttention::new(hidden_dim, num_heads, device),
            self_attn_layer_norm: LayerNormConfig::new(hidden_dim).init(device),
            node_attn: MultiHeadAttention::new(hidden_dim, num_heads, device),
            prev_action_attn: MultiHeadAttention::new(hidden_dim, num_heads, device),
            combine_node_prev_action: LinearConfig::new(2 * hidden_dim, hidden_dim).init(device),
            linear_layer_norm: LayerNormConfig::new(hidden_dim).init(device),
            linear_layers: FeedForward::new(hidden_dim, device),
        }
    }

    /// input: [B, T, H], input_mask: [B, T]
    /// node_hidden: [B, N, H]
    /// prev_action_hidden: [B, A, H], prev_action_mask: [B, A]
    ///
    /// Returns [B, T, H]. Padded positions carry residual values and must be
    /// masked by the consumer.
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
        input_mask: Tensor<B, 2>,
        node_hidden: Tensor<B, 3>,
        prev_action_hidden: Tensor<B, 3>,
        prev_action_mask: Tensor<B, 2>,
    ) -> Tensor<B, 3> {
        let [b, t, h] = input.dims();
        assert_eq!(
            h, self.hidden_dim,
            "block {} expects width {}, got {}",
            self.layer_idx, self.hidden_dim, h
        );
        assert_eq!(input_mask.dims(), [b, t], "input_mask must be [B, T]");
        let [nb, _n, nh] = node_hidden.dims();
        assert!(nb == b && nh == h, "node_hidden must be [B, N, H]");
        let [ab, a, ah] = prev_action_hidden.dims();
        assert!(ab == b && ah == h, "prev_action_hidden must be [B, A, H]");
        assert_eq!(
            prev_action_mask.dims(),
            [b, a],
            "prev_action_mask must be [B, A]"
        );
        debug!("Block {} forward: [B={}, T={}, H={}]", self.layer_idx, b, t, h);

        let device = input.device();
        let keep = input_mask.clone().reshape([b, t, 1]).expand([b, t, h]);

        // causal self attention, residual on the raw input
        let pos_encoded = self.pos_encoder.forward(input.clone());
        let attn_mask = generate_square_subsequent_mask::<B>(t, &device);
        let input_padding = input_mask.equal_elem(0.0);
        let input_attn = self.self_attn.forward(
            pos_encoded.clone(),
            pos_encoded.clone(),
            pos_encoded,
            Some(input_padding),
            Some(attn_mask),
        );
        let input_attn = input_attn * keep.clone() + input;

        // cross attention against nodes and the previous action, computed
        // separately; query-side padding is handled when they are combined
        let query = self.self_attn_layer_norm.forward(input_attn.clone());
        let node_attn =
            self.node_attn
                .forward(query.clone(), node_hidden.clone(), node_hidden, None, None);
        let prev_action_padding = prev_action_mask.equal_elem(0.0);
        let prev_action_attn = self.prev_action_attn.forward(
            query,
            prev_action_hidden.clone(),
            prev_action_hidden,
            Some(prev_action_padding),
            None,
        );

        let combined = Tensor::cat(vec![prev_action_attn, node_attn], 2);
        let combined = activation::relu(self.combine_node_prev_action.forward(combined));
        let combined = combined * keep + input_attn;

        let output = self
            .linear_layers
            .forward(self.linear_layer_norm.forward(combined.clone()));
        output + combined
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stack
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct TextDecoder<B: Backend> {
    blocks: Vec<TextDecoderBlock<B>>,
}

impl<B: Backend> TextDecoder<B> {
    pub fn new(
        num_blocks: usize,
        hidden_dim: usize,
        num_heads: usize,
        max_positions: usize,
        device: &B::Device,
    ) -> Self {
        info!(
            "Creating TextDecoder: {} blocks, hidden_dim={}, num_heads={}",
            num_blocks, hidden_dim, num_heads
        );
        let blocks = (0..num_blocks)
            .map(|i| TextDecoderBlock::new(hidden_dim, num_heads, max_positions, i, device))
            .collect();
        Self { blocks }
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Same shapes as [`TextDecoderBlock::forward`]; every block sees the
    /// same node/action context and masks.
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
        input_mask: Tensor<B, 2>,
        node_hidden: Tensor<B, 3>,
        prev_action_hidden: Tensor<B, 3>,
        prev_action_mask: Tensor<B, 2>,
    ) -> Tensor<B, 3> {
        let mut output = input;
        for (i, block) in self.blocks.iter().enumerate() {
            output = block.forward(
                output,
                input_mask.clone(),
                node_hidden.clone(),
                prev_action_hidden.clone(),
                prev_action_mask.clone(),
            );
            debug!("After decoder block {}: shape {:?}", i, output.dims());
        }
        output
    }
}
