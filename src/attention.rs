//! Multi-head attention with explicit disallow masks.
//!
//! Key stability measures:
//! - Blocked scores are filled with a large negative value, not -inf
//! - Per-row max subtraction before the softmax
//!
//! With a finite fill a query row whose keys are all blocked gets uniform
//! weights instead of NaN. Callers still must not rely on such rows: the
//! decoder only lets the previous-action attention carry a key padding mask,
//! and every previous-action row keeps at least one valid token.

use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{Bool, Tensor, activation, backend::Backend},
};
use log::{debug, trace};

const MASK_FILL: f32 = -1.0e9;

#[derive(Module, Debug)]
pub struct MultiHeadAttention<B: Backend> {
    n_head: usize,
    head_dim: usize,
    q_proj: Linear<B>,
    k_proj: Linear<B>,
    v_proj: Linear<B>,
    out_proj: Linear<B>,
}

impl<B: Backend> MultiHeadAttention<B> {
    pub fn new(d_model: usize, n_head: usize, device: &B::Device) -> Self {
        assert!(n_head > 0, "n_head must be > 0");
        assert_eq!(
            d_model % n_head,
            0,
            "hidden_dim ({}) must be divisible by num_heads ({})",
            d_model,
            n_head
        );
        let head_dim = d_model / n_head;
        debug!(
            "MultiHeadAttention: d_model={}, n_head={}, head_dim={}",
            d_model, n_head, head_dim
        );

        Self {
            n_head,
            head_dim,
            q_proj: LinearConfig::new(d_model, d_model).init(device),
            k_proj: LinearConfig::new(d_model, d_model).init(device),
            v_proj: LinearConfig::new(d_model, d_model).init(device),
            out_proj: LinearConfig::new(d_model, d_model).init(device),
        }
    }

    /// query: [B, Tq, C], key/value: [B, Tk, C]
    /// key_padding_mask: [B, Tk], `true` = key is padding
    /// attn_mask: [Tq, Tk], `true` = query may not see key
    ///
    /// Returns [B, Tq, C].
    pub fn forward(
        &self,
        query: Tensor<B, 3>,
        key: Tensor<B, 3>,
        value: Tensor<B, 3>,
        key_padding_mask: Option<Tensor<B, 2, Bool>>,
        attn_mask: Option<Tensor<B, 2, Bool>>,
    ) -> Tensor<B, 3> {
        let [b, t_q, c] = query.dims();
        let [b_k, t_k, c_k] = key.dims();
        assert_eq!(b, b_k, "query/key batch mismatch: {} vs {}", b, b_k);
        assert_eq!(c, c_k, "query/key width mismatch: {} vs {}", c, c_k);
        assert_eq!(
            value.dims(),
            [b, t_k, c],
            "value shape must match key shape"
        );
        assert_eq!(
            c,
            self.n_head * self.head_dim,
            "input width {} does not match attention width {}",
            c,
            self.n_head * self.head_dim
        );

        let (h, d) = (self.n_head, self.head_dim);

        // [B, H, T, D]
        let q = self
            .q_proj
            .forward(query)
            .reshape([b, t_q, h, d])
            .swap_dims(1, 2);
        let k = self
            .k_proj
            .forward(key)
            .reshape([b, t_k, h, d])
            .swap_dims(1, 2);
        let v = self
            .v_proj
            .forward(value)
            .reshape([b, t_k, h, d])
            .swap_dims(1, 2);

        let scale = (d as f32).sqrt();
        let mut att = q.matmul(k.swap_dims(2, 3)).div_scalar(scale); // [B, H, Tq, Tk]
        trace!("Attn: raw scores {:?}", att.dims());

        if let Some(mask) = attn_mask {
            assert_eq!(
                mask.dims(),
                [t_q, t_k],
                "attn_mask must be [Tq={}, Tk={}]",
                t_q,
                t_k
            );
            let mask4 = mask.reshape([1, 1, t_q, t_k]).expand([b, h, t_q, t_k]);
            att = att.mask_fill(mask4, MASK_FILL);
        }

        if let Some(mask) = key_padding_mask {
            assert_eq!(
                mask.dims(),
                [b, t_k],
                "key_padding_mask must be [B={}, Tk={}]",
                b,
                t_k
            );
            let mask4 = mask.reshape([b, 1, 1, t_k]).expand([b, h, t_q, t_k]);
            att = att.mask_fill(mask4, MASK_FILL);
        }

        let att_max = att.clone().max_dim(3).expand([b, h, t_q, t_k]);
        let att = activation::softmax(att - att_max, 3);
        trace!("Attn: softmax done on axis=3");

        let y = att.matmul(v).swap_dims(1, 2).reshape([b, t_q, c]);
        self.out_proj.forward(y)
    }
}
