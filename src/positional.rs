//! Fixed sinusoidal positional encoding.

use burn::{
    module::Module,
    tensor::{Tensor, TensorData, backend::Backend},
};
use log::debug;

/// Precomputed [max_len, d_model] table, added to block inputs.
#[derive(Module, Debug)]
pub struct PositionalEncoder<B: Backend> {
    encoding: Tensor<B, 2>,
    d_model: usize,
    max_len: usize,
}

impl<B: Backend> PositionalEncoder<B> {
    pub fn new(d_model: usize, max_len: usize, device: &B::Device) -> Self {
        assert!(
            d_model % 2 == 0,
            "hidden_dim has to be even for positional encoding, got {}",
            d_model
        );
        debug!("PositionalEncoder: d_model={}, max_len={}", d_model, max_len);

        let mut table = vec![0.0f32; max_len * d_model];
        for pos in 0..max_len {
            for i in 0..d_model / 2 {
                let freq = (-((2 * i) as f64) * (10000.0f64).ln() / d_model as f64).exp();
                let angle = pos as f64 * freq;
                table[pos * d_model + 2 * i] = angle.sin() as f32;
                table[pos * d_model + 2 * i + 1] = angle.cos() as f32;
            }
        }

        Self {
            encoding: Tensor::from_data(TensorData::new(table, [max_len, d_model]), device),
            d_model,
            max_len,
        }
    }

    /// x: [B, T, D] -> x + pe[0..T] broadcast over the batch.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [b, t, d] = x.dims();
        assert_eq!(
            d, self.d_model,
            "positional encoder width {} does not match input width {}",
            self.d_model, d
        );
        assert!(
            t <= self.max_len,
            "sequence length {} exceeds max positional length {}",
            t,
            self.max_len
        );

        let pe = self
            .encoding
            .clone()
            .slice([0..t, 0..d])
            .reshape([1, t, d])
            .expand([b, t, d]);
        x + pe
    }

    pub fn table(&self) -> Tensor<B, 2> {
        self.encoding.clone()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }
}
