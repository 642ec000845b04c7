//! Masked tensor helpers shared by the decoder, the graph collaborator and
//! the metrics code.

use burn::tensor::{Bool, Int, Tensor, TensorData, activation, backend::Backend};
use std::collections::HashMap;
use std::hash::Hash;

/// Mean over the sequence axis, restricted to positions where `mask == 1`.
///
/// input: [B, S, D], mask: [B, S] -> [B, D]
///
/// Every row of `mask` must contain at least one 1. An all-zero row divides
/// by zero and yields NaN for that batch element; callers keep one valid
/// token per averaged group instead of this function patching it.
pub fn masked_mean<B: Backend>(input: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
    let [b, s, d] = input.dims();
    assert_eq!(
        mask.dims(),
        [b, s],
        "mask shape {:?} does not match input [B={}, S={}]",
        mask.dims(),
        b,
        s
    );

    let mask3 = mask.clone().reshape([b, s, 1]).expand([b, s, d]);
    let summed = (input * mask3).sum_dim(1).reshape([b, d]);
    let count = mask.sum_dim(1).expand([b, d]);

    summed / count
}

/// Softmax along `dim` where masked-out entries (`mask == 0`) get exactly 0.
///
/// Scores are replaced with -inf before normalising, so the unmasked entries
/// match a plain softmax over just those entries. `input`, `mask` and the
/// output share one shape.
pub fn masked_softmax<B: Backend, const D: usize>(
    input: Tensor<B, D>,
    mask: Tensor<B, D>,
    dim: usize,
) -> Tensor<B, D> {
    assert_eq!(
        input.dims(),
        mask.dims(),
        "masked_softmax: input and mask must have the same shape"
    );
    let blocked = mask.equal_elem(0.0);
    activation::softmax(input.mask_fill(blocked, f64::NEG_INFINITY), dim)
}

/// Square attention-disallow mask: entry (i, j) is `true` (blocked) iff j > i.
///
/// For size 3:
/// ```text
/// [[false,  true,  true],
///  [false, false,  true],
///  [false, false, false]]
/// ```
pub fn generate_square_subsequent_mask<B: Backend>(
    size: usize,
    device: &B::Device,
) -> Tensor<B, 2, Bool> {
    let data: Vec<bool> = (0..size)
        .flat_map(|i| (0..size).map(move |j| j > i))
        .collect();
    Tensor::<B, 2, Bool>::from_data(TensorData::new(data, [size, size]), device)
}

/// Bag-of-tokens F1 between a predicted and a ground-truth id sequence.
///
/// Order does not matter: overlap is the multiset intersection. Identical
/// sequences score 1.0, sequences without overlap (including empty ones)
/// score 0.0.
pub fn sequence_f1<T: Eq + Hash>(predicted: &[T], ground_truth: &[T]) -> f64 {
    if predicted == ground_truth {
        return 1.0;
    }

    let mut counts: HashMap<&T, usize> = HashMap::new();
    for token in ground_truth {
        *counts.entry(token).or_insert(0) += 1;
    }
    let mut num_same = 0usize;
    for token in predicted {
        if let Some(c) = counts.get_mut(token) {
            if *c > 0 {
                *c -= 1;
                num_same += 1;
            }
        }
    }
    if num_same == 0 {
        return 0.0;
    }

    let precision = num_same as f64 / predicted.len() as f64;
    let recall = num_same as f64 / ground_truth.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// Contiguous chunks of at most `size` items, in order.
///
/// The returned iterator is lazy and `Clone`, so it can be restarted; the
/// last chunk may be shorter.
pub fn batchify<T>(seq: &[T], size: usize) -> std::slice::Chunks<'_, T> {
    assert!(size > 0, "batchify size must be > 0");
    seq.chunks(size)
}

// ─────────────────────────────────────────────────────────────────────────────
// Host <-> tensor conversion for padded id/mask rows
// ─────────────────────────────────────────────────────────────────────────────

/// Rows must already be padded to a common length.
pub fn ids_to_tensor<B: Backend>(rows: &[Vec<i64>], device: &B::Device) -> Tensor<B, 2, Int> {
    let b = rows.len();
    let t = rows.first().map_or(0, Vec::len);
    assert!(
        rows.iter().all(|r| r.len() == t),
        "id rows must share one length"
    );
    let flat: Vec<i64> = rows.iter().flatten().copied().collect();
    Tensor::<B, 2, Int>::from_data(TensorData::new(flat, [b, t]), device)
}

pub fn mask_to_tensor<B: Backend>(rows: &[Vec<f32>], device: &B::Device) -> Tensor<B, 2> {
    let b = rows.len();
    let t = rows.first().map_or(0, Vec::len);
    assert!(
        rows.iter().all(|r| r.len() == t),
        "mask rows must share one length"
    );
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Tensor::<B, 2>::from_data(TensorData::new(flat, [b, t]), device)
}

pub fn tensor_to_ids<B: Backend>(ids: Tensor<B, 2, Int>) -> Vec<Vec<i64>> {
    let [_b, t] = ids.dims();
    let flat: Vec<i64> = ids.into_data().iter::<i64>().collect();
    if t == 0 {
        return Vec::new();
    }
    flat.chunks(t).map(<[i64]>::to_vec).collect()
}
