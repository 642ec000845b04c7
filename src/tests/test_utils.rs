use crate::backend::AutoBackend;
use crate::tests::common::assert_close;
use crate::utils::*;
use burn::tensor::{Tensor, TensorData, activation};
use rstest::rstest;

type B = AutoBackend;

#[test]
fn test_masked_mean() {
    let device = Default::default();
    let input = Tensor::<B, 3>::from_data(
        TensorData::new(
            vec![
                1.0f32, 2.0, 300.0, 300.0, 100.0, 200.0, 3.0, 4.0, 100.0, //
                300.0, 100.0, 200.0, 6.0, 2.0, 300.0, 10.0, 4.0, 100.0,
            ],
            [2, 3, 3],
        ),
        &device,
    );
    let mask = Tensor::<B, 2>::from_data(
        TensorData::new(vec![1.0f32, 0.0, 1.0, 0.0, 1.0, 1.0], [2, 3]),
        &device,
    );

    let out = masked_mean(input, mask);
    assert_eq!(out.dims(), [2, 3]);
    let values = out.to_data().to_vec::<f32>().unwrap();
    assert_close(&values, &[2.0, 3.0, 200.0, 8.0, 3.0, 200.0], 1e-5);
}

#[test]
fn test_masked_softmax_matches_softmax_over_kept_entries() {
    let device = Default::default();
    let input = Tensor::<B, 2>::from_data(
        TensorData::new(vec![1.0f32, 2.0, 3.0, 1.0, 1.0, 2.0, 3.0, 2.0, 1.0], [3, 3]),
        &device,
    );
    let mask = Tensor::<B, 2>::from_data(
        TensorData::new(vec![1.0f32, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0], [3, 3]),
        &device,
    );

    let out = masked_softmax(input, mask, 1)
        .to_data()
        .to_vec::<f32>()
        .unwrap();

    let kept = |values: &[f32]| -> Vec<f32> {
        let t = Tensor::<B, 1>::from_floats(values, &device);
        activation::softmax(t, 0).to_data().to_vec::<f32>().unwrap()
    };
    let row0 = kept(&[1.0, 2.0]);
    let row1 = kept(&[1.0, 2.0]);
    let row2 = kept(&[3.0, 2.0, 1.0]);

    assert_close(&out[0..3], &[row0[0], row0[1], 0.0], 1e-6);
    assert_close(&out[3..6], &[0.0, row1[0], row1[1]], 1e-6);
    assert_close(&out[6..9], &row2, 1e-6);
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(5)]
#[case(7)]
fn test_generate_square_subsequent_mask(#[case] size: usize) {
    let device = Default::default();
    let mask = generate_square_subsequent_mask::<B>(size, &device);
    assert_eq!(mask.dims(), [size, size]);

    let values = mask.to_data().to_vec::<bool>().unwrap();
    for i in 0..size {
        for j in 0..size {
            assert_eq!(values[i * size + j], j > i, "entry ({}, {})", i, j);
        }
    }
}

#[rstest]
#[case(vec![1, 2, 3, 4, 5], vec![1, 2, 3, 4, 5], 1.0)]
#[case(vec![1, 2, 3, 4, 5], vec![5, 4, 3, 2, 1], 1.0)]
#[case(vec![1, 2, 3], vec![1, 2], 0.8)]
#[case(vec![1, 2, 3], vec![5, 4], 0.0)]
fn test_sequence_f1(#[case] preds: Vec<i64>, #[case] groundtruth: Vec<i64>, #[case] expected: f64) {
    let f1 = sequence_f1(&preds, &groundtruth);
    assert!((f1 - expected).abs() < 1e-9, "got {}, expected {}", f1, expected);
}

#[test]
fn test_sequence_f1_repeated_tokens_counted_once_per_match() {
    // one shared "1": precision 1/3, recall 1/1
    let f1 = sequence_f1(&[1, 1, 1], &[1]);
    assert!((f1 - 0.5).abs() < 1e-9);
    assert_eq!(sequence_f1::<i64>(&[], &[1, 2]), 0.0);
}

#[rstest]
#[case(vec![1, 2, 3, 4, 5, 6], 3, vec![vec![1, 2, 3], vec![4, 5, 6]])]
#[case(vec![1, 2, 3, 4, 5, 6, 7, 8], 3, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8]])]
fn test_batchify(#[case] seq: Vec<i32>, #[case] size: usize, #[case] batches: Vec<Vec<i32>>) {
    let got: Vec<Vec<i32>> = batchify(&seq, size).map(<[i32]>::to_vec).collect();
    assert_eq!(got, batches);

    // restartable
    let chunks = batchify(&seq, size);
    assert_eq!(chunks.clone().count(), chunks.count());
}

#[test]
#[should_panic(expected = "batchify size must be > 0")]
fn test_batchify_zero_size_panics() {
    let _ = batchify(&[1, 2, 3], 0);
}

#[test]
fn test_ids_roundtrip_through_tensor() {
    let device = Default::default();
    let rows = vec![vec![4i64, 5, 0], vec![6, 0, 0]];
    let tensor = ids_to_tensor::<B>(&rows, &device);
    assert_eq!(tensor.dims(), [2, 3]);
    assert_eq!(tensor_to_ids(tensor), rows);
}
