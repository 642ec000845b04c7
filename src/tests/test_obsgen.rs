use crate::backend::{AutoBackend, AutoTrainBackend};
use crate::data::collate_episodes;
use crate::graph::{GraphRepresentation, GraphRepresentationOutput};
use crate::obsgen::{ObsDecoderHead, ObsGenModel, greedy_predictions, masked_cross_entropy};
use crate::tests::common::{small_config, small_episodes, small_preprocessor};
use crate::utils::tensor_to_ids;
use burn::tensor::{Distribution, ElementConversion, Int, Tensor, TensorData, backend::Backend};
use std::cell::RefCell;

type B = AutoBackend;

fn scalar(t: Tensor<B, 1>) -> f32 {
    t.into_scalar().elem::<f32>()
}

fn build_model(seed: u64) -> ObsGenModel<B> {
    let device = Default::default();
    ObsGenModel::<B>::from_preprocessor(&small_config(), &small_preprocessor(), None, seed, &device)
        .unwrap()
}

/// Constant graph side that records which steps received a previous state.
struct RecordingGraph {
    hidden_dim: usize,
    seen_prev: RefCell<Vec<bool>>,
}

impl GraphRepresentation<B> for RecordingGraph {
    fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    fn represent(
        &self,
        obs_word_ids: Tensor<B, 2, Int>,
        prev_action_word_ids: Tensor<B, 2, Int>,
        _obs_mask: Tensor<B, 2>,
        _prev_action_mask: Tensor<B, 2>,
        prev_hidden: Option<Tensor<B, 2>>,
    ) -> GraphRepresentationOutput<B> {
        let device = obs_word_ids.device();
        let [b, o] = obs_word_ids.dims();
        let [_, a] = prev_action_word_ids.dims();
        let h = self.hidden_dim;
        self.seen_prev.borrow_mut().push(prev_hidden.is_some());
        let h_t = prev_hidden.map_or_else(|| Tensor::zeros([b, h], &device), |p| p + 1.0);
        GraphRepresentationOutput {
            h_t,
            node_hidden: Tensor::ones([b, 3, h], &device),
            prev_action_hidden: Tensor::ones([b, a, h], &device),
            prj_obs: obs_word_ids.float().reshape([b, o, 1]).expand([b, o, h]) * 0.1,
        }
    }
}

#[test]
fn test_masked_cross_entropy_ignores_pad_targets() {
    let device = Default::default();
    let logits = Tensor::<B, 3>::zeros([2, 3, 4], &device);
    let targets = Tensor::<B, 2, Int>::from_data(TensorData::new(vec![1i64, 0, 0, 2, 3, 1], [2, 3]), &device);

    let loss = masked_cross_entropy(logits, targets, 0)
        .to_data()
        .to_vec::<f32>()
        .unwrap();
    let ln4 = 4f32.ln();
    assert!((loss[0] - ln4).abs() < 1e-5, "got {}", loss[0]);
    assert!((loss[1] - 3.0 * ln4).abs() < 1e-5, "got {}", loss[1]);
}

#[test]
fn test_masked_cross_entropy_has_no_gradient_at_pad_targets() {
    type TB = AutoTrainBackend;
    let device = Default::default();
    let logits =
        Tensor::<TB, 3>::random([1, 3, 4], Distribution::Normal(0.0, 1.0), &device).require_grad();
    let targets =
        Tensor::<TB, 2, Int>::from_data(TensorData::new(vec![1i64, 0, 0], [1, 3]), &device);

    let grads = masked_cross_entropy(logits.clone(), targets, 0).sum().backward();
    let grad = logits
        .grad(&grads)
        .unwrap()
        .to_data()
        .to_vec::<f32>()
        .unwrap();

    // rows 1 and 2 target pad
    assert!(grad[4..].iter().all(|&g| g == 0.0), "{:?}", grad);
    assert!(grad[..4].iter().any(|&g| g != 0.0));
}

#[test]
fn test_greedy_predictions_follow_groundtruth_padding() {
    let device = Default::default();
    let logits = Tensor::<B, 3>::from_data(
        TensorData::new(vec![0.0f32, 5.0, 1.0, 0.0, 0.0, 9.0], [1, 2, 3]),
        &device,
    );
    let gt = Tensor::<B, 2, Int>::from_data(TensorData::new(vec![2i64, 0], [1, 2]), &device);
    let pred = tensor_to_ids(greedy_predictions(logits, gt, 0));
    assert_eq!(pred, vec![vec![1, 0]]);
}

#[test]
fn test_single_step_from_empty_state() {
    crate::init();
    let device = <B as Backend>::Device::default();
    let model = build_model(3);
    let p = small_preprocessor();
    let batch = collate_episodes::<B>(&small_episodes(), &p, &device).unwrap();

    let out = model.forward(&batch.steps[0], None);
    let [b, o] = batch.steps[0].obs_word_ids.dims();
    assert_eq!(out.h_t.dims(), [b, small_config().hidden_dim]);
    assert_eq!(out.batch_loss.dims(), [b]);
    assert_eq!(out.pred_obs_word_ids.dims(), [b, o]);
    let losses = out.batch_loss.to_data().to_vec::<f32>().unwrap();
    assert!(losses.iter().all(|l| l.is_finite() && *l > 0.0));
}

#[test]
fn test_episode_threads_hidden_state() {
    let device = <B as Backend>::Device::default();
    let config = small_config();
    let p = small_preprocessor();
    let head = ObsDecoderHead::<B>::new(&config, p.vocab_size(), p.pad_id(), &device);
    let graph = RecordingGraph {
        hidden_dim: config.hidden_dim,
        seen_prev: RefCell::new(Vec::new()),
    };
    let batch = collate_episodes::<B>(&small_episodes(), &p, &device).unwrap();

    let out = head.process_episode(&graph, &batch);
    assert_eq!(*graph.seen_prev.borrow(), vec![false, true, true]);
    assert_eq!(out.steps.len(), 3);
    assert_eq!(out.step_losses.len(), 3);

    // the stub adds 1 per step, starting from zeros
    let last_h = out.steps[2].h_t.clone().to_data().to_vec::<f32>().unwrap();
    assert!(last_h.iter().all(|&v| (v - 2.0).abs() < 1e-6));
}

#[test]
fn test_episode_loss_is_mean_over_valid_steps() {
    let device = <B as Backend>::Device::default();
    let model = build_model(5);
    let p = small_preprocessor();
    let episodes = small_episodes();
    let batch = collate_episodes::<B>(&episodes, &p, &device).unwrap();
    let out = model.process_batch(&batch);

    let per_step: Vec<Vec<f32>> = out
        .steps
        .iter()
        .map(|s| s.batch_loss.clone().to_data().to_vec::<f32>().unwrap())
        .collect();
    let long = (per_step[0][0] + per_step[1][0] + per_step[2][0]) / 3.0;
    let short = per_step[0][1];
    let expected = (long + short) / 2.0;
    let loss = scalar(out.loss);
    assert!((loss - expected).abs() < 1e-4, "{} vs {}", loss, expected);

    // padding-only steps are left out of the per-step mean
    let step2 = scalar(out.step_losses[2].clone());
    assert!((step2 - per_step[2][0]).abs() < 1e-4);
}

#[test]
fn test_batching_does_not_change_per_episode_loss() {
    let device = <B as Backend>::Device::default();
    let model = build_model(11);
    let p = small_preprocessor();
    let episodes = small_episodes();

    let alone: Vec<f32> = episodes
        .iter()
        .map(|e| {
            let batch = collate_episodes::<B>(std::slice::from_ref(e), &p, &device).unwrap();
            scalar(model.training_loss(&batch))
        })
        .collect();
    let together = scalar(
        model.training_loss(&collate_episodes::<B>(&episodes, &p, &device).unwrap()),
    );

    let expected = (alone[0] + alone[1]) / 2.0;
    assert!(
        (together - expected).abs() < 1e-3,
        "batched {} vs separate {}",
        together,
        expected
    );
}

#[test]
fn test_validation_step_scores_every_valid_step() {
    let device = <B as Backend>::Device::default();
    let model = build_model(2);
    let p = small_preprocessor();
    let batch = collate_episodes::<B>(&small_episodes(), &p, &device).unwrap();

    let out = model.validation_step(&batch, &p);
    assert!(out.loss.is_finite());
    assert_eq!(out.f1_scores.len(), 4);
    assert!(out.f1_scores.iter().all(|f| (0.0..=1.0).contains(f)));
    assert_eq!(out.pairs.len(), 4);
    assert!(out.pairs.iter().any(|(gt, _)| gt == "you are in the garden"));
}
