use crate::metrics::ObsGenMetrics;
use crate::obsgen::ValidationOutput;

fn pairs(n: usize) -> Vec<(String, String)> {
    (0..n)
        .map(|i| (format!("groundtruth {}", i), format!("generated {}", i)))
        .collect()
}

#[test]
fn test_means_over_recorded_batches() {
    let mut metrics = ObsGenMetrics::new();
    assert_eq!(metrics.mean_loss(), None);
    assert_eq!(metrics.mean_f1(), None);

    metrics.record(ValidationOutput {
        loss: 2.0,
        pairs: pairs(2),
        f1_scores: vec![1.0, 0.0],
    });
    metrics.record(ValidationOutput {
        loss: 4.0,
        pairs: Vec::new(),
        f1_scores: vec![0.5],
    });

    assert_eq!(metrics.num_batches(), 2);
    assert_eq!(metrics.mean_loss(), Some(3.0));
    assert_eq!(metrics.mean_f1(), Some(0.5));
    assert_eq!(metrics.pairs().len(), 2);
}

#[test]
fn test_sample_pairs_returns_all_when_few() {
    let mut metrics = ObsGenMetrics::new();
    metrics.record(ValidationOutput {
        loss: 1.0,
        pairs: pairs(3),
        f1_scores: Vec::new(),
    });
    assert_eq!(metrics.sample_pairs(5, 42), pairs(3));
}

#[test]
fn test_sample_pairs_is_seeded_and_bounded() {
    let mut metrics = ObsGenMetrics::new();
    metrics.record(ValidationOutput {
        loss: 1.0,
        pairs: pairs(20),
        f1_scores: Vec::new(),
    });

    let a = metrics.sample_pairs(5, 42);
    let b = metrics.sample_pairs(5, 42);
    assert_eq!(a.len(), 5);
    assert_eq!(a, b);
    assert!(a.iter().all(|p| metrics.pairs().contains(p)));

    let mut unique = a.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 5, "no pair is drawn twice");
}
