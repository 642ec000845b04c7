use anyhow::{Context, Result};

use obsgen::{
    backend::{AutoBackend, AutoTrainBackend, get_device, print_backend_info},
    checkpoint::load_checkpoint,
    config::ObsGenConfig,
    data::{EpisodeRecord, StepRecord, load_episodes},
    obsgen::ObsGenModel,
    preprocessor::Preprocessor,
    trainer::{Trainer, evaluate, evaluate_trained},
};

/// A handful of tiny episodes so the binary runs without any data files.
fn toy_episodes() -> Vec<EpisodeRecord> {
    let episode = |steps: &[(&str, &str)]| EpisodeRecord {
        steps: steps
            .iter()
            .map(|(action, obs)| StepRecord {
                observation: obs.to_string(),
                previous_action: action.to_string(),
            })
            .collect(),
    };
    vec![
        episode(&[
            ("", "you are in the kitchen . there is a fridge"),
            ("open fridge", "you open the fridge . it holds an apple"),
            ("take apple", "you take the apple"),
        ]),
        episode(&[
            ("", "you are in the garden . there is a shed"),
            ("go east", "you are in the shed"),
        ]),
        episode(&[
            ("", "you are in the bedroom . there is a bed"),
            ("examine bed", "the bed is soft"),
            ("go west", "you are in the kitchen . there is a fridge"),
            ("open fridge", "you open the fridge . it is empty"),
        ]),
        episode(&[("", "you are in the shed . there is a shovel")]),
    ]
}

fn collect_words(words: &mut Vec<String>, episodes: &[EpisodeRecord]) {
    for step in episodes.iter().flat_map(|e| &e.steps) {
        for word in step
            .observation
            .split_whitespace()
            .chain(step.previous_action.split_whitespace())
        {
            let word = word.to_lowercase();
            if !words.contains(&word) {
                words.push(word);
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    print_backend_info();
    let device = get_device();

    let config = match std::env::args().nth(1) {
        Some(path) => ObsGenConfig::load(&path)?,
        None => {
            let mut config = ObsGenConfig::default();
            config.training.max_epochs = 5;
            config.training.batch_size = 2;
            config.validate()?;
            config
        }
    };
    let data = &config.data;

    let train = match &data.train_path {
        Some(path) => load_episodes(path)?,
        None => toy_episodes(),
    };
    let val = match &data.val_path {
        Some(path) => load_episodes(path)?,
        None => toy_episodes(),
    };
    let test = match &data.test_path {
        Some(path) => load_episodes(path)?,
        None => Vec::new(),
    };

    let preprocessor = match &data.word_vocab_path {
        Some(path) => Preprocessor::from_vocab_file(path)?,
        None => {
            let mut words = Vec::new();
            collect_words(&mut words, &train);
            collect_words(&mut words, &val);
            Preprocessor::new(&words)
        }
    };
    println!("\n📚 Vocabulary: {} words", preprocessor.vocab_size());
    println!(
        "   Episodes: {} train / {} val / {} test",
        train.len(),
        val.len(),
        test.len()
    );

    let model = ObsGenModel::<AutoTrainBackend>::from_preprocessor(
        &config.model,
        &preprocessor,
        data.pretrained_word_embedding_path.as_deref(),
        config.training.seed,
        &device,
    )?;

    println!("\n1️⃣ Training...");
    let trainer = Trainer::<AutoTrainBackend>::new(
        &config.model,
        &config.training,
        &preprocessor,
        device.clone(),
    );
    let (model, summary) = trainer.fit(model, &train, &val)?;
    println!(
        "   ✓ {} epochs, final train loss {:.4}{}",
        summary.epochs_run,
        summary.train_losses.last().copied().unwrap_or(f32::NAN),
        if summary.stopped_early {
            " (stopped early)"
        } else {
            ""
        }
    );
    if let Some(best) = summary.best_val_loss {
        println!("   ✓ Best validation loss {:.4}", best);
    }

    if config.training.run_test && !test.is_empty() {
        println!("\n2️⃣ Test pass...");
        let metrics = match &config.training.checkpoint_dir {
            Some(dir) if dir.join("model.mpk").exists() => {
                let (best, _, best_preprocessor) = load_checkpoint::<AutoBackend>(dir, &device)
                    .with_context(|| format!("Failed to reload best checkpoint {:?}", dir))?;
                evaluate(
                    &best,
                    &test,
                    &best_preprocessor,
                    config.training.batch_size,
                    &device,
                )?
            }
            _ => evaluate_trained(
                &model,
                &test,
                &preprocessor,
                config.training.batch_size,
                &device,
            )?,
        };
        metrics.log_table(
            "Generated Observations Test",
            config.training.sample_k_gen_obs,
            config.training.seed,
        );
        println!(
            "   ✓ Test loss {:.4}, F1 {:.4}",
            metrics.mean_loss().unwrap_or(f32::NAN),
            metrics.mean_f1().unwrap_or(f64::NAN)
        );
    }

    println!("\n3️⃣ Sample generations (validation)...");
    let metrics = evaluate_trained(
        &model,
        &val,
        &preprocessor,
        config.training.batch_size,
        &device,
    )?;
    for (groundtruth, generated) in
        metrics.sample_pairs(config.training.sample_k_gen_obs, config.training.seed)
    {
        println!("   groundtruth: {}", groundtruth);
        println!("   generated:   {}", generated);
    }

    println!("\n✅ Done\n");
    Ok(())
}
