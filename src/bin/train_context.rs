//! Train the context embedding on synthetic demonstration clips
//!
//! Usage:
//! ```bash
//! cargo run --release --bin train_context
//! cargo run --release --bin train_context -- --iterations 2000 --output models/context
//! ```

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array4;
use rand::prelude::*;
use std::path::PathBuf;
use task_context_embedding::prelude::*;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train the task/variation context embedding")]
struct Args {
    /// Number of task variations in the synthetic pool
    #[arg(long, default_value = "8")]
    variations: usize,

    /// Demonstration clips generated per variation
    #[arg(long, default_value = "24")]
    clips_per_variation: usize,

    /// Variations per training batch (B)
    #[arg(long, default_value = "4")]
    batch_variations: usize,

    /// Clips per variation per batch (K)
    #[arg(long, default_value = "5")]
    samples_per_variation: usize,

    /// Time steps per clip
    #[arg(long, default_value = "4")]
    timesteps: usize,

    /// Spatial resolution of the synthetic frames
    #[arg(long, default_value = "8")]
    resolution: usize,

    /// Output embedding dimension
    #[arg(long, default_value = "32")]
    embedding_size: usize,

    /// Number of training iterations
    #[arg(long, default_value = "500")]
    iterations: usize,

    /// Fraction of K reserved as queries
    #[arg(long, default_value = "0.3")]
    query_ratio: f64,

    /// Hinge margin
    #[arg(long, default_value = "0.1")]
    margin: f64,

    /// Learning rate
    #[arg(long, default_value = "0.001")]
    learning_rate: f64,

    /// Weight decay
    #[arg(long, default_value = "0.0001")]
    weight_decay: f64,

    /// Validate every N iterations
    #[arg(long, default_value = "50")]
    val_interval: usize,

    /// RNG seed for the synthetic data
    #[arg(long, default_value = "7")]
    seed: u64,

    /// Directory for the trained extractor weights
    #[arg(long, default_value = "models/context")]
    output: PathBuf,
}

const CHANNELS: usize = 3;

/// Synthetic demo clips: each variation renders a distinct brightness
/// pattern with per-clip noise, in raw 8-bit range.
fn fill_sampler(sampler: &mut VariationSampler, args: &Args, seed: u64) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    for variation in 0..args.variations {
        let base = 255.0 * (variation as f64 + 0.5) / args.variations as f64;
        let clips: Vec<Array4<f64>> = (0..args.clips_per_variation)
            .map(|_| {
                let raw = Array4::from_shape_fn(
                    (args.timesteps, CHANNELS, args.resolution, args.resolution),
                    |(t, c, _, _)| {
                        let drift = (t * CHANNELS + c) as f64;
                        (base + drift + rng.gen::<f64>() * 30.0 - 15.0).clamp(0.0, 255.0)
                    },
                );
                preprocess::normalize_rgb(&raw)
            })
            .collect();
        sampler.add_variation_clips(variation, clips)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    info!(
        variations = args.variations,
        iterations = args.iterations,
        "starting context embedding training"
    );

    let mut train_sampler = VariationSampler::with_seed(args.seed);
    let mut val_sampler = VariationSampler::with_seed(args.seed + 1);
    fill_sampler(&mut train_sampler, &args, args.seed)?;
    fill_sampler(&mut val_sampler, &args, args.seed + 1)?;

    let extractor = MlpExtractor::new(ExtractorConfig {
        input_dim: args.timesteps * CHANNELS * args.resolution * args.resolution,
        hidden_dims: vec![64, 64],
        output_dim: args.embedding_size,
        normalize_embeddings: false,
        activation: ActivationType::ReLU,
    });

    let loss = HingeMetricLoss::new(MetricLossConfig {
        query_ratio: args.query_ratio,
        margin: args.margin,
        loss_weight: 1.0,
        mode: LossMode::Hinge,
    })?;

    let trainer_config = TrainerConfig {
        iterations: args.iterations,
        learning_rate: args.learning_rate,
        weight_decay: args.weight_decay,
        batch_variations: args.batch_variations,
        samples_per_variation: args.samples_per_variation,
        log_interval: args.val_interval,
        val_interval: args.val_interval,
        val_batches: 10,
    };
    let mut trainer = ContextTrainer::new(
        trainer_config,
        extractor,
        loss.clone(),
        SequenceStacker::channel(),
    )?
    .with_scheduler(LearningRateScheduler::cosine_annealing(
        args.learning_rate,
        args.iterations,
        args.learning_rate * 0.01,
    ));

    let pb = ProgressBar::new(args.iterations as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let mut last_val_accuracy = 0.0;
    for iteration in 0..args.iterations {
        let batch = train_sampler.sample(args.batch_variations, args.samples_per_variation)?;
        let output = trainer.update(&batch)?;
        pb.inc(1);

        if (iteration + 1) % args.val_interval == 0 {
            let val_batch =
                val_sampler.sample(args.batch_variations, args.samples_per_variation)?;
            let val = trainer.validate(&val_batch)?;
            last_val_accuracy = val.accuracy;
            pb.println(format!(
                "Iteration {}: loss={:.4}, acc={:.1}%, single_acc={:.1}%, val_loss={:.4}, val_acc={:.1}%",
                iteration + 1,
                output.loss,
                output.accuracy * 100.0,
                output.single_accuracy * 100.0,
                val.loss,
                val.accuracy * 100.0,
            ));
        }
    }
    pb.finish_with_message("Training complete");

    info!(val_accuracy = last_val_accuracy, "final validation accuracy");

    // Demonstrate the serving paths on a fresh batch before saving
    let batch = train_sampler.sample(args.batch_variations, args.samples_per_variation)?;
    let embeddings = trainer.embed_clips(&batch)?;
    let broadcaster = ReplayContextBroadcaster::new(ReplayEmbeddingPolicy::MeanEmbedding);
    let (context, replay_loss) = broadcaster.broadcast_with_loss(&embeddings, 6, &loss)?;
    info!(
        context_shape = ?context.dim(),
        replay_loss = replay_loss.loss,
        "replay context ready"
    );

    trainer.save_weights(&args.output)?;
    info!(path = ?args.output, "extractor weights saved");

    Ok(())
}
