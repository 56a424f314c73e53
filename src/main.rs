use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::info;

use absa::config::Config;
use absa::model::onnx::OnnxAspectScorer;
use absa::pipeline::models::{PredictResponse, Review, ReviewResult};
use absa::pipeline::InferenceContext;

/// ABSA: topics and sentiments in bank customer reviews.
///
/// Detects which of 11 banking topics a review talks about and whether the
/// reviewer is negative, neutral or positive about each.
#[derive(Parser)]
#[command(name = "absa", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the prediction API over HTTP
    #[cfg(feature = "web")]
    Serve {
        /// Port to listen on (default: 8000)
        #[arg(long, default_value = "8000")]
        port: u16,

        /// Address to bind (default: 0.0.0.0)
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,
    },

    /// Analyze reviews from the command line or a JSON file
    Predict {
        /// Review texts (ids are assigned 1, 2, 3, ...)
        texts: Vec<String>,

        /// JSON file with reviews: [{"id", "text"}] or {"data": [...]}
        #[arg(long)]
        file: Option<PathBuf>,

        /// Detection threshold in [0, 1] (default: ABSA_THRESHOLD or 0.3)
        #[arg(long)]
        threshold: Option<f64>,

        /// Print the API's JSON response instead of a colored summary
        #[arg(long)]
        json: bool,
    },

    /// Load the model artifacts and verify they are compatible
    Check,
}

/// Accepted layouts for `predict --file`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ReviewsFile {
    List(Vec<Review>),
    Request { data: Vec<Review> },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("absa=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        #[cfg(feature = "web")]
        Commands::Serve { port, bind } => {
            let config = Config::load()?;
            let inference = load_inference(&config)?;
            let state = absa::web::AppState::new(inference, config);
            absa::web::run_server(state, port, &bind).await?;
        }

        Commands::Predict {
            texts,
            file,
            threshold,
            json,
        } => {
            let config = Config::load()?;

            let reviews = match file {
                Some(path) => read_reviews(&path)?,
                None => texts
                    .into_iter()
                    .enumerate()
                    .map(|(i, text)| Review {
                        id: i as i64 + 1,
                        text,
                    })
                    .collect(),
            };

            if reviews.is_empty() {
                anyhow::bail!("Nothing to analyze. Pass review texts or --file reviews.json");
            }

            // Validate before paying for model load.
            let threshold = absa::pipeline::decision::Threshold::new(
                threshold.unwrap_or(config.default_threshold),
            )?;

            let inference = load_inference(&config)?;
            let results = predict_with_progress(&inference, &reviews, threshold, !json).await?;

            if json {
                let response = PredictResponse { results };
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                absa::output::terminal::display_results(&results);
            }
        }

        Commands::Check => {
            let config = Config::load()?;
            println!("Model directory: {}", config.model_dir.display());
            println!("  Max sequence length: {}", config.max_sequence_length);
            println!("  Token type ids: {}", config.token_type_ids);
            println!("  Default threshold: {}", config.default_threshold);
            println!("  Max batch size: {}", config.max_batch_size);

            config.require_model()?;
            let scorer = OnnxAspectScorer::load(&config.model_dir, config.encoder_options())?;

            println!(
                "\n{} hidden size {}, {} topics x {} sentiments",
                "Model OK:".green().bold(),
                scorer.hidden_size(),
                absa::labels::NUM_TOPICS,
                absa::labels::NUM_SENTIMENTS,
            );
        }
    }

    Ok(())
}

/// Load the model once and wrap it in the shared inference context.
/// Fails if any artifact is missing or the encoder and head disagree.
fn load_inference(config: &Config) -> Result<InferenceContext> {
    config.require_model()?;
    info!(model_dir = %config.model_dir.display(), "Loading model");
    let scorer = OnnxAspectScorer::load(&config.model_dir, config.encoder_options())?;
    Ok(InferenceContext::new(
        Arc::new(scorer),
        config.pipeline_settings(),
    ))
}

fn read_reviews(path: &Path) -> Result<Vec<Review>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file: ReviewsFile = serde_json::from_str(&json)
        .with_context(|| format!("{} is not a list of reviews", path.display()))?;
    Ok(match file {
        ReviewsFile::List(reviews) => reviews,
        ReviewsFile::Request { data } => data,
    })
}

/// Run the pipeline in request-sized chunks, showing progress for large files.
async fn predict_with_progress(
    inference: &InferenceContext,
    reviews: &[Review],
    threshold: absa::pipeline::decision::Threshold,
    show_progress: bool,
) -> Result<Vec<ReviewResult>> {
    let chunk_size = inference.settings().max_batch_size;

    let pb = if show_progress && reviews.len() > chunk_size {
        let pb = ProgressBar::new(reviews.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("    [{bar:40.cyan/blue}] {pos}/{len} reviews ({eta})")
                .expect("valid template")
                .progress_chars("=> "),
        );
        Some(pb)
    } else {
        None
    };

    let mut results = Vec::with_capacity(reviews.len());
    for chunk in reviews.chunks(chunk_size) {
        results.extend(inference.predict(chunk, threshold).await?);
        if let Some(ref pb) = pb {
            pb.inc(chunk.len() as u64);
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    Ok(results)
}
