use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use data_loader::{DataIndex, Rating, UserId, write_processed};
use features::{create_user_item_matrix, holdout_split};
use models::{
    DEFAULT_GRID, DEFAULT_N_NEIGHBORS, HoldoutReport, KnnConfig, KnnModel, KnnRecommender,
    ModelError, Recommendation, Recommender, SvdConfig, SvdModel, SvdScorer, evaluate_holdout,
    evaluate_svd, grid_search, ratings_within_model, train_knn, train_svd,
};
use server::{ModelKind, ServerConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

const DEFAULT_KNN_PATH: &str = "models/knn_model.bin";

/// movie-recs - MovieLens recommender (KNN and truncated SVD)
#[derive(Parser)]
#[command(name = "movie-recs")]
#[command(
    about = "Train, evaluate and serve collaborative-filtering movie recommenders",
    long_about = None
)]
struct Cli {
    /// Directory holding the processed tables
    #[arg(
        short,
        long,
        env = "MOVIE_RECS_DATA_DIR",
        default_value = server::config::DEFAULT_DATA_DIR
    )]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the raw MovieLens tables and write the processed tables
    Preprocess {
        /// Directory holding ratings.csv and movies.csv
        #[arg(long, default_value = "data/raw")]
        raw_dir: PathBuf,
    },

    /// Fit a user-based KNN model
    TrainKnn {
        #[arg(long, default_value_t = DEFAULT_N_NEIGHBORS)]
        n_neighbors: usize,

        /// Where to write the trained model
        #[arg(long, default_value = DEFAULT_KNN_PATH)]
        output: PathBuf,
    },

    /// Grid-search the SVD rank and save the best model
    TrainSvd {
        /// Candidate ranks, comma separated
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_GRID)]
        grid: Vec<usize>,

        /// Train a single rank instead of searching the grid
        #[arg(long, conflicts_with = "grid")]
        n_components: Option<usize>,

        #[arg(
            long,
            env = "MOVIE_RECS_MODEL_PATH",
            default_value = server::config::DEFAULT_MODEL_PATH
        )]
        output: PathBuf,

        /// Hold out this fraction of ratings and report RMSE on them
        #[arg(long)]
        holdout: Option<f64>,

        /// Seed for the held-out split
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Report in-sample RMSE of a saved SVD model
    ///
    /// Ratings whose user or movie is not in the model (e.g. after training
    /// with --holdout) are left out and counted.
    Evaluate {
        #[arg(
            long,
            env = "MOVIE_RECS_MODEL_PATH",
            default_value = server::config::DEFAULT_MODEL_PATH
        )]
        model_path: PathBuf,
    },

    /// Print top-N recommendations for a user
    Recommend {
        #[arg(long)]
        user_id: UserId,

        #[arg(short, long, default_value_t = 10)]
        n: usize,

        /// Model kind: svd or knn
        #[arg(long, default_value = "svd")]
        model: ModelKind,

        /// Artifact path (defaults per model kind)
        #[arg(long)]
        model_path: Option<PathBuf>,
    },

    /// Run the HTTP API
    Serve {
        #[arg(long, env = "MOVIE_RECS_BIND", default_value = server::config::DEFAULT_BIND)]
        bind: SocketAddr,

        #[arg(long, default_value = "svd")]
        model: ModelKind,

        #[arg(long, env = "MOVIE_RECS_MODEL_PATH")]
        model_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Preprocess { raw_dir } => handle_preprocess(&raw_dir, &cli.data_dir)?,
        Commands::TrainKnn {
            n_neighbors,
            output,
        } => handle_train_knn(
            &cli.data_dir,
            KnnConfig::default().with_n_neighbors(n_neighbors),
            &output,
        )?,
        Commands::TrainSvd {
            grid,
            n_components,
            output,
            holdout,
            seed,
        } => {
            let split = HoldoutOptions {
                fraction: holdout,
                seed,
            };
            let run = match n_components {
                Some(k) => handle_train_single_svd(
                    &cli.data_dir,
                    SvdConfig::default().with_n_components(k),
                    &output,
                    split,
                )?,
                None => handle_train_svd(&cli.data_dir, &grid, &output, split)?,
            };
            info!(
                train_ratings = run.train_ratings,
                held_out_ratings = run.held_out_ratings,
                holdout_rmse = run.holdout.map(|r| r.rmse),
                "Training finished"
            );
        }
        Commands::Evaluate { model_path } => {
            handle_evaluate(&cli.data_dir, &model_path)?;
        }
        Commands::Recommend {
            user_id,
            n,
            model,
            model_path,
        } => {
            let model_path = model_path.unwrap_or_else(|| default_model_path(model));
            handle_recommend(&cli.data_dir, user_id, n, model, &model_path)?
        }
        Commands::Serve {
            bind,
            model,
            model_path,
        } => {
            let config = ServerConfig::default()
                .with_bind(bind)
                .with_data_dir(cli.data_dir)
                .with_model_kind(model)
                .with_model_path(model_path.unwrap_or_else(|| default_model_path(model)));
            server::serve(config).await?
        }
    }

    Ok(())
}

fn default_model_path(kind: ModelKind) -> PathBuf {
    match kind {
        ModelKind::Svd => PathBuf::from(server::config::DEFAULT_MODEL_PATH),
        ModelKind::Knn => PathBuf::from(DEFAULT_KNN_PATH),
    }
}

fn load_processed(data_dir: &Path) -> Result<DataIndex> {
    println!("Loading processed tables from {}...", data_dir.display());
    let start = Instant::now();
    let index = DataIndex::load_processed(data_dir)
        .with_context(|| format!("Failed to load processed data from {}", data_dir.display()))?;
    let (users, movies, ratings) = index.counts();
    println!(
        "{} Loaded {} ratings from {} users on {} movies in {:?}",
        "✓".green(),
        ratings,
        users,
        movies,
        start.elapsed()
    );
    Ok(index)
}

/// Handle the 'preprocess' command
fn handle_preprocess(raw_dir: &Path, out_dir: &Path) -> Result<()> {
    let start = Instant::now();
    let index = DataIndex::load_from_files(raw_dir)
        .with_context(|| format!("Failed to load raw tables from {}", raw_dir.display()))?;
    let summary = write_processed(&index, out_dir).context("Failed to write processed tables")?;

    println!("{} Preprocessed in {:?}", "✓".green(), start.elapsed());
    println!("  ratings: {}", summary.ratings_written);
    println!("  movies:  {}", summary.movies_written);
    println!("  users:   {}", summary.users_written);
    for file in &summary.files {
        println!("  wrote {}", file.display());
    }
    Ok(())
}

/// Handle the 'train-knn' command
fn handle_train_knn(data_dir: &Path, config: KnnConfig, output: &Path) -> Result<()> {
    let index = load_processed(data_dir)?;
    let matrix = create_user_item_matrix(index.ratings());
    info!(
        n_users = matrix.n_users(),
        n_items = matrix.n_items(),
        sparsity = matrix.sparsity(),
        "Built user-item matrix"
    );

    let model = train_knn(&matrix, config.n_neighbors).context("KNN training failed")?;
    model.save(output).context("Failed to save KNN model")?;

    println!(
        "{} KNN model ({} neighbors) saved to {}",
        "✓".green(),
        config.n_neighbors,
        output.display()
    );
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct HoldoutOptions {
    fraction: Option<f64>,
    seed: u64,
}

/// What a training command fitted on and how it scored on held-out ratings
#[derive(Debug)]
struct TrainingRun {
    train_ratings: usize,
    held_out_ratings: usize,
    holdout: Option<HoldoutReport>,
}

/// Split off held-out ratings when requested
fn training_ratings(
    index: &DataIndex,
    options: HoldoutOptions,
) -> Result<(Vec<Rating>, Vec<Rating>)> {
    let Some(fraction) = options.fraction else {
        return Ok((index.ratings().to_vec(), Vec::new()));
    };
    let split = holdout_split(index.ratings(), fraction, options.seed)
        .context("Invalid held-out fraction")?;
    println!(
        "Holding out {} of {} ratings (seed {})",
        split.held_out.len(),
        index.ratings().len(),
        options.seed
    );
    Ok((split.train, split.held_out))
}

fn report_holdout(model: &SvdModel, held_out: &[Rating]) -> Result<Option<HoldoutReport>> {
    if held_out.is_empty() {
        return Ok(None);
    }
    match evaluate_holdout(model, held_out) {
        Ok(report) => {
            println!(
                "Held-out RMSE {:.4} on {} ratings ({} skipped: unknown user or movie)",
                report.rmse, report.evaluated, report.skipped
            );
            Ok(Some(report))
        }
        Err(ModelError::NoObservedRatings) => {
            println!(
                "{} No held-out rating has both its user and movie in the model",
                "!".yellow()
            );
            Ok(None)
        }
        Err(e) => Err(anyhow::Error::new(e).context("Held-out evaluation failed")),
    }
}

/// Handle the 'train-svd' command
fn handle_train_svd(
    data_dir: &Path,
    grid: &[usize],
    output: &Path,
    options: HoldoutOptions,
) -> Result<TrainingRun> {
    let index = load_processed(data_dir)?;
    let (train_ratings, held_out) = training_ratings(&index, options)?;

    let matrix = create_user_item_matrix(&train_ratings);
    info!(
        n_users = matrix.n_users(),
        n_items = matrix.n_items(),
        sparsity = matrix.sparsity(),
        "Built user-item matrix"
    );

    let start = Instant::now();
    let outcome = grid_search(&matrix, grid).context("SVD grid search failed")?;
    println!("{}", "Grid search:".bold().blue());
    for trial in &outcome.trials {
        let marker = if trial.n_components == outcome.best.n_components() {
            "*".green()
        } else {
            " ".normal()
        };
        println!("{} k={:<4} RMSE {:.4}", marker, trial.n_components, trial.rmse);
    }
    println!(
        "{} Best n_components={} (RMSE {:.4}) in {:?}",
        "✓".green(),
        outcome.best.n_components(),
        outcome.best_rmse,
        start.elapsed()
    );

    let holdout = report_holdout(&outcome.best, &held_out)?;
    outcome.best.save(output).context("Failed to save SVD model")?;
    println!("{} SVD model saved to {}", "✓".green(), output.display());

    Ok(TrainingRun {
        train_ratings: train_ratings.len(),
        held_out_ratings: held_out.len(),
        holdout,
    })
}

/// Handle 'train-svd --n-components'
fn handle_train_single_svd(
    data_dir: &Path,
    config: SvdConfig,
    output: &Path,
    options: HoldoutOptions,
) -> Result<TrainingRun> {
    let index = load_processed(data_dir)?;
    let (train_ratings, held_out) = training_ratings(&index, options)?;
    let matrix = create_user_item_matrix(&train_ratings);

    let model = train_svd(&matrix, config.n_components).context("SVD training failed")?;
    let rmse = evaluate_svd(&model, &matrix).context("Evaluation failed")?;
    println!(
        "{} n_components={} RMSE {:.4}",
        "✓".green(),
        config.n_components,
        rmse
    );

    let holdout = report_holdout(&model, &held_out)?;
    model.save(output).context("Failed to save SVD model")?;
    println!("{} SVD model saved to {}", "✓".green(), output.display());

    Ok(TrainingRun {
        train_ratings: train_ratings.len(),
        held_out_ratings: held_out.len(),
        holdout,
    })
}

/// Handle the 'evaluate' command
fn handle_evaluate(data_dir: &Path, model_path: &Path) -> Result<f64> {
    let model = SvdModel::load(model_path)
        .with_context(|| format!("Failed to load SVD model from {}", model_path.display()))?;
    let index = load_processed(data_dir)?;

    let (ratings, dropped) = ratings_within_model(&model, index.ratings());
    if dropped > 0 {
        println!(
            "{} Left out {} ratings whose user or movie is not in the model",
            "!".yellow(),
            dropped
        );
    }
    let matrix = create_user_item_matrix(&ratings);

    let rmse = evaluate_svd(&model, &matrix).context("Evaluation failed")?;
    println!(
        "{} n_components={} RMSE {:.4} on {} ratings",
        "✓".green(),
        model.n_components(),
        rmse,
        ratings.len()
    );
    Ok(rmse)
}

/// Handle the 'recommend' command
fn handle_recommend(
    data_dir: &Path,
    user_id: UserId,
    n: usize,
    kind: ModelKind,
    model_path: &Path,
) -> Result<()> {
    if n == 0 {
        bail!("-n must be at least 1");
    }
    let index = Arc::new(load_processed(data_dir)?);

    let recommender: Box<dyn Recommender> = match kind {
        ModelKind::Svd => {
            let model = SvdModel::load(model_path).context("Failed to load SVD model")?;
            Box::new(SvdScorer::new(Arc::new(model), index.clone()))
        }
        ModelKind::Knn => {
            let model = KnnModel::load(model_path).context("Failed to load KNN model")?;
            Box::new(KnnRecommender::new(Arc::new(model), index.clone()))
        }
    };

    let recommendations = recommender
        .recommend(user_id, n)
        .with_context(|| format!("No recommendations for user {user_id}"))?;
    print_recommendations(&index, user_id, recommender.name(), &recommendations);
    Ok(())
}

fn print_recommendations(
    index: &DataIndex,
    user_id: UserId,
    model: &str,
    recommendations: &[Recommendation],
) {
    println!(
        "{}",
        format!("Recommendations for user {user_id} ({model}):").bold().blue()
    );
    if recommendations.is_empty() {
        println!("  (user has rated every movie in the model)");
    }
    for (rank, rec) in recommendations.iter().enumerate() {
        let (title, genres) = index
            .get_movie(rec.movie_id)
            .map(|m| {
                let genres = m.genres.iter().map(|g| g.label()).collect::<Vec<_>>().join("|");
                (m.title.as_str(), genres)
            })
            .unwrap_or(("Unknown", String::new()));
        println!(
            "{}. {} [{}] - Score: {:.3}",
            (rank + 1).to_string().green(),
            title,
            genres,
            rec.score
        );
    }
}
