use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use autoswipe::pipeline::{
    DirectorySession, PipelineEvent, ReviewOutcome, SwipeController, SwipeReport,
};
use autoswipe::regressor::{Dataset, TrainOptions, TrainProgress};
use autoswipe::scoring::{ImageEmbedding, OnnxImageEmbedder};
use autoswipe::{
    AssetManager, PipelineError, ProfilePaths, ProfileStore, ReviewSession, RuntimeConfig,
    ScorerAsset, ScorerContext, SeedLabeler, Settings, Trainer, TrainingPreset,
};
use clap::{Parser, Subcommand};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (flat JSON object)
    #[arg(short, long, default_value = "settings.json")]
    settings: PathBuf,

    /// Overrides BASE_DIR from the settings file
    #[arg(long)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create, list, inspect or delete user profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Download or check the scorer model files
    Assets {
        #[command(subcommand)]
        action: AssetAction,
    },
    /// Label the next seed image, or show it when no outcome is given
    Label {
        profile: String,
        #[arg(allow_negative_numbers = true)]
        outcome: Option<f32>,
    },
    /// Fine-tune the interest model (Ctrl-C cancels after the current batch)
    Train {
        profile: Option<String>,
        /// accurate, moderate or basic
        #[arg(long, default_value_t = TrainingPreset::Moderate)]
        preset: TrainingPreset,
        /// Custom epoch count; overrides --preset
        #[arg(long)]
        epochs: Option<usize>,
    },
    /// Decide on pre-scraped profiles from an inbox folder
    Swipe {
        profile: Option<String>,
        #[arg(long)]
        inbox: PathBuf,
    },
    /// Review past decisions, oldest first
    Review {
        profile: String,
        #[command(subcommand)]
        action: ReviewAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    Create { name: String },
    List,
    Delete { name: String },
    Info { name: String },
}

#[derive(Subcommand)]
enum AssetAction {
    Fetch {
        /// Remove existing files before downloading
        #[arg(short, long)]
        fresh: bool,
    },
    Verify,
}

#[derive(Subcommand)]
enum ReviewAction {
    List,
    Confirm {
        #[arg(allow_negative_numbers = true)]
        score: f32,
    },
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load(&args.settings)
        .with_context(|| format!("loading settings from {:?}", args.settings))?;
    if let Some(base_dir) = &args.base_dir {
        settings.base_dir = base_dir.clone();
    }
    info!("Using data directory {:?}", settings.base_dir);
    Ok(settings)
}

/// Named profile, or the one `MODELPATH` points at.
fn resolve_profile(
    store: &ProfileStore,
    settings: &Settings,
    name: Option<&str>,
) -> Result<ProfilePaths> {
    if let Some(name) = name {
        return Ok(store.open(name)?);
    }
    let model_path = settings
        .model_path
        .as_deref()
        .ok_or_else(|| anyhow!("no profile given and MODELPATH is not set"))?;
    ProfilePaths::from_model_path(&settings.resolve(model_path))
        .ok_or_else(|| anyhow!("MODELPATH {:?} does not name a profile model", model_path))
}

fn load_embedder(settings: &Settings, assets: &AssetManager) -> Result<Arc<dyn ImageEmbedding>> {
    let path = assets.verified_path(ScorerAsset::ImageBackbone)?;
    let config = RuntimeConfig::from_settings(settings);
    let embedder = OnnxImageEmbedder::load(&path, settings.img_size, &config)?;
    Ok(Arc::new(embedder))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping...");
            token.cancel();
        }
    });
    cancel
}

fn profile_command(store: &ProfileStore, settings: &Settings, action: ProfileAction) -> Result<()> {
    match action {
        ProfileAction::Create { name } => {
            let paths = store.create(&name)?;
            println!("Created profile {} at {:?}", name, paths.root);
        }
        ProfileAction::List => {
            for name in store.list()? {
                let status = if store.is_trained(&name)? { "trained" } else { "untrained" };
                println!("{:<24} {}", name, status);
            }
        }
        ProfileAction::Delete { name } => {
            store.delete(&name)?;
            println!("Deleted profile {}", name);
        }
        ProfileAction::Info { name } => {
            let paths = store.open(&name)?;
            let labeler = SeedLabeler::open(settings, &paths)?;
            let ledger = paths.open_ledger(settings.max_profile_stored)?;
            println!("Profile:        {}", name);
            println!("Model:          {:?}", paths.model());
            println!("Trained:        {}", store.is_trained(&name)?);
            println!("Seed labels:    {}/{}", labeler.labeled_count(), labeler.len());
            println!("Feedback:       {}", store.feedback_count(&name)?);
            println!("Pending review: {}", ledger.len()?);
        }
    }
    Ok(())
}

async fn assets_command(assets: &AssetManager, action: AssetAction) -> Result<()> {
    match action {
        AssetAction::Fetch { fresh } => {
            if fresh {
                info!("Fresh download requested - removing any existing asset files...");
                for asset in ScorerAsset::ALL {
                    assets.remove_asset(asset)?;
                }
            }
            let start = Instant::now();
            assets.ensure_all().await?;
            println!("All scorer assets ready (took {:.2?})", start.elapsed());
        }
        AssetAction::Verify => {
            for asset in ScorerAsset::ALL {
                let state = if !assets.is_asset_present(asset) {
                    "missing"
                } else if assets.verify_asset(asset)? {
                    "ok"
                } else {
                    "HASH MISMATCH"
                };
                println!("{:<32} {}", asset.file_name(), state);
            }
        }
    }
    Ok(())
}

fn label_command(settings: &Settings, paths: &ProfilePaths, outcome: Option<f32>) -> Result<()> {
    let mut labeler = SeedLabeler::open(settings, paths)?;
    if labeler.is_empty() {
        bail!("no seed images found under {:?}", settings.init_data_dir());
    }
    if let Some(outcome) = outcome {
        let image = labeler.current().map(|s| s.image.clone());
        if labeler.label(outcome)? {
            println!("Labeled {} as {:.2}", image.unwrap_or_default(), outcome.clamp(-1.0, 1.0));
        }
    }
    match labeler.current_image_path() {
        Some(path) => println!(
            "Next image ({}/{}): {:?} [current {:.2}]",
            labeler.position() + 1,
            labeler.len(),
            path,
            labeler.current_outcome()
        ),
        None => println!("All {} seed images labeled", labeler.len()),
    }
    Ok(())
}

async fn train_command(
    settings: Settings,
    assets: AssetManager,
    paths: ProfilePaths,
    preset: TrainingPreset,
) -> Result<()> {
    let options = TrainOptions::from_settings(&settings, preset)?;
    let embedder = load_embedder(&settings, &assets)?;
    let cancel = cancel_on_ctrl_c();
    let (tx, mut rx) = mpsc::unbounded_channel::<TrainProgress>();
    let trainer = Trainer::new(options, cancel).with_progress(tx);

    info!("Training {} for {} epochs", paths.name, trainer.options().epochs);
    let handle = tokio::task::spawn_blocking(move || {
        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let dataset = Dataset::for_profile(&settings, &paths, embedder.as_ref(), &mut rng)?;
        trainer.train(&paths.model(), &dataset)
    });

    while let Some(progress) = rx.recv().await {
        match progress.test_mse {
            Some(test) => println!(
                "Epoch {}/{}  train mse {:.4}  test mse {:.4}",
                progress.epoch, progress.total_epochs, progress.train_mse, test
            ),
            None => println!(
                "Epoch {}/{}  train mse {:.4}",
                progress.epoch, progress.total_epochs, progress.train_mse
            ),
        }
    }

    let summary = handle.await??;
    if summary.cancelled {
        println!(
            "Training cancelled after {} epoch(s); model keeps {} completed epoch(s)",
            summary.epochs_run, summary.epochs_total
        );
    } else {
        println!("Training complete: {} epoch(s) in total", summary.epochs_total);
    }
    Ok(())
}

fn run_swipe(
    mut controller: SwipeController,
    assets: AssetManager,
    runtime: RuntimeConfig,
    inbox: PathBuf,
) -> Result<SwipeReport, PipelineError> {
    // The face detector is not Send, so the scorers are built on the worker thread.
    let mut context = ScorerContext::load(&assets, &runtime)?;
    let mut session = DirectorySession::new(inbox)?;
    controller.run(&mut session, &mut context)
}

async fn swipe_command(
    settings: Settings,
    assets: AssetManager,
    paths: ProfilePaths,
    inbox: PathBuf,
) -> Result<()> {
    let embedder = load_embedder(&settings, &assets)?;
    let cancel = cancel_on_ctrl_c();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let controller = SwipeController::open(&settings, &paths, embedder, tx, cancel)?;
    let runtime = RuntimeConfig::from_settings(&settings);

    let handle = tokio::task::spawn_blocking(move || run_swipe(controller, assets, runtime, inbox));
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::Status(text) => println!("{}", text),
            PipelineEvent::Finished { completed, skipped } => {
                println!("Finished: {} swiped, {} skipped", completed, skipped)
            }
            _ => {}
        }
    }
    handle.await??;
    Ok(())
}

fn review_command(settings: &Settings, paths: &ProfilePaths, action: ReviewAction) -> Result<()> {
    let mut review = ReviewSession::new(settings, paths)?;
    match action {
        ReviewAction::List => {
            let items = review.items()?;
            if items.is_empty() {
                println!("All profiles reviewed");
            }
            for item in items {
                println!(
                    "{}  {:>6.3}  {:<7}  {:?}",
                    item.record.profile,
                    item.record.interest_score,
                    item.record.decision,
                    item.image_path
                );
            }
        }
        ReviewAction::Confirm { score } => match review.confirm(score)? {
            ReviewOutcome::Recorded(verdict) => println!(
                "Saved {} with outcome {:.2} for training",
                verdict.image, verdict.outcome
            ),
            ReviewOutcome::Unchanged => println!("Score unchanged, nothing saved"),
            ReviewOutcome::ImageMissing => println!("Image no longer on disk, nothing saved"),
            ReviewOutcome::AllReviewed => println!("All profiles reviewed"),
        },
    }
    if let Some(next) = review.current()? {
        println!(
            "Next: {} ({:.3}) {:?}",
            next.record.profile, next.record.interest_score, next.image_path
        );
    }
    Ok(())
}

fn require_trained(paths: &ProfilePaths) -> Result<()> {
    if !autoswipe::regressor::is_trained(&paths.model()) {
        return Err(PipelineError::ModelNotTrained.into());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    autoswipe::init_logger();
    let args = Args::parse();
    let settings = load_settings(&args)?;
    let store = ProfileStore::from_settings(&settings);

    match args.command {
        Command::Profile { action } => profile_command(&store, &settings, action)?,
        Command::Assets { action } => {
            let assets = AssetManager::from_settings(&settings)?;
            assets_command(&assets, action).await?
        }
        Command::Label { profile, outcome } => {
            let paths = store.open(&profile)?;
            label_command(&settings, &paths, outcome)?
        }
        Command::Train { profile, preset, epochs } => {
            let paths = resolve_profile(&store, &settings, profile.as_deref())?;
            let preset = epochs.map(TrainingPreset::Custom).unwrap_or(preset);
            let assets = AssetManager::from_settings(&settings)?;
            train_command(settings, assets, paths, preset).await?
        }
        Command::Swipe { profile, inbox } => {
            let paths = resolve_profile(&store, &settings, profile.as_deref())?;
            let assets = AssetManager::from_settings(&settings)?;
            swipe_command(settings, assets, paths, inbox).await?
        }
        Command::Review { profile, action } => {
            let paths = store.open(&profile)?;
            require_trained(&paths)?;
            review_command(&settings, &paths, action)?
        }
    }
    Ok(())
}
