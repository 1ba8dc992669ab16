mod common;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use autoswipe::labeling::{SeedLabeler, SEED_INDEX_FILE};
use autoswipe::pipeline::{
    DirectorySession, ProfileDownload, ReviewOutcome, SwipeDelays, SwipeSession,
};
use autoswipe::regressor::{Dataset, InterestRegressor, RegressorHead, TrainOptions};
use autoswipe::scoring::{uniform_race_scores, ImageEmbedding};
use autoswipe::store::{CsvTable, SeedRecord, TableStore, SEED_HEADER};
use autoswipe::{
    Decision, PipelineError, PipelineEvent, ProfilePaths, ProfileStore, ReviewSession, Settings,
    SwipeController, Trainer,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::{init, scorer_context, settings, write_image, BrightnessEmbedder};

/// Six seed images: bright ones are liked, dark ones are not.
fn write_seed_dataset(settings: &Settings) {
    let seed_dir = settings.init_data_dir();
    let index = CsvTable::<SeedRecord>::new(seed_dir.join(SEED_INDEX_FILE), &SEED_HEADER);
    for (i, value) in [250u8, 5, 240, 10, 230, 20].iter().enumerate() {
        let image = format!("seed_{}.png", i);
        write_image(&seed_dir.join(&image), *value);
        index
            .append(&SeedRecord {
                image,
                race_scores: uniform_race_scores(),
                body_scores: [0.0, 1.0, 0.0],
            })
            .unwrap();
    }
}

fn label_seeds(settings: &Settings, paths: &ProfilePaths) {
    let mut labeler = SeedLabeler::open(settings, paths).unwrap();
    assert_eq!(labeler.len(), 6);
    while let Some(path) = labeler.current_image_path() {
        let bright = image::open(&path).unwrap().to_luma8().get_pixel(0, 0)[0] > 128;
        labeler.label(if bright { 0.8 } else { -0.8 }).unwrap();
    }
    assert!(labeler.is_complete());
}

fn train(settings: &Settings, paths: &ProfilePaths, embedder: &dyn ImageEmbedding) -> Dataset {
    let mut rng = StdRng::seed_from_u64(3);
    let dataset = Dataset::for_profile(settings, paths, embedder, &mut rng).unwrap();
    let options = TrainOptions {
        epochs: 200,
        batch_size: 4,
        learning_rate: 1e-2,
        hidden_size: 16,
        seed: 3,
    };
    let summary = Trainer::new(options, CancellationToken::new())
        .train(&paths.model(), &dataset)
        .unwrap();
    assert!(!summary.cancelled);
    assert_eq!(summary.epochs_total, 200);
    dataset
}

fn write_profile(inbox: &Path, name: &str, values: &[u8]) {
    for (i, value) in values.iter().enumerate() {
        write_image(&inbox.join(name).join(format!("image_{}.png", i + 1)), *value);
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn test_label_train_swipe_review_cycle() {
    init();
    let dir = TempDir::new().unwrap();
    let mut settings = settings(dir.path());
    settings.total_swipes = 5;
    write_seed_dataset(&settings);

    let store = ProfileStore::from_settings(&settings);
    let paths = store.create("alice").unwrap();
    assert!(!store.is_trained("alice").unwrap());

    label_seeds(&settings, &paths);
    let embedder: Arc<dyn ImageEmbedding> = Arc::new(BrightnessEmbedder);
    let dataset = train(&settings, &paths, embedder.as_ref());
    assert_eq!(dataset.len(), 6);
    assert!(store.is_trained("alice").unwrap());

    let inbox = dir.path().join("inbox");
    write_profile(&inbox, "a_bright", &[250, 245]);
    fs::create_dir_all(inbox.join("b_empty")).unwrap();
    fs::write(inbox.join("b_empty").join("bio.txt"), b"no photos").unwrap();
    write_profile(&inbox, "c_dark", &[5, 10]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let mut controller = SwipeController::open(&settings, &paths, embedder.clone(), tx, cancel)
        .unwrap()
        .with_delays(SwipeDelays::none());
    let mut session = DirectorySession::new(&inbox).unwrap();
    let report = controller.run(&mut session, &mut scorer_context()).unwrap();

    assert_eq!(report.completed, 2);
    assert_eq!(report.skipped, 1);
    assert!(report.stopped, "an exhausted inbox ends the session");

    let rows = controller.ledger().records().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].decision, Decision::Like);
    assert_eq!(rows[1].decision, Decision::Dislike);
    assert!(rows[0].interest_score > 0.2);
    assert!(rows[1].interest_score < 0.2);
    for row in &rows {
        assert!(controller.ledger().profile_dir(&row.profile).join(&row.image).is_file());
    }

    let log = fs::read_to_string(session.log_path()).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with(",a_bright,like"));
    assert!(lines[1].ends_with(",c_dark,dislike"));

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&PipelineEvent::ShowStop));
    assert_eq!(events.last(), Some(&PipelineEvent::Finished { completed: 2, skipped: 1 }));
    assert!(events.contains(&PipelineEvent::ShowContinue));
    let decided = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::ProfileDecided { .. }))
        .count();
    assert_eq!(decided, 2);
    drop(controller);

    // Review: correct the liked profile hard, accept the disliked one as is.
    let mut review = ReviewSession::new(&settings, &paths).unwrap();
    assert_eq!(review.remaining().unwrap(), 2);
    let first = review.current().unwrap().unwrap();
    assert_eq!(first.record.profile, rows[0].profile);
    let outcome = review.confirm(-1.0).unwrap();
    let verdict = match outcome {
        ReviewOutcome::Recorded(verdict) => verdict,
        other => panic!("expected a verdict, got {:?}", other),
    };
    assert_eq!(verdict.image, format!("{}.png", rows[0].profile));
    assert!(paths.training_dir().join(&verdict.image).is_file());
    assert!(!paths.prediction_dir().join(&rows[0].profile).exists());

    let second = review.current().unwrap().unwrap();
    assert_eq!(review.confirm(second.record.interest_score).unwrap(), ReviewOutcome::Unchanged);
    assert!(!paths.prediction_dir().join(&rows[1].profile).exists());
    assert_eq!(review.confirm(0.0).unwrap(), ReviewOutcome::AllReviewed);
    assert_eq!(review.remaining().unwrap(), 0);
    assert_eq!(store.feedback_count("alice").unwrap(), 1);

    // The verdict joins the seed labels on the next run.
    let mut rng = StdRng::seed_from_u64(4);
    let dataset = Dataset::for_profile(&settings, &paths, embedder.as_ref(), &mut rng).unwrap();
    assert_eq!(dataset.len(), 7);
}

#[test]
fn test_swipe_requires_trained_model() {
    init();
    let dir = TempDir::new().unwrap();
    let settings = settings(dir.path());
    let paths = ProfileStore::from_settings(&settings).create("bob").unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let embedder = Arc::new(BrightnessEmbedder);
    let result = SwipeController::open(&settings, &paths, embedder, tx, CancellationToken::new());
    assert!(matches!(result, Err(PipelineError::ModelNotTrained)));
    assert!(matches!(rx.try_recv(), Ok(PipelineEvent::Status(_))));
}

fn untrained_controller(
    settings: &Settings,
    paths: &ProfilePaths,
) -> (SwipeController, mpsc::UnboundedReceiver<PipelineEvent>) {
    let mut rng = StdRng::seed_from_u64(1);
    let head = RegressorHead::new(1 + autoswipe::regressor::AUX_FEATURES, 8, &mut rng);
    let regressor = InterestRegressor::new(Arc::new(BrightnessEmbedder), head).unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = SwipeController::new(settings, paths, regressor, tx, CancellationToken::new())
        .unwrap()
        .with_delays(SwipeDelays::none());
    (controller, rx)
}

#[test]
fn test_consecutive_skips_stop_the_run() {
    init();
    let dir = TempDir::new().unwrap();
    let mut settings = settings(dir.path());
    settings.total_swipes = 10;
    settings.max_consecutive_skips = 3;
    let paths = ProfileStore::from_settings(&settings).create("carol").unwrap();

    let inbox = dir.path().join("inbox");
    for i in 0..5 {
        fs::create_dir_all(inbox.join(format!("empty_{}", i))).unwrap();
    }

    let (mut controller, _rx) = untrained_controller(&settings, &paths);
    let mut session = DirectorySession::new(&inbox).unwrap();
    let report = controller.run(&mut session, &mut scorer_context()).unwrap();

    assert_eq!(report.completed, 0);
    assert_eq!(report.skipped, 3);
    assert!(report.stopped);
    assert!(controller.ledger().is_empty().unwrap());
}

#[test]
fn test_budget_limits_swipes() {
    init();
    let dir = TempDir::new().unwrap();
    let mut settings = settings(dir.path());
    settings.total_swipes = 2;
    let paths = ProfileStore::from_settings(&settings).create("dave").unwrap();

    let inbox = dir.path().join("inbox");
    for name in ["p1", "p2", "p3", "p4"] {
        write_profile(&inbox, name, &[100, 150, 200]);
    }

    let (mut controller, _rx) = untrained_controller(&settings, &paths);
    let mut session = DirectorySession::new(&inbox).unwrap();
    let report = controller.run(&mut session, &mut scorer_context()).unwrap();

    assert_eq!(report.completed, 2);
    assert!(!report.stopped);
    assert_eq!(controller.ledger().len().unwrap(), 2);
    assert!(inbox.join("p3").is_dir());
    assert!(inbox.join("p4").is_dir());
}

#[test]
fn test_cancelled_before_start_swipes_nothing() {
    init();
    let dir = TempDir::new().unwrap();
    let settings = settings(dir.path());
    let paths = ProfileStore::from_settings(&settings).create("erin").unwrap();
    let inbox = dir.path().join("inbox");
    write_profile(&inbox, "p1", &[100]);

    let mut rng = StdRng::seed_from_u64(1);
    let head = RegressorHead::new(1 + autoswipe::regressor::AUX_FEATURES, 8, &mut rng);
    let regressor = InterestRegressor::new(Arc::new(BrightnessEmbedder), head).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut controller = SwipeController::new(&settings, &paths, regressor, tx, cancel).unwrap();
    let mut session = DirectorySession::new(&inbox).unwrap();
    let report = controller.run(&mut session, &mut scorer_context()).unwrap();

    assert_eq!(report.completed, 0);
    assert!(report.stopped);
    assert!(inbox.join("p1").is_dir());
    assert_eq!(
        drain(&mut rx).last(),
        Some(&PipelineEvent::Finished { completed: 0, skipped: 0 })
    );
}

/// Scripted session: the first `failures` downloads error out, later ones
/// deliver a folder built by `fill`.
struct ScriptedSession {
    failures: u32,
    fill: fn(&Path),
    cancel_on_download: Option<CancellationToken>,
    /// Replaced by a directory on download, so ledger writes fail.
    break_ledger: Option<PathBuf>,
    downloads: u32,
    likes: u32,
    dislikes: u32,
}

impl ScriptedSession {
    fn new(fill: fn(&Path)) -> Self {
        Self {
            failures: 0,
            fill,
            cancel_on_download: None,
            break_ledger: None,
            downloads: 0,
            likes: 0,
            dislikes: 0,
        }
    }
}

impl SwipeSession for ScriptedSession {
    fn download_profile_images(&mut self, destination: &Path) -> io::Result<ProfileDownload> {
        self.downloads += 1;
        if let Some(cancel) = &self.cancel_on_download {
            cancel.cancel();
        }
        if let Some(ledger) = &self.break_ledger {
            if ledger.is_file() {
                fs::remove_file(ledger)?;
                fs::create_dir_all(ledger)?;
            }
        }
        if self.downloads <= self.failures {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "page did not load"));
        }
        let id = format!("profile_{}", self.downloads);
        let folder = destination.join(&id);
        fs::create_dir_all(&folder)?;
        (self.fill)(&folder);
        Ok(ProfileDownload::Profile(id))
    }

    fn like(&mut self) {
        self.likes += 1;
    }

    fn dislike(&mut self) {
        self.dislikes += 1;
    }

    fn is_alive(&self) -> bool {
        true
    }
}

fn two_photos(folder: &Path) {
    write_image(&folder.join("image_1.png"), 120);
    write_image(&folder.join("image_2.png"), 180);
}

fn no_photos(folder: &Path) {
    fs::write(folder.join("bio.txt"), b"no photos here").unwrap();
}

fn profile_folders(paths: &ProfilePaths) -> usize {
    match fs::read_dir(paths.prediction_dir()) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

#[test]
fn test_failed_cycles_do_not_spend_the_budget() {
    init();
    let dir = TempDir::new().unwrap();
    let mut settings = settings(dir.path());
    settings.total_swipes = 2;
    settings.max_consecutive_skips = 5;
    let paths = ProfileStore::from_settings(&settings).create("frank").unwrap();

    let (mut controller, mut rx) = untrained_controller(&settings, &paths);
    let mut session = ScriptedSession::new(two_photos);
    session.failures = 3;
    let report = controller.run(&mut session, &mut scorer_context()).unwrap();

    assert_eq!(report.completed, 2);
    assert_eq!(report.skipped, 3);
    assert!(!report.stopped);
    assert_eq!(session.downloads, 5);
    assert_eq!(session.likes + session.dislikes, 2);
    assert_eq!(controller.ledger().len().unwrap(), 2);
    assert_eq!(
        drain(&mut rx).last(),
        Some(&PipelineEvent::Finished { completed: 2, skipped: 3 })
    );
}

#[test]
fn test_repeated_failures_stop_the_run() {
    init();
    let dir = TempDir::new().unwrap();
    let mut settings = settings(dir.path());
    settings.total_swipes = 10;
    settings.max_consecutive_skips = 3;
    let paths = ProfileStore::from_settings(&settings).create("gina").unwrap();

    let (mut controller, _rx) = untrained_controller(&settings, &paths);
    let mut session = ScriptedSession::new(two_photos);
    session.failures = u32::MAX;
    let report = controller.run(&mut session, &mut scorer_context()).unwrap();

    assert_eq!(report.completed, 0);
    assert_eq!(report.skipped, 3);
    assert!(report.stopped);
    assert_eq!(session.downloads, 3);
    assert!(controller.ledger().is_empty().unwrap());
}

#[test]
fn test_failure_after_download_removes_the_profile_folder() {
    init();
    let dir = TempDir::new().unwrap();
    let mut settings = settings(dir.path());
    settings.total_swipes = 5;
    settings.max_consecutive_skips = 2;
    let paths = ProfileStore::from_settings(&settings).create("hank").unwrap();

    let (mut controller, _rx) = untrained_controller(&settings, &paths);
    let mut session = ScriptedSession::new(two_photos);
    session.break_ledger = Some(paths.ledger());
    let report = controller.run(&mut session, &mut scorer_context()).unwrap();

    assert_eq!(report.completed, 0);
    assert_eq!(report.skipped, 2);
    assert!(report.stopped);
    assert_eq!(session.likes + session.dislikes, 0);
    assert_eq!(profile_folders(&paths), 0);
}

#[test]
fn test_profile_without_photos_is_disliked_and_not_recorded() {
    init();
    let dir = TempDir::new().unwrap();
    let mut settings = settings(dir.path());
    settings.total_swipes = 1;
    let paths = ProfileStore::from_settings(&settings).create("iris").unwrap();

    let (mut controller, mut rx) = untrained_controller(&settings, &paths);
    let mut session = ScriptedSession::new(no_photos);
    let report = controller.run(&mut session, &mut scorer_context()).unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(session.dislikes, 1);
    assert_eq!(session.likes, 0);
    assert!(controller.ledger().is_empty().unwrap());
    assert!(!paths.prediction_dir().join("profile_1").exists());
    assert!(drain(&mut rx).contains(&PipelineEvent::ProfileDecided {
        profile: "profile_1".into(),
        average: 0.0,
        high_count: 0,
        decision: Decision::Dislike,
    }));
}

#[test]
fn test_stop_during_download_finishes_only_that_profile() {
    init();
    let dir = TempDir::new().unwrap();
    let mut settings = settings(dir.path());
    settings.total_swipes = 5;
    let paths = ProfileStore::from_settings(&settings).create("jack").unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    let head = RegressorHead::new(1 + autoswipe::regressor::AUX_FEATURES, 8, &mut rng);
    let regressor = InterestRegressor::new(Arc::new(BrightnessEmbedder), head).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let mut controller = SwipeController::new(&settings, &paths, regressor, tx, cancel.clone())
        .unwrap()
        .with_delays(SwipeDelays::none());

    let mut session = ScriptedSession::new(two_photos);
    session.cancel_on_download = Some(cancel);
    let report = controller.run(&mut session, &mut scorer_context()).unwrap();

    assert_eq!(session.downloads, 1);
    assert_eq!(report.completed, 1);
    assert!(report.stopped);
    assert_eq!(session.likes + session.dislikes, 1);
    assert_eq!(controller.ledger().len().unwrap(), 1);
}
