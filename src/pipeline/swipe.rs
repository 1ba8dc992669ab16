use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::decision::DecisionPolicy;
use super::session::{ProfileDownload, SwipeSession};
use super::{CycleStage, Decision, PipelineError, PipelineEvent};
use crate::config::Settings;
use crate::profile::ProfilePaths;
use crate::regressor::{is_trained, InterestRegressor};
use crate::scoring::{FeatureAssembler, ImageEmbedding, ScorerContext};
use crate::store::{ImageRecord, PredictionLedger};

const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Timing between swipes. The think-time is drawn per profile from a normal
/// distribution so swipes do not land on a fixed beat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwipeDelays {
    pub think_mean_secs: f64,
    pub think_std_secs: f64,
    pub after_swipe: Duration,
}

impl Default for SwipeDelays {
    fn default() -> Self {
        Self {
            think_mean_secs: 3.0,
            think_std_secs: 0.3,
            after_swipe: Duration::from_secs(2),
        }
    }
}

impl SwipeDelays {
    pub fn none() -> Self {
        Self {
            think_mean_secs: 0.0,
            think_std_secs: 0.0,
            after_swipe: Duration::ZERO,
        }
    }

    fn think_time<R: Rng>(&self, rng: &mut R) -> Duration {
        let secs = Normal::new(self.think_mean_secs, self.think_std_secs)
            .map(|normal| normal.sample(rng))
            .unwrap_or(self.think_mean_secs);
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Totals of one swipe session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwipeReport {
    pub completed: u32,
    pub skipped: u32,
    pub stopped: bool,
}

enum CycleResult {
    Swiped,
    Skipped,
}

/// Runs swipe cycles against a session until the budget is spent, the
/// session dies or the cancellation token fires.
///
/// Only swiped profiles consume the budget. Skipped profiles and failed
/// cycles do not, but `max_consecutive_skips` of them in a row
/// ends the run.
pub struct SwipeController {
    policy: DecisionPolicy,
    regressor: InterestRegressor,
    ledger: PredictionLedger,
    prediction_dir: PathBuf,
    total_swipes: u32,
    max_consecutive_skips: u32,
    delays: SwipeDelays,
    rng: StdRng,
    events: UnboundedSender<PipelineEvent>,
    cancel: CancellationToken,
}

impl SwipeController {
    pub fn new(
        settings: &Settings,
        paths: &ProfilePaths,
        regressor: InterestRegressor,
        events: UnboundedSender<PipelineEvent>,
        cancel: CancellationToken,
    ) -> Result<Self, PipelineError> {
        let ledger = paths.open_ledger(settings.max_profile_stored)?;
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            policy: DecisionPolicy::from_settings(settings),
            regressor,
            ledger,
            prediction_dir: paths.prediction_dir(),
            total_swipes: settings.total_swipes,
            max_consecutive_skips: settings.max_consecutive_skips.max(1),
            delays: SwipeDelays::default(),
            rng,
            events,
            cancel,
        })
    }

    /// Loads the profile's trained model; refuses to start without one.
    pub fn open(
        settings: &Settings,
        paths: &ProfilePaths,
        embedder: Arc<dyn ImageEmbedding>,
        events: UnboundedSender<PipelineEvent>,
        cancel: CancellationToken,
    ) -> Result<Self, PipelineError> {
        if !is_trained(&paths.model()) {
            let _ = events.send(PipelineEvent::Status(
                "Couldn't load existing model. Please train a model first.".into(),
            ));
            return Err(PipelineError::ModelNotTrained);
        }
        let regressor = InterestRegressor::load(&paths.model(), embedder)?;
        Self::new(settings, paths, regressor, events, cancel)
    }

    pub fn with_delays(mut self, delays: SwipeDelays) -> Self {
        self.delays = delays;
        self
    }

    pub fn ledger(&self) -> &PredictionLedger {
        &self.ledger
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }

    fn status(&self, text: impl Into<String>) {
        let text = text.into();
        debug!("{}", text);
        self.emit(PipelineEvent::Status(text));
    }

    fn stage(&self, stage: CycleStage) {
        self.emit(PipelineEvent::Stage(stage));
    }

    /// Sleeps for `duration`, waking early on cancellation.
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.cancel.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(PAUSE_SLICE.min(deadline - now));
        }
    }

    pub fn run(
        &mut self,
        session: &mut dyn SwipeSession,
        context: &mut ScorerContext,
    ) -> Result<SwipeReport, PipelineError> {
        self.emit(PipelineEvent::ShowStop);
        self.status("Now logged in. Starting auto swipe...");
        self.ledger.enforce_retention(self.ledger.cap())?;

        let mut report = SwipeReport::default();
        let mut remaining = self.total_swipes;
        let mut consecutive_skips = 0u32;

        while remaining > 0 {
            if self.cancel.is_cancelled() {
                info!("Swipe session stopped by user");
                report.stopped = true;
                break;
            }
            if !session.is_alive() {
                warn!("{}", PipelineError::SessionLost);
                self.status("Session ended, stopping.");
                report.stopped = true;
                break;
            }

            self.status(format!("Swiping... {} swipes left.", remaining));
            let think = self.delays.think_time(&mut self.rng);
            self.pause(think);

            match self.cycle(session, context) {
                Ok(CycleResult::Swiped) => {
                    remaining -= 1;
                    report.completed += 1;
                    consecutive_skips = 0;
                }
                Ok(CycleResult::Skipped) => {
                    self.status("No photos detected, skipping profile.");
                    report.skipped += 1;
                    consecutive_skips += 1;
                }
                Err(e) => {
                    warn!("Swipe cycle failed: {}", e);
                    self.status(format!("Skipping profile after error: {}", e));
                    report.skipped += 1;
                    consecutive_skips += 1;
                }
            }
            self.stage(CycleStage::Idle);

            if consecutive_skips >= self.max_consecutive_skips {
                warn!("{} profiles in a row were skipped, stopping", consecutive_skips);
                report.stopped = true;
                break;
            }
        }

        info!(
            "Swipe session finished: {} swiped, {} skipped",
            report.completed, report.skipped
        );
        self.status("Click to swipe again");
        self.emit(PipelineEvent::ShowContinue);
        self.emit(PipelineEvent::Finished {
            completed: report.completed,
            skipped: report.skipped,
        });
        Ok(report)
    }

    fn cycle(
        &mut self,
        session: &mut dyn SwipeSession,
        context: &mut ScorerContext,
    ) -> Result<CycleResult, PipelineError> {
        self.stage(CycleStage::Downloading);
        let profile = match session.download_profile_images(&self.prediction_dir)? {
            ProfileDownload::Profile(id) => id,
            ProfileDownload::Invalid => return Ok(CycleResult::Skipped),
        };

        // Nothing else removes the folder of a profile that never reaches the ledger.
        let decision = match self.score_and_record(&profile, context) {
            Ok(decision) => decision,
            Err(e) => {
                self.ledger.remove_profile_dir(&profile);
                return Err(e);
            }
        };

        self.stage(CycleStage::Swiping);
        session.swipe(decision);
        self.pause(self.delays.after_swipe);
        Ok(CycleResult::Swiped)
    }

    fn score_and_record(
        &mut self,
        profile: &str,
        context: &mut ScorerContext,
    ) -> Result<Decision, PipelineError> {
        let profile_dir = self.ledger.profile_dir(profile);

        self.stage(CycleStage::Scoring);
        let batch = FeatureAssembler::new(context).assemble(&profile_dir)?;
        let scores = self.regressor.predict(&batch);

        self.stage(CycleStage::Deciding);
        let outcome = self.policy.decide(&scores);
        self.status(format!(
            "Profile: {}\nAvg score: {:.4}\nDecision: {}",
            profile, outcome.average, outcome.decision
        ));
        self.emit(PipelineEvent::ProfileDecided {
            profile: profile.to_string(),
            average: outcome.average,
            high_count: outcome.high_count,
            decision: outcome.decision,
        });

        self.stage(CycleStage::Logging);
        if batch.is_empty() {
            self.ledger.remove_profile_dir(profile);
        } else {
            let idx = self.rng.random_range(0..batch.len());
            let image = batch.image_paths[idx]
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let record = ImageRecord {
                profile: profile.to_string(),
                image,
                race_scores: batch.race_scores[idx],
                body_scores: batch.body_scores[idx],
                interest_score: scores[idx],
                decision: outcome.decision,
            };
            self.ledger.append(&record)?;
        }
        Ok(outcome.decision)
    }
}
