use std::sync::OnceLock;

use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::Result as OrtResult;

use crate::config::Settings;

static INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// How aggressively ONNX Runtime rewrites a scorer graph at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphOptimization {
    Disabled,
    Basic,
    Extended,
    #[default]
    All,
}

impl From<GraphOptimization> for GraphOptimizationLevel {
    fn from(level: GraphOptimization) -> Self {
        match level {
            GraphOptimization::Disabled => GraphOptimizationLevel::Disable,
            GraphOptimization::Basic => GraphOptimizationLevel::Level1,
            GraphOptimization::Extended => GraphOptimizationLevel::Level2,
            GraphOptimization::All => GraphOptimizationLevel::Level3,
        }
    }
}

/// Session settings shared by the race, body-type and backbone models.
///
/// A thread count of 0 leaves the choice to ONNX Runtime.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuntimeConfig {
    pub inter_threads: usize,
    pub intra_threads: usize,
    pub optimization: GraphOptimization,
}

impl RuntimeConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            intra_threads: settings.onnx_threads,
            ..Self::default()
        }
    }
}

/// Initializes the process-wide ONNX Runtime environment once.
///
/// The outcome of the first attempt is kept, so a failed initialization is
/// reported to every later caller.
pub fn ensure_initialized() -> Result<(), String> {
    INIT.get_or_init(|| {
        ort::init()
            .with_name("autoswipe")
            .commit()
            .map(|_| ())
            .map_err(|e| e.to_string())
    })
    .clone()
}

pub fn create_session_builder(config: &RuntimeConfig) -> OrtResult<SessionBuilder> {
    if let Err(msg) = ensure_initialized() {
        log::error!("ONNX Runtime environment failed to initialize: {}", msg);
    }
    log::debug!("Creating ONNX session with {:?}", config);

    let mut builder = Session::builder()?;
    if config.inter_threads > 0 {
        builder = builder.with_inter_threads(config.inter_threads)?;
    }
    if config.intra_threads > 0 {
        builder = builder.with_intra_threads(config.intra_threads)?;
    }
    builder.with_optimization_level(config.optimization.into())
}
