pub mod config;
pub mod cue;
pub mod error;
pub mod output;
pub mod state;
pub mod trial;
pub use config::ExperimentConfig;
pub use cue::{NoiseCue, SilentCue};
pub use error::{ExperimentError, Result};
pub use output::{OutputFormat, SessionWriter};
pub use state::{ExperimentEvent, ExperimentStateMachine};
pub use trial::{Trial, TrialDurations, TrialTimestamps};
