pub mod attention;
pub mod config;
pub mod device;
pub mod error;
pub mod markers;
pub mod planner;
pub mod practice;
pub mod runner;
pub mod session;
pub mod sim;
pub mod trial_log;

pub use attention::{AttentionSettings, AttentionState, Selection};
pub use config::{ExperimentConfig, FrameCounts, RecordingLossPolicy};
pub use device::{Display, DriftOutcome, RecordingStatus, Tracker};
pub use error::{ConfigError, DeviceError, LogError, RunError};
pub use markers::{Marker, MarkerId, TrialIds};
pub use planner::{PlanParams, SessionPlan, create_block, populate_session};
pub use practice::{PracticeOutcome, PracticeScore, run_practice};
pub use runner::{BlockContext, BlockOutcome, Rig, Runner};
pub use session::{DataFile, Orchestrator, RunSummary, ScheduledSession, build_schedule};
pub use trial_log::{JsonLinesLog, TrialLog};
