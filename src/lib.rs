pub mod config;
pub mod engine;
pub mod logging;
pub mod source;

pub use config::EngineConfig;
pub use engine::checkpoint::{ResumeChoice, ResumeDecision, WatchCheckpoint};
pub use engine::session::{
    MediaEvent, PlaybackSession, PlaybackState, SessionCollaborators, SessionEvent, StartOutcome,
};
pub use source::traits::{EpisodeKey, MediaEngine, ProgressGateway, ProgressTracker, SegmentSource};
