pub mod activity;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod manifest;
pub mod matcher;
pub mod stats;
pub mod storage;

pub use activity::{ActivitySink, ScanActivity, SilentSink, TracingSink};
pub use config::AppConfig;
pub use engine::{ScanEngine, ScanOutcome, SessionDetail, SessionSummary};
pub use error::Error;
pub use manifest::ManifestRecord;
pub use matcher::ScanStatus;
pub use stats::SessionStats;
