// candor/src/lib.rs
//
// candor — per-interview antifraud aggregation.
//
// Independent trust signals (liveness, face match, voice match, AI-text
// probability, browser heartbeats) arrive asynchronously and out of order.
// Each one is merged into the interview's FraudRecord, which is rescored and
// reclassified under the same lock before the call returns.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod providers;
pub mod report;
pub mod state;
pub mod workers;

pub use config::AntifraudConfig;
pub use engine::ingest::AntifraudService;
pub use error::{AntifraudError, Result};
pub use events::{FraudStatus, Heartbeat, IngestCommand, Verdict};
pub use state::record::FraudRecord;
