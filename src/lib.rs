//! stratumd library: a GPS-backed stratum-1 NTP responder plus an active
//! monitor deriving quality metrics for remote NTP servers.

pub mod adapters;
pub mod config;
pub mod domain;
mod error;
pub mod fmt;
pub mod proto;
pub mod registry;
pub mod services;
pub mod stats;
pub mod timesource;

pub use config::{Config, ScoreWeights};
pub use domain::{FixStatus, FleetStats, QualityScore, Target, TargetId, TargetReport, TimeSample};
pub use error::Error;
pub use registry::TargetRegistry;
pub use services::core::Core;
pub use services::monitor::Monitor;
pub use services::responder::Responder;
pub use stats::{HistoryBuffer, StatsStore};
pub use timesource::{run_feed, GpsFix, TimeSource};
