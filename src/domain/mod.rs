pub mod sample;
pub mod target;

pub use sample::{FixStatus, FleetStats, QualityScore, TargetReport, TimeSample};
pub use target::{Target, TargetId};
