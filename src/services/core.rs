//! Transport-agnostic query/command surface consumed by the presentation
//! layer. Everything here is synchronous over the shared state; no lock is
//! held across I/O, and rendering happens on copied snapshots.

use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use crate::config::Config;
use crate::domain::{FixStatus, FleetStats, Target, TargetId, TargetReport};
use crate::error::Error;
use crate::fmt::csv;
use crate::registry::TargetRegistry;
use crate::stats::StatsStore;
use crate::timesource::TimeSource;

/// Shared handle bundling the owned state objects. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Core {
    time: Arc<TimeSource>,
    registry: Arc<TargetRegistry>,
    stats: Arc<StatsStore>,
    config: Config,
}

impl Core {
    pub fn new(
        time: Arc<TimeSource>,
        registry: Arc<TargetRegistry>,
        stats: Arc<StatsStore>,
        config: Config,
    ) -> Core {
        Core {
            time,
            registry,
            stats,
            config,
        }
    }

    pub fn time(&self) -> &Arc<TimeSource> {
        &self.time
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<StatsStore> {
        &self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current fix state: wall clock, validity, and the stratum the
    /// responder would advertise right now.
    pub fn current_fix(&self) -> FixStatus {
        let staleness = self.config.staleness();
        let fix = self.time.current();
        FixStatus {
            utc: self.time.now(staleness),
            fix_valid: self.time.is_synchronized(staleness),
            stratum_hint: self.time.stratum_hint(staleness),
            satellites: fix.map_or(0, |f| f.satellites),
            fix_age_secs: fix.map(|f| f.age().as_secs_f64()),
        }
    }

    /// Per-target reports, best quality first (unscored targets last).
    pub fn target_reports(&self) -> Vec<TargetReport> {
        let mut reports: Vec<TargetReport> = self
            .registry
            .list()
            .iter()
            .map(|t| self.stats.report(t))
            .collect();
        reports.sort_by(|a, b| {
            let a = a.quality.map(|q| q.score);
            let b = b.quality.map(|q| q.score);
            b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
        });
        reports
    }

    /// Register a target. The raw port is validated here so callers that
    /// deal in untyped integers get a `Validation` error, not a cast.
    #[instrument(skip(self))]
    pub fn add_target(&self, address: &str, port: u32, name: Option<&str>) -> Result<Target, Error> {
        if port == 0 || port > u16::MAX as u32 {
            return Err(Error::Validation(format!(
                "port out of range [1..65535]: {}",
                port
            )));
        }
        self.registry.add(address, port as u16, name)
    }

    /// Remove a target and discard its history.
    #[instrument(skip(self))]
    pub fn remove_target(&self, id: TargetId) -> Result<(), Error> {
        let removed = self.registry.remove(id)?;
        self.stats.purge(removed.id);
        Ok(())
    }

    pub fn enable_target(&self, id: TargetId) -> Result<(), Error> {
        self.registry.enable(id)
    }

    pub fn disable_target(&self, id: TargetId) -> Result<(), Error> {
        self.registry.disable(id)
    }

    /// Tabular export of history: one target, or all of them. Snapshots
    /// are copied out under the store lock; rendering happens here.
    pub fn export_snapshot(&self, id: Option<TargetId>) -> Result<Vec<u8>, Error> {
        let targets = match id {
            Some(id) => vec![self
                .registry
                .get(id)
                .ok_or_else(|| Error::NotFound(format!("target id {}", id)))?],
            None => self.registry.list(),
        };
        let mut sections = Vec::with_capacity(targets.len());
        for target in targets {
            let samples = self.stats.snapshot(target.id).unwrap_or_default();
            let quality = self.stats.quality(target.id);
            sections.push((target, samples, quality));
        }
        Ok(csv::render_snapshot(&sections).into_bytes())
    }

    /// Copy of one target's history window.
    pub fn history(&self, id: TargetId) -> Result<Vec<crate::domain::TimeSample>, Error> {
        if !self.registry.contains(id) {
            return Err(Error::NotFound(format!("target id {}", id)));
        }
        Ok(self.stats.snapshot(id).unwrap_or_default())
    }

    /// Cross-target aggregate from the latest samples.
    pub fn fleet(&self) -> Option<FleetStats> {
        self.stats.fleet(&self.registry.list())
    }

    /// Full daemon state as pretty-printed JSON: fix, per-target reports
    /// (best first), and the fleet aggregate.
    pub fn status_json(&self) -> Result<String, Error> {
        let view = StatusView {
            fix: self.current_fix(),
            targets: self.target_reports(),
            fleet: self.fleet(),
        };
        serde_json::to_string_pretty(&view).map_err(|e| Error::Other(e.to_string()))
    }
}

#[derive(Serialize)]
struct StatusView {
    fix: FixStatus,
    targets: Vec<TargetReport>,
    fleet: Option<FleetStats>,
}
