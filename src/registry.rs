//! CRUD over the set of monitored targets.
//!
//! All mutation goes through one internal lock. The probe coordinator
//! never iterates live state: it takes an immutable snapshot of enabled
//! targets at cycle start, so a concurrent removal cannot corrupt a cycle.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::info;

use crate::adapters::resolver;
use crate::domain::{Target, TargetId};
use crate::error::Error;

#[derive(Debug, Default)]
struct Inner {
    targets: BTreeMap<TargetId, Target>,
    next_id: TargetId,
}

/// Registry of monitored remote NTP servers, unique by (address, port).
#[derive(Debug, Default)]
pub struct TargetRegistry {
    inner: Mutex<Inner>,
}

impl TargetRegistry {
    pub fn new() -> TargetRegistry {
        TargetRegistry::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a target. The address is resolved up front; a target that
    /// never resolves is a configuration mistake, not an unreachable peer.
    pub fn add(&self, address: &str, port: u16, name: Option<&str>) -> Result<Target, Error> {
        if port == 0 {
            return Err(Error::Validation("port must be in [1, 65535]".into()));
        }
        let resolved =
            resolver::resolve(address, port).map_err(|e| Error::Validation(e.to_string()))?;
        let mut inner = self.lock();
        if inner
            .targets
            .values()
            .any(|t| t.address == address && t.port == port)
        {
            return Err(Error::Validation(format!(
                "target {}:{} already registered",
                address, port
            )));
        }
        let id = inner.next_id;
        inner.next_id += 1;
        let target = Target {
            id,
            address: address.to_string(),
            port,
            name: name.unwrap_or(address).to_string(),
            resolved,
            enabled: true,
            added_at: Utc::now(),
        };
        inner.targets.insert(id, target.clone());
        info!(id, address, port, "target added");
        Ok(target)
    }

    /// Remove a target. The caller is responsible for purging its history
    /// from the stats store (the query surface does both).
    pub fn remove(&self, id: TargetId) -> Result<Target, Error> {
        let mut inner = self.lock();
        let removed = inner
            .targets
            .remove(&id)
            .ok_or_else(|| Error::NotFound(format!("target id {}", id)))?;
        info!(id, address = %removed.address, "target removed");
        Ok(removed)
    }

    pub fn enable(&self, id: TargetId) -> Result<(), Error> {
        self.set_enabled(id, true)
    }

    pub fn disable(&self, id: TargetId) -> Result<(), Error> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: TargetId, enabled: bool) -> Result<(), Error> {
        let mut inner = self.lock();
        let target = inner
            .targets
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("target id {}", id)))?;
        target.enabled = enabled;
        Ok(())
    }

    pub fn get(&self, id: TargetId) -> Option<Target> {
        self.lock().targets.get(&id).cloned()
    }

    pub fn contains(&self, id: TargetId) -> bool {
        self.lock().targets.contains_key(&id)
    }

    pub fn list(&self) -> Vec<Target> {
        self.lock().targets.values().cloned().collect()
    }

    /// Snapshot of enabled targets, taken under the lock, for one probe
    /// cycle to iterate without holding anything.
    pub fn enabled_snapshot(&self) -> Vec<Target> {
        self.lock()
            .targets
            .values()
            .filter(|t| t.enabled)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().targets.is_empty()
    }
}
