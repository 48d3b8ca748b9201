use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Registry-assigned target identifier. Never reused after removal.
pub type TargetId = u64;

/// A monitored remote NTP server. Unique by (address, port).
#[derive(Clone, Debug, Serialize)]
pub struct Target {
    pub id: TargetId,
    /// Host name or IP literal as supplied by the caller.
    pub address: String,
    pub port: u16,
    pub name: String,
    /// Socket address resolved at registration time.
    #[serde(skip)]
    pub resolved: SocketAddr,
    pub enabled: bool,
    pub added_at: DateTime<Utc>,
}
