//! Runtime configuration of the prefetch coordination core

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefetch coordination settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PrefetchConfig {
    /// Soft TTL of cached package facts, in seconds
    #[serde(default = "default_status_ttl")]
    pub status_ttl_secs: u64,

    /// Buffered "section status changed" notifications
    #[serde(default = "default_section_event_capacity")]
    pub section_event_capacity: usize,

    /// Buffered session events awaiting reconciliation
    #[serde(default = "default_session_event_capacity")]
    pub session_event_capacity: usize,
}

fn default_status_ttl() -> u64 {
    300
}

fn default_section_event_capacity() -> usize {
    32
}

fn default_session_event_capacity() -> usize {
    16
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            status_ttl_secs: default_status_ttl(),
            section_event_capacity: default_section_event_capacity(),
            session_event_capacity: default_session_event_capacity(),
        }
    }
}

impl PrefetchConfig {
    /// Soft TTL as a duration
    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }

    /// Reject settings the event channels cannot be built with
    pub fn validate(&self) -> Result<()> {
        if self.section_event_capacity == 0 {
            return Err(Error::invalid_config(
                "section-event-capacity must be at least 1",
            ));
        }
        if self.session_event_capacity == 0 {
            return Err(Error::invalid_config(
                "session-event-capacity must be at least 1",
            ));
        }
        Ok(())
    }
}
