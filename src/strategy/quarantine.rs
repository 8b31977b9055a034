//! Quarantine sub-state for severely degraded hosts.
//!
//! # States
//! - Selectable: host holds points, normal selection
//! - Quarantined: zero points, cooling down
//! - Probation: probe passed, re-admitted at minimal trust
//!
//! # State Transitions
//! ```text
//! Selectable → Quarantined: score below threshold for N consecutive intervals
//! Quarantined → Probation: cooldown elapsed and probe passes
//! Quarantined → Quarantined: probe fails, cooldown restarts
//! ```
//!
//! # Design Decisions
//! - Quarantine is capped to a fraction of the partition, so a cluster-wide
//!   slowdown degrades points instead of emptying the selectable set
//! - The probe is a seam: transports plug in a real health check, the
//!   default declares recovery once the cooldown elapses

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

/// Out-of-band health probe consulted before a quarantined host re-enters.
#[async_trait]
pub trait QuarantineProbe: Send + Sync {
    /// True when the host looks healthy enough to take minimal traffic.
    async fn probe(&self, uri: &Url) -> bool;
}

/// Default probe: a host is considered recovered once its cooldown elapses.
pub struct CooldownProbe;

#[async_trait]
impl QuarantineProbe for CooldownProbe {
    async fn probe(&self, _uri: &Url) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy)]
struct QuarantineEntry {
    until_ms: u64,
}

/// Bookkeeping of which hosts are quarantined and until when.
#[derive(Debug, Default)]
pub(crate) struct QuarantineLedger {
    entries: HashMap<Url, QuarantineEntry>,
}

impl QuarantineLedger {
    pub(crate) fn admit(&mut self, uri: Url, now_ms: u64, cooldown: Duration) {
        self.entries.insert(
            uri,
            QuarantineEntry {
                until_ms: now_ms + cooldown.as_millis() as u64,
            },
        );
    }

    pub(crate) fn is_quarantined(&self, uri: &Url) -> bool {
        self.entries.contains_key(uri)
    }

    /// Hosts whose cooldown has elapsed.
    pub(crate) fn due(&self, now_ms: u64) -> Vec<Url> {
        self.entries
            .iter()
            .filter(|(_, e)| e.until_ms <= now_ms)
            .map(|(u, _)| u.clone())
            .collect()
    }

    pub(crate) fn release(&mut self, uri: &Url) {
        self.entries.remove(uri);
    }

    /// Restart a cooldown after a failed probe.
    pub(crate) fn extend(&mut self, uri: &Url, now_ms: u64, cooldown: Duration) {
        if let Some(entry) = self.entries.get_mut(uri) {
            entry.until_ms = now_ms + cooldown.as_millis() as u64;
        }
    }

    /// Forget hosts that left the candidate set.
    pub(crate) fn retain_known<F: Fn(&Url) -> bool>(&mut self, known: F) {
        self.entries.retain(|uri, _| known(uri));
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn uris(&self) -> Vec<Url> {
        self.entries.keys().cloned().collect()
    }
}
