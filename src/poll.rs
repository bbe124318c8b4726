use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, error};

use crate::types::RemoteId;

/// Bounded-retry schedule for one eventually-consistent read site.
///
/// Every place the engine waits for backend-derived data goes through
/// [`PollPolicy::run`]; the per-site parameterizations live in
/// [`crate::constants::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: usize,
    pub interval: Duration,
}

/// Result of a polling run: everything found, in fetch-report order, plus
/// the keys still missing when the attempts ran out.
#[derive(Debug, Clone)]
pub struct PollOutcome<V> {
    pub found: IndexMap<RemoteId, V>,
    pub missing: Vec<RemoteId>,
}

impl<V> PollOutcome<V> {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

impl PollPolicy {
    /// Runs the bounded-retry loop for `targets`.
    ///
    /// Each round passes only the still-missing keys to `fetch` and merges
    /// whatever it reports. Stops early once every target is found;
    /// otherwise sleeps `interval` between rounds (never after the last
    /// one). Exhaustion is logged as an error and surfaces through the
    /// outcome; callers continue with partial data.
    pub fn run<V, F>(&self, label: &str, targets: &[RemoteId], mut fetch: F) -> PollOutcome<V>
    where
        F: FnMut(&[RemoteId]) -> IndexMap<RemoteId, V>,
    {
        let mut found: IndexMap<RemoteId, V> = IndexMap::new();
        let mut missing: Vec<RemoteId> = Vec::new();
        for target in targets {
            if !missing.contains(target) {
                missing.push(target.clone());
            }
        }
        if missing.is_empty() {
            return PollOutcome { found, missing };
        }

        for attempt in 1..=self.max_attempts {
            for (key, value) in fetch(&missing) {
                found.insert(key, value);
            }
            missing.retain(|key| !found.contains_key(key));
            debug!(
                label,
                attempt,
                found = found.len(),
                missing = missing.len(),
                "poll round finished"
            );
            if missing.is_empty() {
                return PollOutcome { found, missing };
            }
            if attempt < self.max_attempts {
                thread::sleep(self.interval);
            }
        }

        error!(
            label,
            missing = missing.len(),
            max_attempts = self.max_attempts,
            "poll exhausted its attempts with targets still missing"
        );
        PollOutcome { found, missing }
    }
}
