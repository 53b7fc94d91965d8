//! Outstanding RQ1 requests with timeout and bounded retry.
//!
//! A DT1 whose address falls inside a pending request answers it. Requests that
//! stay unanswered past the timeout are handed back for resending until the
//! retry budget is spent, then dropped.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::address::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// How long to wait for a response before resending.
    pub timeout_ms: u64,
    /// Resends after the first attempt (0 = never resend).
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 500,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub address: Address,
    pub length: u32,
    /// Number of resends already issued.
    pub retries: u32,
    pub sent_at: Instant,
}

impl PendingRequest {
    fn covers(&self, address: Address) -> bool {
        address
            .offset_from(self.address)
            .is_some_and(|offset| offset < self.length.max(1))
    }
}

pub struct RequestTracker {
    pending: DashMap<Address, PendingRequest>,
    policy: RetryPolicy,
}

impl RequestTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            pending: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Record a request that was just sent. Re-requesting an address resets it.
    pub fn track(&self, address: Address, length: u32, now: Instant) {
        self.pending.insert(
            address,
            PendingRequest {
                address,
                length,
                retries: 0,
                sent_at: now,
            },
        );
    }

    /// Mark the request covering `address` as answered.
    ///
    /// Returns `true` when the data was solicited.
    pub fn complete(&self, address: Address) -> bool {
        let key = self
            .pending
            .iter()
            .find(|entry| entry.value().covers(address))
            .map(|entry| *entry.key());

        match key {
            Some(key) => {
                self.pending.remove(&key);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, address: Address) -> bool {
        self.pending.iter().any(|entry| entry.value().covers(address))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Requests whose timeout elapsed and that still have retries left.
    ///
    /// Returned requests are re-armed as if resent at `now`. Requests with no
    /// retries left are dropped.
    pub fn take_due(&self, now: Instant) -> Vec<PendingRequest> {
        let timeout = self.policy.timeout();
        let mut due = Vec::new();
        let mut exhausted = Vec::new();

        for mut entry in self.pending.iter_mut() {
            let request = entry.value_mut();
            if now.saturating_duration_since(request.sent_at) < timeout {
                continue;
            }
            if request.retries >= self.policy.max_retries {
                exhausted.push(request.address);
                continue;
            }
            request.retries += 1;
            request.sent_at = now;
            debug!(
                "Retrying request {} ({} bytes), attempt {}",
                request.address,
                request.length,
                request.retries + 1
            );
            due.push(*request);
        }

        for address in exhausted {
            self.pending.remove(&address);
            warn!("No response for request {}, giving up", address);
        }

        due
    }

    pub fn clear(&self) {
        self.pending.clear();
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
