//! Connection supervision for instruments whose outputs start up slowly.
//!
//! Each requested connection is tried immediately, then retried with
//! exponential backoff until it is established, fails, or runs out of
//! retries. The supervisor does not wire anything itself: the caller asks
//! which connections are due, attempts them, and reports the outcome.

use std::collections::BTreeMap;
use std::time::Duration;

use dg_ir::{InsertId, InstrumentId};
use log::{info, warn};

use crate::error::ConnectionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(800),
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Pending { insert: InsertId, attempts: u32, next_try: Duration },
    Established { insert: InsertId, attempts: u32 },
    Failed(ConnectionError),
}

/// Outcome of one connection attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attempt {
    NotReady,
    Established,
    Failed(ConnectionError),
}

#[derive(Debug, Default)]
pub struct ConnectionSupervisor {
    policy: RetryPolicy,
    connections: BTreeMap<InstrumentId, ConnectionStatus>,
}

impl ConnectionSupervisor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, connections: BTreeMap::new() }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn status(&self, instrument: InstrumentId) -> Option<&ConnectionStatus> {
        self.connections.get(&instrument)
    }

    /// Ask for `instrument` to be connected to `insert`, replacing any
    /// earlier request. The first attempt is due at once.
    pub fn request(&mut self, instrument: InstrumentId, insert: InsertId, now: Duration) {
        self.connections.insert(
            instrument,
            ConnectionStatus::Pending { insert, attempts: 0, next_try: now },
        );
    }

    /// Point a pending or established connection at another insert without
    /// restarting its retry count. Returns false for unknown or failed ones.
    pub fn retarget(&mut self, instrument: InstrumentId, to: InsertId) -> bool {
        match self.connections.get_mut(&instrument) {
            Some(ConnectionStatus::Pending { insert, .. })
            | Some(ConnectionStatus::Established { insert, .. }) => {
                *insert = to;
                true
            }
            _ => false,
        }
    }

    pub fn forget(&mut self, instrument: InstrumentId) {
        self.connections.remove(&instrument);
    }

    /// Pending connections whose next attempt is due at `now`.
    pub fn due(&self, now: Duration) -> Vec<(InstrumentId, InsertId)> {
        self.connections
            .iter()
            .filter_map(|(id, status)| match status {
                ConnectionStatus::Pending { insert, next_try, .. } if *next_try <= now => {
                    Some((*id, *insert))
                }
                _ => None,
            })
            .collect()
    }

    /// Record the outcome of an attempt and return the new status.
    pub fn record(
        &mut self,
        instrument: InstrumentId,
        outcome: Attempt,
        now: Duration,
    ) -> Option<&ConnectionStatus> {
        let policy = self.policy;
        let status = self.connections.get_mut(&instrument)?;
        let ConnectionStatus::Pending { insert, attempts, .. } = *status else {
            return Some(status);
        };
        let attempts = attempts + 1;
        *status = match outcome {
            Attempt::Established => {
                info!("{instrument} connected to {insert} after {attempts} attempt(s)");
                ConnectionStatus::Established { insert, attempts }
            }
            Attempt::Failed(err) => {
                warn!("connection of {instrument} to {insert} failed: {err}");
                ConnectionStatus::Failed(err)
            }
            Attempt::NotReady if attempts > policy.max_retries => {
                let err = ConnectionError::ResourceNotReady { instrument, attempts };
                warn!("{err}");
                ConnectionStatus::Failed(err)
            }
            Attempt::NotReady => ConnectionStatus::Pending {
                insert,
                attempts,
                next_try: now + policy.backoff(attempts),
            },
        };
        Some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn backoff_doubles_up_to_cap() {
        let p = RetryPolicy::default();
        let delays: Vec<_> = (1..=6).map(|k| p.backoff(k).as_millis()).collect();
        assert_eq!(delays, [50, 100, 200, 400, 800, 800]);
        assert_eq!(p.backoff(60), p.max_backoff);
    }

    /// Drive the supervisor on a 10 ms tick against a resource that becomes
    /// ready at `ready_at`.
    fn run(ready_at: Duration, until: Duration) -> (ConnectionSupervisor, Vec<Duration>) {
        let mut sup = ConnectionSupervisor::new(RetryPolicy::default());
        let id = InstrumentId(1);
        sup.request(id, InsertId(0), Duration::ZERO);
        let mut tries = Vec::new();
        let mut now = Duration::ZERO;
        while now <= until {
            for (instrument, _) in sup.due(now) {
                tries.push(now);
                let outcome = if now >= ready_at { Attempt::Established } else { Attempt::NotReady };
                sup.record(instrument, outcome, now);
            }
            now += 10 * MS;
        }
        (sup, tries)
    }

    #[test]
    fn slow_resource_connects_within_retry_budget() {
        let (sup, tries) = run(150 * MS, 2000 * MS);
        assert_eq!(tries, [Duration::ZERO, 50 * MS, 150 * MS]);
        assert_eq!(
            sup.status(InstrumentId(1)),
            Some(&ConnectionStatus::Established { insert: InsertId(0), attempts: 3 })
        );
    }

    #[test]
    fn never_ready_resource_fails_after_retries() {
        let (sup, tries) = run(Duration::MAX, 5000 * MS);
        assert_eq!(tries.len(), 6);
        assert_eq!(
            sup.status(InstrumentId(1)),
            Some(&ConnectionStatus::Failed(ConnectionError::ResourceNotReady {
                instrument: InstrumentId(1),
                attempts: 6,
            }))
        );
        assert!(sup.due(Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn retarget_keeps_attempts() {
        let mut sup = ConnectionSupervisor::new(RetryPolicy::default());
        let id = InstrumentId(4);
        sup.request(id, InsertId(0), Duration::ZERO);
        sup.record(id, Attempt::NotReady, Duration::ZERO);
        assert!(sup.retarget(id, InsertId(7)));
        assert_eq!(
            sup.status(id),
            Some(&ConnectionStatus::Pending { insert: InsertId(7), attempts: 1, next_try: 50 * MS })
        );
        assert!(!sup.retarget(InstrumentId(9), InsertId(7)));
    }

    #[test]
    fn link_failure_is_final() {
        let mut sup = ConnectionSupervisor::new(RetryPolicy::default());
        let id = InstrumentId(2);
        sup.request(id, InsertId(1), Duration::ZERO);
        let err = ConnectionError::LinkFailed { instrument: id, reason: "gone".into() };
        sup.record(id, Attempt::Failed(err.clone()), Duration::ZERO);
        assert_eq!(sup.status(id), Some(&ConnectionStatus::Failed(err)));
        // Recording against a settled connection changes nothing.
        sup.record(id, Attempt::Established, Duration::ZERO);
        assert!(matches!(sup.status(id), Some(ConnectionStatus::Failed(_))));
    }
}
