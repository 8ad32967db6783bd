//! Security ledger: per-identity failure counts, timeouts, and hard-locks.
//!
//! Escalation is driven by the cumulative failure count since the last
//! success or reset, not by request rate:
//!
//! | failures | state           | effect                        |
//! |----------|-----------------|-------------------------------|
//! | 0        | `Clear`         |                               |
//! | 1-6      | `Warned`        | CAPTCHA required from 5       |
//! | 7-9      | `Throttled`     | 15 minute timeout per failure |
//! | 10-14    | `ThrottledLong` | 1 hour timeout per failure    |
//! | 15+      | `HardLocked`    | denied until admin reset      |
//!
//! Records live in memory only; lockouts do not survive a restart.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use tokengate_common::{SecurityRecord, SecurityState, UserId};

use crate::config::SecurityConfig;

/// Result of checking an identity before a redemption attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Timeout active, seconds remaining
    Wait(i64),
    Locked,
}

impl SecurityConfig {
    pub fn decide(&self, record: &SecurityRecord, now: i64) -> Decision {
        if record.hard_locked {
            return Decision::Locked;
        }
        match record.remaining_timeout(now) {
            Some(secs) => Decision::Wait(secs),
            None => Decision::Allow,
        }
    }

    pub fn requires_challenge(&self, record: &SecurityRecord) -> bool {
        record.failures >= self.challenge_threshold
    }

    pub fn state(&self, record: &SecurityRecord) -> SecurityState {
        match record.failures {
            _ if record.hard_locked => SecurityState::HardLocked,
            0 => SecurityState::Clear,
            n if n >= self.hard_lock_threshold => SecurityState::HardLocked,
            n if n >= self.long_throttle_threshold => SecurityState::ThrottledLong,
            n if n >= self.throttle_threshold => SecurityState::Throttled,
            _ => SecurityState::Warned,
        }
    }

    fn apply_failure(&self, record: &mut SecurityRecord, now: i64) {
        record.failures = record.failures.saturating_add(1);

        let count = record.failures;
        if count >= self.hard_lock_threshold {
            record.hard_locked = true;
        } else if count >= self.long_throttle_threshold {
            record.timeout_until = now.saturating_add(self.long_throttle_secs);
        } else if count >= self.throttle_threshold {
            record.timeout_until = now.saturating_add(self.throttle_secs);
        }
    }
}

/// Exclusive access to one identity's record.
///
/// Held by the redemption engine for the whole check -> verify -> update
/// sequence so concurrent retries by the same identity are serialized.
pub struct IdentityGuard {
    record: OwnedMutexGuard<SecurityRecord>,
    policy: SecurityConfig,
}

impl IdentityGuard {
    #[cfg(test)]
    pub fn record(&self) -> SecurityRecord {
        *self.record
    }

    pub fn check(&self, now: i64) -> Decision {
        self.policy.decide(&self.record, now)
    }

    pub fn requires_challenge(&self) -> bool {
        self.policy.requires_challenge(&self.record)
    }

    pub fn record_failure(&mut self, now: i64) -> SecurityRecord {
        self.policy.apply_failure(&mut self.record, now);
        *self.record
    }

    /// Back to `Clear`. A hard-lock is left in place; only `reset` lifts it.
    pub fn record_success(&mut self) {
        *self.record = SecurityRecord {
            hard_locked: self.record.hard_locked,
            ..Default::default()
        };
    }
}

/// In-memory ledger, constructed at startup and injected into the engine
pub struct SecurityLedger {
    policy: SecurityConfig,
    records: Mutex<HashMap<UserId, Arc<Mutex<SecurityRecord>>>>,
}

impl SecurityLedger {
    pub fn new(policy: SecurityConfig) -> Self {
        Self {
            policy,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &SecurityConfig {
        &self.policy
    }

    /// Lock `identity`'s record, creating it on first use
    pub async fn lock(&self, identity: UserId) -> IdentityGuard {
        let entry = {
            let mut records = self.records.lock().await;
            records.entry(identity).or_default().clone()
        };

        IdentityGuard {
            record: entry.lock_owned().await,
            policy: self.policy,
        }
    }

    /// Administrative override back to `Clear`, including from `HardLocked`
    pub async fn reset(&self, identity: UserId) {
        let mut guard = self.lock(identity).await;
        *guard.record = SecurityRecord::default();
        tracing::info!(identity = %identity, "Security record reset");
    }

    /// Current record without creating one
    pub async fn snapshot(&self, identity: UserId) -> SecurityRecord {
        let entry = self.records.lock().await.get(&identity).cloned();
        match entry {
            Some(entry) => *entry.lock().await,
            None => SecurityRecord::default(),
        }
    }

    /// Drop `Clear` records nobody is holding. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, entry| {
            if Arc::strong_count(entry) > 1 {
                return true;
            }
            match entry.try_lock() {
                Ok(record) => *record != SecurityRecord::default(),
                Err(_) => true,
            }
        });
        before - records.len()
    }

    /// (tracked identities, hard-locked identities)
    pub async fn counts(&self) -> (u64, u64) {
        let entries: Vec<_> = self.records.lock().await.values().cloned().collect();
        let mut locked = 0;
        for entry in &entries {
            if entry.lock().await.hard_locked {
                locked += 1;
            }
        }
        (entries.len() as u64, locked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const USER: UserId = UserId::new(7);

    fn ledger() -> SecurityLedger {
        SecurityLedger::new(SecurityConfig::default())
    }

    #[tokio::test]
    async fn test_new_identity_is_clear() {
        let ledger = ledger();
        let guard = ledger.lock(USER).await;
        assert_eq!(guard.record(), SecurityRecord::default());
        assert_eq!(guard.check(NOW), Decision::Allow);
        assert!(!guard.requires_challenge());
    }

    #[tokio::test]
    async fn test_failures_increment_by_one() {
        let ledger = ledger();
        let mut guard = ledger.lock(USER).await;
        for expected in 1..=20 {
            assert_eq!(guard.record_failure(NOW).failures, expected);
        }
    }

    #[tokio::test]
    async fn test_escalation_table() {
        let ledger = ledger();
        let policy = *ledger.policy();
        let mut guard = ledger.lock(USER).await;

        for _ in 0..6 {
            guard.record_failure(NOW);
        }
        assert_eq!(policy.state(&guard.record()), SecurityState::Warned);
        assert_eq!(guard.check(NOW), Decision::Allow);

        let record = guard.record_failure(NOW); // 7
        assert_eq!(policy.state(&record), SecurityState::Throttled);
        assert_eq!(guard.check(NOW), Decision::Wait(900));
        assert_eq!(guard.check(NOW + 900), Decision::Allow);

        guard.record_failure(NOW); // 8
        guard.record_failure(NOW); // 9
        let record = guard.record_failure(NOW); // 10
        assert_eq!(policy.state(&record), SecurityState::ThrottledLong);
        assert_eq!(guard.check(NOW + 60), Decision::Wait(3540));

        for _ in 11..15 {
            guard.record_failure(NOW);
        }
        let record = guard.record_failure(NOW); // 15
        assert!(record.hard_locked);
        assert_eq!(policy.state(&record), SecurityState::HardLocked);
        assert_eq!(guard.check(NOW + 100_000), Decision::Locked);
    }

    #[tokio::test]
    async fn test_challenge_required_from_five_without_timeout() {
        let ledger = ledger();
        let mut guard = ledger.lock(USER).await;
        for _ in 0..4 {
            guard.record_failure(NOW);
        }
        assert!(!guard.requires_challenge());

        guard.record_failure(NOW);
        assert!(guard.requires_challenge());
        assert_eq!(guard.check(NOW), Decision::Allow);

        guard.record_failure(NOW);
        assert_eq!(guard.record().failures, 6);
        assert!(guard.requires_challenge());
        assert_eq!(guard.check(NOW), Decision::Allow);
    }

    #[tokio::test]
    async fn test_hard_lock_is_sticky() {
        let ledger = ledger();
        {
            let mut guard = ledger.lock(USER).await;
            for _ in 0..15 {
                guard.record_failure(NOW);
            }
            for i in 0..10 {
                assert_eq!(guard.check(NOW + i * 10_000), Decision::Locked);
                assert!(guard.record_failure(NOW).hard_locked);
            }
            guard.record_success();
            assert!(guard.record().hard_locked);
            assert_eq!(guard.check(NOW), Decision::Locked);
        }

        ledger.reset(USER).await;
        let guard = ledger.lock(USER).await;
        assert_eq!(guard.record(), SecurityRecord::default());
        assert_eq!(guard.check(NOW), Decision::Allow);
    }

    #[tokio::test]
    async fn test_huge_timeout_saturates() {
        let ledger = SecurityLedger::new(SecurityConfig {
            throttle_secs: i64::MAX,
            ..Default::default()
        });
        let mut guard = ledger.lock(USER).await;
        for _ in 0..7 {
            guard.record_failure(NOW);
        }
        assert_eq!(guard.record().timeout_until, i64::MAX);
        assert_eq!(guard.check(NOW), Decision::Wait(i64::MAX - NOW));
    }

    #[tokio::test]
    async fn test_success_resets_count() {
        let ledger = ledger();
        let mut guard = ledger.lock(USER).await;
        for _ in 0..8 {
            guard.record_failure(NOW);
        }
        guard.record_success();
        assert_eq!(guard.record(), SecurityRecord::default());
    }

    #[tokio::test]
    async fn test_snapshot_does_not_create() {
        let ledger = ledger();
        assert_eq!(ledger.snapshot(USER).await, SecurityRecord::default());
        assert_eq!(ledger.counts().await, (0, 0));
    }

    #[tokio::test]
    async fn test_prune_keeps_records_with_failures() {
        let ledger = ledger();
        drop(ledger.lock(UserId::new(1)).await);
        ledger.lock(UserId::new(2)).await.record_failure(NOW);

        assert_eq!(ledger.prune().await, 1);
        assert_eq!(ledger.counts().await, (1, 0));
        assert_eq!(ledger.snapshot(UserId::new(2)).await.failures, 1);
    }

    #[tokio::test]
    async fn test_concurrent_failures_are_not_lost() {
        let ledger = Arc::new(ledger());
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..50 {
            let ledger = ledger.clone();
            tasks.spawn(async move {
                let mut guard = ledger.lock(USER).await;
                tokio::task::yield_now().await;
                guard.record_failure(NOW);
            });
        }
        while tasks.join_next().await.is_some() {}

        assert_eq!(ledger.snapshot(USER).await.failures, 50);
    }
}
