//! Completion tracking for staged coordination
//!
//! A coordinator sends a batch of commands and then waits until every one
//! of them has been acknowledged, or until a deadline passes. Late or
//! missing acknowledgements never block the caller past the deadline.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Result of waiting on a batch of command ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub acknowledged: usize,
    pub missing: Vec<String>,
    pub timed_out: bool,
}

#[derive(Default)]
struct Tracked {
    /// Ids someone is (or is about to be) waiting on
    expected: HashSet<String>,
    /// Subset of `expected` that has been acknowledged
    acknowledged: HashSet<String>,
}

/// Counting barrier keyed on command ids
///
/// Ids must be registered with `expect` before the command goes out.
/// Acknowledgements for anything else are ignored, so nothing is retained
/// once the matching `wait_for` returns.
#[derive(Default)]
pub struct CompletionTracker {
    tracked: Mutex<Tracked>,
    signal: Notify,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `command_id` ahead of sending it
    pub fn expect(&self, command_id: &str) {
        self.lock().expected.insert(command_id.to_string());
    }

    /// Mark `command_id` as done and wake any waiter. Returns false, and
    /// records nothing, when the id is not expected.
    pub fn acknowledge(&self, command_id: &str) -> bool {
        let mut tracked = self.lock();
        if !tracked.expected.contains(command_id) {
            return false;
        }
        tracked.acknowledged.insert(command_id.to_string());
        drop(tracked);
        self.signal.notify_waiters();
        true
    }

    pub fn is_acknowledged(&self, command_id: &str) -> bool {
        self.lock().acknowledged.contains(command_id)
    }

    /// Number of ids currently held, expected or acknowledged
    pub fn tracked(&self) -> usize {
        self.lock().expected.len()
    }

    /// Stop tracking `command_ids`. Later acknowledgements for them are
    /// ignored.
    pub fn forget(&self, command_ids: &[String]) {
        let mut tracked = self.lock();
        for id in command_ids {
            tracked.expected.remove(id);
            tracked.acknowledged.remove(id);
        }
    }

    /// Wait until all `command_ids` are acknowledged or `timeout` elapses.
    /// The ids are forgotten afterwards either way.
    pub async fn wait_for(&self, command_ids: &[String], timeout: Duration) -> Completion {
        let deadline = Instant::now() + timeout;

        let timed_out = loop {
            // Register interest before checking so an ack landing in
            // between still wakes us.
            let notified = self.signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.missing(command_ids).is_empty() {
                break false;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break !self.missing(command_ids).is_empty();
            }
        };

        let missing = self.missing(command_ids);
        self.forget(command_ids);

        Completion {
            acknowledged: command_ids.len() - missing.len(),
            missing,
            timed_out,
        }
    }

    fn missing(&self, command_ids: &[String]) -> Vec<String> {
        let tracked = self.lock();
        command_ids
            .iter()
            .filter(|id| !tracked.acknowledged.contains(id.as_str()))
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tracked> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_already_acknowledged_returns_immediately() {
        let tracker = CompletionTracker::new();
        tracker.expect("a");
        tracker.expect("b");
        assert!(tracker.acknowledge("a"));
        assert!(tracker.acknowledge("b"));

        let done = tracker.wait_for(&ids(&["a", "b"]), Duration::from_secs(5)).await;
        assert_eq!(done.acknowledged, 2);
        assert!(!done.timed_out);
        assert!(!tracker.is_acknowledged("a"));
        assert_eq!(tracker.tracked(), 0);
    }

    #[tokio::test]
    async fn test_waits_for_late_acknowledgement() {
        let tracker = Arc::new(CompletionTracker::new());
        tracker.expect("x");
        tracker.expect("y");
        let acker = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                tracker.acknowledge("x");
                tokio::time::sleep(Duration::from_millis(20)).await;
                tracker.acknowledge("y");
            })
        };

        let done = tracker.wait_for(&ids(&["x", "y"]), Duration::from_secs(5)).await;
        acker.await.unwrap();
        assert_eq!(done, Completion { acknowledged: 2, missing: vec![], timed_out: false });
    }

    #[tokio::test]
    async fn test_times_out_with_missing_ids() {
        let tracker = CompletionTracker::new();
        tracker.expect("present");
        tracker.expect("absent");
        tracker.acknowledge("present");

        let done = tracker
            .wait_for(&ids(&["present", "absent"]), Duration::from_millis(30))
            .await;
        assert!(done.timed_out);
        assert_eq!(done.acknowledged, 1);
        assert_eq!(done.missing, vec!["absent".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_batch_is_complete() {
        let tracker = CompletionTracker::new();
        let done = tracker.wait_for(&[], Duration::from_millis(1)).await;
        assert!(!done.timed_out);
        assert_eq!(done.acknowledged, 0);
    }

    #[test]
    fn test_unexpected_ack_is_ignored() {
        let tracker = CompletionTracker::new();
        assert!(!tracker.acknowledge("stray"));
        assert!(!tracker.is_acknowledged("stray"));
        assert_eq!(tracker.tracked(), 0);
    }

    #[tokio::test]
    async fn test_late_acks_are_not_retained() {
        let tracker = CompletionTracker::new();
        for round in 0..200 {
            let id = format!("cmd-{round}");
            tracker.expect(&id);
            let done = tracker.wait_for(&[id.clone()], Duration::ZERO).await;
            assert!(done.timed_out);
            assert!(!tracker.acknowledge(&id));
        }
        assert_eq!(tracker.tracked(), 0);
    }
}
