// Flagging statistics: running counters used for tuning the rules.
//
// The aggregator is shared by every task in a batch. Updates go through a
// single mutex so each decision lands as one atomic increment of the
// relevant counters; the lock is never held across an await.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::policy::decision::AutomaticAction;

/// Monotonic counters. Rates are derived on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggingStatistics {
    /// Items that reached a decision
    pub total_processed: u64,
    pub auto_approved: u64,
    pub auto_rejected: u64,
    pub auto_flagged: u64,
    pub sent_to_human_review: u64,
    pub pii_detected: u64,
    /// Items that failed before a decision was made. Not part of total_processed.
    pub pre_decision_failures: u64,
    /// Items whose verdict had already been executed. Not part of total_processed.
    #[serde(default)]
    pub duplicates_skipped: u64,
    /// Items decided but whose execution task died before finishing.
    /// Not part of total_processed.
    #[serde(default)]
    pub execution_failures: u64,
}

impl FlaggingStatistics {
    fn rate(&self, count: u64) -> f64 {
        if self.total_processed == 0 {
            0.0
        } else {
            count as f64 / self.total_processed as f64
        }
    }

    pub fn auto_approval_rate(&self) -> f64 {
        self.rate(self.auto_approved)
    }

    pub fn auto_rejection_rate(&self) -> f64 {
        self.rate(self.auto_rejected)
    }

    pub fn auto_flag_rate(&self) -> f64 {
        self.rate(self.auto_flagged)
    }

    pub fn human_review_rate(&self) -> f64 {
        self.rate(self.sent_to_human_review)
    }

    /// Every item seen, decided or not.
    pub fn total_seen(&self) -> u64 {
        self.total_processed
            + self.pre_decision_failures
            + self.duplicates_skipped
            + self.execution_failures
    }
}

/// Single-writer owner of the statistics.
#[derive(Default)]
pub struct StatisticsAggregator {
    stats: Mutex<FlaggingStatistics>,
}

impl StatisticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FlaggingStatistics> {
        // A panic while holding this lock can only have happened between
        // plain integer increments, so the counters are still usable.
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count one decision. `had_pii` is counted independently of the action.
    pub fn record_decision(&self, action: &AutomaticAction, had_pii: bool) {
        let mut stats = self.lock();
        stats.total_processed += 1;
        match action {
            AutomaticAction::AutoApprove => stats.auto_approved += 1,
            AutomaticAction::AutoReject { .. } => stats.auto_rejected += 1,
            AutomaticAction::AutoFlag { .. } => stats.auto_flagged += 1,
            AutomaticAction::RequireHumanReview => stats.sent_to_human_review += 1,
        }
        if had_pii {
            stats.pii_detected += 1;
        }
    }

    /// Count an item that failed before the policy ran.
    pub fn record_failure(&self) {
        self.lock().pre_decision_failures += 1;
    }

    /// Count an item whose (content, verdict) pair was already executed.
    pub fn record_duplicate(&self) {
        self.lock().duplicates_skipped += 1;
    }

    /// Count an item whose action execution aborted before it was recorded.
    pub fn record_execution_failure(&self) {
        self.lock().execution_failures += 1;
    }

    pub fn snapshot(&self) -> FlaggingStatistics {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_empty_rates_are_zero() {
        let stats = FlaggingStatistics::default();
        assert_eq!(stats.auto_approval_rate(), 0.0);
        assert_eq!(stats.human_review_rate(), 0.0);
    }

    #[test]
    fn test_record_decision_counts_each_variant() {
        let agg = StatisticsAggregator::new();
        agg.record_decision(&AutomaticAction::AutoApprove, false);
        agg.record_decision(
            &AutomaticAction::AutoReject {
                reason: "x".into(),
            },
            true,
        );
        agg.record_decision(&AutomaticAction::AutoFlag { reason: "y".into() }, false);
        agg.record_decision(&AutomaticAction::RequireHumanReview, true);

        let s = agg.snapshot();
        assert_eq!(s.total_processed, 4);
        assert_eq!(s.auto_approved, 1);
        assert_eq!(s.auto_rejected, 1);
        assert_eq!(s.auto_flagged, 1);
        assert_eq!(s.sent_to_human_review, 1);
        assert_eq!(s.pii_detected, 2);
        assert!((s.auto_approval_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failures_are_kept_apart() {
        let agg = StatisticsAggregator::new();
        agg.record_failure();
        agg.record_decision(&AutomaticAction::AutoApprove, false);

        let s = agg.snapshot();
        assert_eq!(s.total_processed, 1);
        assert_eq!(s.pre_decision_failures, 1);
        assert_eq!(s.total_seen(), 2);
        assert_eq!(s.auto_approval_rate(), 1.0);
    }

    #[test]
    fn test_skipped_and_aborted_items_are_seen_but_not_rated() {
        let agg = StatisticsAggregator::new();
        agg.record_decision(&AutomaticAction::RequireHumanReview, false);
        agg.record_duplicate();
        agg.record_duplicate();
        agg.record_execution_failure();

        let s = agg.snapshot();
        assert_eq!(s.total_processed, 1);
        assert_eq!(s.duplicates_skipped, 2);
        assert_eq!(s.execution_failures, 1);
        assert_eq!(s.total_seen(), 4);
        assert_eq!(s.human_review_rate(), 1.0);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let agg = Arc::new(StatisticsAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let agg = Arc::clone(&agg);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        agg.record_decision(&AutomaticAction::RequireHumanReview, false);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(agg.snapshot().sent_to_human_review, 8000);
    }
}
