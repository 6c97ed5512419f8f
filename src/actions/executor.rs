// Action executor: carries out what the decision policy decided.
//
// Per action:
//   approve       -> status approved
//   reject        -> status rejected, author notified, penalty by severity
//   flag          -> status flagged (still visible), watched for reports
//   human review  -> status untouched, queued for a moderator
//
// Every call counts exactly one decision in the statistics. The status
// transition is the primary effect and is never rolled back: if a later
// step (penalty write, notification) fails, that failure is logged and
// recorded in the outcome. Notifications are fire-and-forget on their own
// tasks with their own retries.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::concurrency::retry::{with_retry, RetryPolicy};
use crate::errors::ModerationError;
use crate::moderation::models::{ModerationResult, Severity};
use crate::policy::decision::AutomaticAction;
use crate::queue::{ModerationQueue, ModerationQueueItem};
use crate::stats::StatisticsAggregator;
use crate::store::traits::{ContentStatus, ContentStore, NotificationKind, Notifier, UserPenalty};

/// Days of temporary ban for an auto-rejected critical verdict.
pub const CRITICAL_BAN_DAYS: u32 = 7;
/// Days of temporary ban for an auto-rejected high-severity verdict.
pub const HIGH_BAN_DAYS: u32 = 3;

/// Penalty scaled by how serious the rejected content was.
pub fn penalty_for(severity: Severity) -> UserPenalty {
    match severity {
        Severity::Critical => UserPenalty::TemporaryBan {
            days: CRITICAL_BAN_DAYS,
        },
        Severity::High => UserPenalty::TemporaryBan {
            days: HIGH_BAN_DAYS,
        },
        Severity::Medium => UserPenalty::Warning,
        Severity::Low => UserPenalty::None,
    }
}

/// Report information needed to decide whether flagged content goes
/// straight to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportContext {
    pub report_count: u32,
    pub threshold: u32,
}

/// What executing one action actually did.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub content_id: String,
    pub action: AutomaticAction,
    /// Status the content was moved to; `None` for human review
    pub content_status: Option<ContentStatus>,
    /// Set when the status write failed after retries
    pub status_error: Option<ModerationError>,
    pub penalty: UserPenalty,
    pub penalty_error: Option<ModerationError>,
    pub notifications_dispatched: u32,
    /// Content is in the human review queue
    pub queued: bool,
}

impl ExecutionOutcome {
    fn new(content_id: &str, action: &AutomaticAction) -> Self {
        Self {
            content_id: content_id.to_string(),
            action: action.clone(),
            content_status: None,
            status_error: None,
            penalty: UserPenalty::None,
            penalty_error: None,
            notifications_dispatched: 0,
            queued: false,
        }
    }

    /// True when every downstream write went through.
    pub fn is_clean(&self) -> bool {
        self.status_error.is_none() && self.penalty_error.is_none()
    }
}

pub struct ActionExecutor {
    store: Arc<dyn ContentStore>,
    notifier: Arc<dyn Notifier>,
    queue: Arc<ModerationQueue>,
    stats: Arc<StatisticsAggregator>,
    retry: RetryPolicy,
    notifications: Mutex<Vec<JoinHandle<()>>>,
}

impl ActionExecutor {
    pub fn new(
        store: Arc<dyn ContentStore>,
        notifier: Arc<dyn Notifier>,
        queue: Arc<ModerationQueue>,
        stats: Arc<StatisticsAggregator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            queue,
            stats,
            retry,
            notifications: Mutex::new(Vec::new()),
        }
    }

    /// Apply `action` for one content item.
    ///
    /// Must be called once per (content, verdict); deduplication is up to the
    /// caller.
    pub async fn execute(
        &self,
        action: &AutomaticAction,
        content_id: &str,
        author_id: &str,
        result: &ModerationResult,
        reports: ReportContext,
    ) -> ExecutionOutcome {
        let mut outcome = ExecutionOutcome::new(content_id, action);

        match action {
            AutomaticAction::AutoApprove => {
                self.transition(&mut outcome, ContentStatus::Approved).await;
            }
            AutomaticAction::AutoReject { reason } => {
                self.transition(&mut outcome, ContentStatus::Rejected).await;
                self.notify(&mut outcome, author_id, NotificationKind::ContentRejected, reason);

                let penalty = penalty_for(result.severity());
                if penalty != UserPenalty::None {
                    self.apply_penalty(&mut outcome, author_id, penalty).await;
                    let message = format!("{reason} ({penalty})");
                    self.notify(&mut outcome, author_id, NotificationKind::PenaltyApplied, &message);
                }
            }
            AutomaticAction::AutoFlag { .. } => {
                self.transition(&mut outcome, ContentStatus::Flagged).await;

                let item = ModerationQueueItem::new(
                    author_id,
                    result.clone(),
                    reports.report_count,
                    reports.threshold,
                );
                if reports.report_count >= reports.threshold {
                    self.queue.enqueue(item);
                    outcome.queued = true;
                } else {
                    self.queue.watch_flagged(item);
                }
            }
            AutomaticAction::RequireHumanReview => {
                self.queue.enqueue(ModerationQueueItem::new(
                    author_id,
                    result.clone(),
                    reports.report_count,
                    reports.threshold,
                ));
                outcome.queued = true;
            }
        }

        self.stats.record_decision(action, result.has_pii());

        info!(
            content_id,
            author_id,
            action = action.label(),
            reason = action.reason().unwrap_or(""),
            penalty = %outcome.penalty,
            queued = outcome.queued,
            "Moderation action executed"
        );

        outcome
    }

    /// Wait for every notification dispatched so far to finish (or give up).
    pub async fn drain_notifications(&self) {
        let pending = {
            let mut guard = self
                .notifications
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        for handle in pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "Notification task ended abnormally");
            }
        }
    }

    async fn transition(&self, outcome: &mut ExecutionOutcome, status: ContentStatus) {
        outcome.content_status = Some(status);
        let content_id = outcome.content_id.as_str();
        let written = with_retry(&self.retry, ModerationError::is_transient, || {
            self.store.set_content_status(content_id, status)
        })
        .await;

        if let Err(e) = written {
            warn!(content_id, status = %status, error = %e, "Failed to persist content status");
            outcome.status_error = Some(e);
        }
    }

    async fn apply_penalty(&self, outcome: &mut ExecutionOutcome, author_id: &str, penalty: UserPenalty) {
        outcome.penalty = penalty;
        let applied = with_retry(&self.retry, ModerationError::is_transient, || {
            self.store.apply_user_penalty(author_id, penalty)
        })
        .await;

        if let Err(e) = applied {
            warn!(author_id, penalty = %penalty, error = %e, "Failed to apply user penalty");
            outcome.penalty_error = Some(e);
        }
    }

    /// Hand a notification to a background task and move on.
    fn notify(
        &self,
        outcome: &mut ExecutionOutcome,
        author_id: &str,
        kind: NotificationKind,
        reason: &str,
    ) {
        let notifier = Arc::clone(&self.notifier);
        let retry = self.retry.clone();
        let author_id = author_id.to_string();
        let reason = reason.to_string();

        let handle = tokio::spawn(async move {
            let delivered = with_retry(&retry, ModerationError::is_transient, || {
                notifier.notify_user(&author_id, kind, &reason)
            })
            .await;
            if let Err(e) = delivered {
                error!(author_id = %author_id, ?kind, error = %e, "Notification delivery failed");
            }
        });

        let mut pending = self
            .notifications
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
        outcome.notifications_dispatched += 1;
    }
}
