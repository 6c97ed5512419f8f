// Human review queue: content the engine would not decide on its own.
//
// Items come in two ways: the policy returned RequireHumanReview, or
// auto-flagged content collected enough user reports. Moderators take the
// most urgent item first: lowest priority rank (critical = 0), then oldest.
//
// Flagged content that hasn't crossed the reports threshold yet is kept in
// a separate watch list so later reports can escalate it. The watch list
// is capped; past the cap the oldest watched item is dropped and stays
// flagged without a path to escalation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::moderation::models::{ContentType, ModerationResult, Severity};

/// Default cap on flagged items watched for reports.
pub const DEFAULT_WATCH_CAPACITY: usize = 10_000;

/// Review urgency. Ordering puts critical first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueuePriority {
    Critical,
    High,
    Medium,
    Low,
}

impl QueuePriority {
    /// Numeric sort key: critical 0 through low 3.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Priority for a verdict: its severity, raised one level once the
    /// content has collected `reports_threshold` reports.
    pub fn compute(severity: Severity, report_count: u32, reports_threshold: u32) -> Self {
        let base = match severity {
            Severity::Critical => QueuePriority::Critical,
            Severity::High => QueuePriority::High,
            Severity::Medium => QueuePriority::Medium,
            Severity::Low => QueuePriority::Low,
        };
        if reports_threshold > 0 && report_count >= reports_threshold {
            base.raised()
        } else {
            base
        }
    }

    fn raised(self) -> Self {
        match self {
            QueuePriority::Low => QueuePriority::Medium,
            QueuePriority::Medium => QueuePriority::High,
            QueuePriority::High | QueuePriority::Critical => QueuePriority::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueuePriority::Critical => "critical",
            QueuePriority::High => "high",
            QueuePriority::Medium => "medium",
            QueuePriority::Low => "low",
        }
    }
}

impl std::fmt::Display for QueuePriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A content item waiting for a moderator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationQueueItem {
    pub id: Uuid,
    pub content_id: String,
    pub content_type: ContentType,
    pub author_id: String,
    pub moderation_result: ModerationResult,
    pub report_count: u32,
    pub priority: QueuePriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModerationQueueItem {
    pub fn new(
        author_id: &str,
        result: ModerationResult,
        report_count: u32,
        reports_threshold: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content_id: result.content_id.clone(),
            content_type: result.content_type,
            author_id: author_id.to_string(),
            priority: QueuePriority::compute(result.severity(), report_count, reports_threshold),
            moderation_result: result,
            report_count,
            created_at: now,
            updated_at: now,
        }
    }

    /// Either signal on its own is enough: a high queue priority, or a
    /// severe verdict.
    pub fn is_high_priority(&self) -> bool {
        matches!(self.priority, QueuePriority::High | QueuePriority::Critical)
            || self.moderation_result.severity().is_severe()
    }

    fn order_key(&self) -> OrderKey {
        (self.priority, self.created_at, self.id)
    }
}

type OrderKey = (QueuePriority, DateTime<Utc>, Uuid);

#[derive(Default)]
struct QueueState {
    items: HashMap<String, ModerationQueueItem>,
    order: BTreeMap<OrderKey, String>,
    /// Flagged content below the reports threshold
    watched: HashMap<String, ModerationQueueItem>,
}

impl QueueState {
    fn insert(&mut self, item: ModerationQueueItem) {
        self.order.insert(item.order_key(), item.content_id.clone());
        self.items.insert(item.content_id.clone(), item);
    }

    fn take(&mut self, content_id: &str) -> Option<ModerationQueueItem> {
        let item = self.items.remove(content_id)?;
        self.order.remove(&item.order_key());
        Some(item)
    }
}

/// Priority-ordered review queue, safe to share between tasks.
pub struct ModerationQueue {
    state: Mutex<QueueState>,
    watch_capacity: usize,
}

impl Default for ModerationQueue {
    fn default() -> Self {
        Self::with_watch_capacity(DEFAULT_WATCH_CAPACITY)
    }
}

impl ModerationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue that watches at most `watch_capacity` flagged items (min 1).
    pub fn with_watch_capacity(watch_capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            watch_capacity: watch_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert an item, or refresh the existing entry for the same content.
    ///
    /// A refresh keeps the original id and `created_at` (so the item keeps
    /// its place among equals), takes the new verdict and priority, and keeps
    /// the larger report count.
    pub fn enqueue(&self, item: ModerationQueueItem) -> ModerationQueueItem {
        let mut state = self.lock();
        state.watched.remove(&item.content_id);

        let stored = match state.take(&item.content_id) {
            Some(existing) => ModerationQueueItem {
                id: existing.id,
                created_at: existing.created_at,
                report_count: existing.report_count.max(item.report_count),
                updated_at: Utc::now(),
                ..item
            },
            None => item,
        };

        debug!(
            content_id = %stored.content_id,
            priority = %stored.priority,
            "Queued for human review"
        );
        state.insert(stored.clone());
        stored
    }

    /// Hand the most urgent item to a moderator, removing it from the queue.
    pub fn dequeue_next_for_review(&self) -> Option<ModerationQueueItem> {
        let mut state = self.lock();
        let content_id = state.order.values().next()?.clone();
        state.take(&content_id)
    }

    /// Content worth sending back through the model: queued items that
    /// aren't high priority, stalest verdict first.
    pub fn re_evaluation_candidates(&self, limit: usize) -> Vec<String> {
        let state = self.lock();
        let mut candidates: Vec<&ModerationQueueItem> = state
            .items
            .values()
            .filter(|item| !item.is_high_priority())
            .collect();
        candidates.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates
            .into_iter()
            .take(limit)
            .map(|item| item.content_id.clone())
            .collect()
    }

    /// Every queued item in review order.
    pub fn peek_all(&self) -> Vec<ModerationQueueItem> {
        let state = self.lock();
        state
            .order
            .values()
            .filter_map(|content_id| state.items.get(content_id).cloned())
            .collect()
    }

    /// Drop an item a moderator resolved outside the queue.
    pub fn remove(&self, content_id: &str) -> Option<ModerationQueueItem> {
        let mut state = self.lock();
        state.watched.remove(content_id);
        state.take(content_id)
    }

    pub fn contains(&self, content_id: &str) -> bool {
        self.lock().items.contains_key(content_id)
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remember flagged content so later reports can escalate it.
    ///
    /// When the watch list is full the oldest watched item is dropped.
    pub fn watch_flagged(&self, item: ModerationQueueItem) {
        let mut state = self.lock();
        if state.items.contains_key(&item.content_id) {
            return;
        }
        state.watched.insert(item.content_id.clone(), item);

        while state.watched.len() > self.watch_capacity {
            let oldest = state
                .watched
                .values()
                .min_by_key(|watched| (watched.created_at, watched.id))
                .map(|watched| watched.content_id.clone());
            let Some(oldest) = oldest else { break };
            state.watched.remove(&oldest);
            debug!(content_id = %oldest, "Watch list full, dropped oldest flagged item");
        }
    }

    pub fn is_watched(&self, content_id: &str) -> bool {
        self.lock().watched.contains_key(content_id)
    }

    /// Number of flagged items waiting on reports.
    pub fn watched_len(&self) -> usize {
        self.lock().watched.len()
    }

    /// Count one user report against a content item.
    ///
    /// Queued items get their report count and priority bumped. Watched
    /// flagged content moves into the queue once it reaches
    /// `reports_threshold`. Returns the queued item when the content is (now)
    /// in the queue, `None` otherwise.
    pub fn record_report(
        &self,
        content_id: &str,
        reports_threshold: u32,
    ) -> Option<ModerationQueueItem> {
        let mut state = self.lock();

        if let Some(mut item) = state.take(content_id) {
            item.report_count += 1;
            item.priority = QueuePriority::compute(
                item.moderation_result.severity(),
                item.report_count,
                reports_threshold,
            );
            item.updated_at = Utc::now();
            state.insert(item.clone());
            return Some(item);
        }

        let watched = state.watched.get_mut(content_id)?;
        watched.report_count += 1;
        if watched.report_count < reports_threshold {
            return None;
        }

        let mut item = state.watched.remove(content_id)?;
        item.priority = QueuePriority::compute(
            item.moderation_result.severity(),
            item.report_count,
            reports_threshold,
        );
        item.updated_at = Utc::now();
        info!(
            content_id,
            reports = item.report_count,
            priority = %item.priority,
            "Flagged content crossed the reports threshold, queued for review"
        );
        state.insert(item.clone());
        Some(item)
    }
}
