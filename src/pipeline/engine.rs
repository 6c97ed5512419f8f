// Moderation engine: wires the pipeline stages together for one item.
//
//   1. validate the submission (fail fast, no retry)
//   2. wait for a concurrency slot
//   3. call the moderation model (timeout + retry on transient errors)
//   4. fetch the author's context (retry on transient errors)
//   5. decide, against one rules snapshot
//   6. execute, at most once per (content, verdict)
//
// Stages run strictly in order for a given item. Everything before step 6
// can be cancelled freely: nothing has been recorded yet and the slot is
// returned when the permit drops. Step 6 runs on its own task, so once a
// decision exists it is carried out in full even if the caller goes away.
//
// Dedup state keeps only the latest verdict fingerprint per content id and
// forgets the oldest content ids past a fixed capacity.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use super::batch::{ContentBatchItem, ContentProcessingResult, ProcessingOutcome};
use crate::actions::executor::{ActionExecutor, ReportContext};
use crate::concurrency::limiter::ConcurrencyLimiter;
use crate::concurrency::retry::{with_retry, RetryPolicy};
use crate::errors::ModerationError;
use crate::moderation::models::{ModerationRequest, ModerationResult};
use crate::moderation::traits::ModerationModel;
use crate::policy::decision::{decide, AuthorContext};
use crate::policy::rules::{FlaggingRules, RulesHandle};
use crate::queue::{ModerationQueue, ModerationQueueItem, DEFAULT_WATCH_CAPACITY};
use crate::stats::{FlaggingStatistics, StatisticsAggregator};
use crate::store::traits::{ContentStore, Notifier};

/// Default timeout for a single moderation model call.
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of content ids remembered for deduplication.
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Tunables for the engine, normally filled from `Config`.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
    pub model_timeout: Duration,
    /// Content ids remembered for deduplication
    pub dedup_capacity: usize,
    /// Flagged items watched for reports
    pub watch_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent: crate::concurrency::limiter::DEFAULT_CAPACITY,
            retry: RetryPolicy::default(),
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            watch_capacity: DEFAULT_WATCH_CAPACITY,
        }
    }
}

/// Latest executed verdict per content id, oldest ids forgotten first.
struct ExecutedVerdicts {
    latest: HashMap<String, u64>,
    order: VecDeque<String>,
    capacity: usize,
}

impl ExecutedVerdicts {
    fn new(capacity: usize) -> Self {
        Self {
            latest: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Claim the (content, verdict) pair. False if it is the verdict last
    /// executed for this content.
    fn claim(&mut self, content_id: &str, fingerprint: u64) -> bool {
        if let Some(previous) = self.latest.get_mut(content_id) {
            if *previous == fingerprint {
                return false;
            }
            *previous = fingerprint;
            return true;
        }

        self.latest.insert(content_id.to_string(), fingerprint);
        self.order.push_back(content_id.to_string());
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.latest.remove(&evicted);
            }
        }
        true
    }

    fn len(&self) -> usize {
        self.latest.len()
    }
}

/// The automatic moderation engine. Explicitly constructed; owns its
/// statistics, queue and dedup state.
pub struct ModerationEngine {
    model: Arc<dyn ModerationModel>,
    store: Arc<dyn ContentStore>,
    rules: Arc<RulesHandle>,
    executor: Arc<ActionExecutor>,
    queue: Arc<ModerationQueue>,
    stats: Arc<StatisticsAggregator>,
    limiter: ConcurrencyLimiter,
    retry: RetryPolicy,
    model_timeout: Duration,
    executed: Mutex<ExecutedVerdicts>,
}

impl ModerationEngine {
    pub fn new(
        model: Arc<dyn ModerationModel>,
        store: Arc<dyn ContentStore>,
        notifier: Arc<dyn Notifier>,
        rules: Arc<RulesHandle>,
        settings: EngineSettings,
    ) -> Self {
        let queue = Arc::new(ModerationQueue::with_watch_capacity(settings.watch_capacity));
        let stats = Arc::new(StatisticsAggregator::new());
        let executor = Arc::new(ActionExecutor::new(
            Arc::clone(&store),
            notifier,
            Arc::clone(&queue),
            Arc::clone(&stats),
            settings.retry.clone(),
        ));

        Self {
            model,
            store,
            rules,
            executor,
            queue,
            stats,
            limiter: ConcurrencyLimiter::new(settings.max_concurrent),
            retry: settings.retry,
            model_timeout: settings.model_timeout,
            executed: Mutex::new(ExecutedVerdicts::new(settings.dedup_capacity)),
        }
    }

    pub fn rules(&self) -> &RulesHandle {
        &self.rules
    }

    pub fn queue(&self) -> &ModerationQueue {
        &self.queue
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn statistics(&self) -> FlaggingStatistics {
        self.stats.snapshot()
    }

    /// Content ids currently remembered for deduplication.
    pub fn dedup_len(&self) -> usize {
        self.lock_executed().len()
    }

    /// Run one submission through the pipeline with the current rules.
    pub async fn process_item(&self, item: ContentBatchItem) -> ContentProcessingResult {
        let rules = self.rules.snapshot();
        self.run_item(item, &rules).await
    }

    /// Record a user report. Flagged content is escalated to the review
    /// queue once it reaches the reports threshold of the active rules.
    pub fn report_content(&self, content_id: &str) -> Option<ModerationQueueItem> {
        let threshold = self.rules.snapshot().multiple_reports_threshold;
        self.queue.record_report(content_id, threshold)
    }

    /// Refuse new work and wait for outstanding notifications.
    pub async fn shutdown(&self) {
        self.limiter.close();
        self.executor.drain_notifications().await;
    }

    /// Wait for outstanding notifications without shutting down.
    pub async fn flush_notifications(&self) {
        self.executor.drain_notifications().await;
    }

    pub(crate) async fn run_item(
        &self,
        item: ContentBatchItem,
        rules: &Arc<FlaggingRules>,
    ) -> ContentProcessingResult {
        let started = Instant::now();

        if let Err(e) = item.validate() {
            return self.fail(item, None, e, started);
        }

        let permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => return self.fail(item, None, e, started),
        };

        let request = item.to_request();
        let verdict = with_retry(&self.retry, ModerationError::is_transient, || {
            self.moderate(&request)
        })
        .await;
        let result = match verdict {
            Ok(result) => result,
            Err(e) => return self.fail(item, None, e, started),
        };

        let author = match with_retry(&self.retry, ModerationError::is_transient, || {
            self.author_context(&item.author_id)
        })
        .await
        {
            Ok(author) => author,
            Err(e) => return self.fail(item, Some(result), e, started),
        };

        let action = decide(&result, &author, rules);
        debug!(
            content_id = %item.content_id,
            action = %action,
            confidence = result.confidence,
            severity = %result.severity(),
            reputation = author.reputation,
            new_user = author.is_new_user,
            "Decision made"
        );

        if !self.mark_executed(&item.content_id, result.fingerprint()) {
            debug!(content_id = %item.content_id, "Verdict already executed, skipping");
            self.stats.record_duplicate();
            permit.release();
            return ContentProcessingResult {
                content_id: item.content_id,
                author_id: item.author_id,
                moderation_result: Some(result),
                outcome: ProcessingOutcome::Duplicate(action),
                elapsed: started.elapsed(),
            };
        }

        let reports = ReportContext {
            report_count: item.report_count,
            threshold: rules.multiple_reports_threshold,
        };
        let execution = {
            let executor = Arc::clone(&self.executor);
            let content_id = item.content_id.clone();
            let author_id = item.author_id.clone();
            let result = result.clone();
            tokio::spawn(async move {
                executor
                    .execute(&action, &content_id, &author_id, &result, reports)
                    .await
            })
        };

        let outcome = match execution.await {
            Ok(outcome) => ProcessingOutcome::Executed(outcome),
            Err(e) => {
                error!(content_id = %item.content_id, error = %e, "Action execution task failed");
                self.stats.record_execution_failure();
                ProcessingOutcome::Failed(ModerationError::Internal(e.to_string()))
            }
        };
        permit.release();

        ContentProcessingResult {
            content_id: item.content_id,
            author_id: item.author_id,
            moderation_result: Some(result),
            outcome,
            elapsed: started.elapsed(),
        }
    }

    /// One model call, bounded by the configured timeout.
    async fn moderate(&self, request: &ModerationRequest) -> Result<ModerationResult, ModerationError> {
        let result = tokio::time::timeout(self.model_timeout, self.model.moderate(request))
            .await
            .map_err(|_| ModerationError::Timeout(self.model_timeout))??;

        if result.content_id != request.content_id {
            return Err(ModerationError::MalformedPayload(format!(
                "verdict is for {} but {} was submitted",
                result.content_id, request.content_id
            )));
        }
        result.validate()?;
        Ok(result)
    }

    async fn author_context(&self, author_id: &str) -> Result<AuthorContext, ModerationError> {
        let (reputation, is_new_user) = tokio::try_join!(
            self.store.get_user_reputation(author_id),
            self.store.is_new_user(author_id),
        )?;
        Ok(AuthorContext {
            reputation,
            is_new_user,
        })
    }

    fn lock_executed(&self) -> MutexGuard<'_, ExecutedVerdicts> {
        self.executed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the (content, verdict) pair. False if someone already did.
    fn mark_executed(&self, content_id: &str, fingerprint: u64) -> bool {
        self.lock_executed().claim(content_id, fingerprint)
    }

    fn fail(
        &self,
        item: ContentBatchItem,
        moderation_result: Option<ModerationResult>,
        error: ModerationError,
        started: Instant,
    ) -> ContentProcessingResult {
        self.stats.record_failure();
        warn!(
            content_id = %item.content_id,
            kind = error.kind(),
            error = %error,
            "Content item failed before a decision"
        );
        ContentProcessingResult {
            content_id: item.content_id,
            author_id: item.author_id,
            moderation_result,
            outcome: ProcessingOutcome::Failed(error),
            elapsed: started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_verdict_is_claimed_once() {
        let mut executed = ExecutedVerdicts::new(4);
        assert!(executed.claim("c1", 7));
        assert!(!executed.claim("c1", 7));
    }

    #[test]
    fn test_new_verdict_replaces_the_old_one() {
        let mut executed = ExecutedVerdicts::new(4);
        assert!(executed.claim("c1", 7));
        assert!(executed.claim("c1", 8));
        assert!(!executed.claim("c1", 8));
        assert_eq!(executed.len(), 1);
    }

    #[test]
    fn test_capacity_forgets_oldest_content() {
        let mut executed = ExecutedVerdicts::new(3);
        for n in 0..100u64 {
            assert!(executed.claim(&format!("c{n}"), n));
            assert!(executed.len() <= 3);
        }
        assert_eq!(executed.order.len(), 3);
        // c0 was forgotten, so its verdict counts as new again
        assert!(executed.claim("c0", 0));
        assert!(!executed.claim("c99", 99));
    }
}
