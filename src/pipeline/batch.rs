// Batch processing: many submissions through the engine at once.
//
// Every item runs as its own future: validate -> wait for a slot -> moderate
// -> decide -> execute. The futures run concurrently and the batch returns
// once all of them have finished, with exactly one result per input item.
// Failures are per item; a failing item never takes its siblings down.
//
// All items in a batch are decided against the same rules snapshot, so a
// rules update landing mid-batch takes effect from the next batch on.

use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::engine::ModerationEngine;
use crate::actions::executor::ExecutionOutcome;
use crate::errors::ModerationError;
use crate::moderation::models::{ContentType, ModerationRequest, ModerationResult};
use crate::policy::decision::AutomaticAction;

/// One submission waiting for a moderation decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBatchItem {
    pub content_id: String,
    pub content_type: ContentType,
    pub author_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    /// User reports already filed against the content
    #[serde(default)]
    pub report_count: u32,
}

impl ContentBatchItem {
    pub fn text(
        content_id: impl Into<String>,
        content_type: ContentType,
        author_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            content_type,
            author_id: author_id.into(),
            text: Some(text.into()),
            images: Vec::new(),
            report_count: 0,
        }
    }

    /// Reject submissions that can't be moderated at all.
    pub fn validate(&self) -> Result<(), ModerationError> {
        if self.content_id.trim().is_empty() {
            return Err(ModerationError::Validation("missing contentId".to_string()));
        }
        if self.author_id.trim().is_empty() {
            return Err(ModerationError::Validation(format!(
                "content {} has no authorId",
                self.content_id
            )));
        }
        let has_text = self.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        if !has_text && self.images.is_empty() {
            return Err(ModerationError::Validation(format!(
                "content {} has neither text nor images",
                self.content_id
            )));
        }
        Ok(())
    }

    pub fn to_request(&self) -> ModerationRequest {
        ModerationRequest {
            content_id: self.content_id.clone(),
            content_type: self.content_type,
            author_id: self.author_id.clone(),
            text: self.text.clone(),
            images: self.images.clone(),
        }
    }
}

/// How one item ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    /// A decision was made and carried out
    Executed(ExecutionOutcome),
    /// The same verdict for this content was already executed; nothing was done
    Duplicate(AutomaticAction),
    /// The item never reached a decision
    Failed(ModerationError),
}

/// The result for one batch item.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentProcessingResult {
    pub content_id: String,
    pub author_id: String,
    pub moderation_result: Option<ModerationResult>,
    pub outcome: ProcessingOutcome,
    pub elapsed: Duration,
}

impl ContentProcessingResult {
    pub fn action(&self) -> Option<&AutomaticAction> {
        match &self.outcome {
            ProcessingOutcome::Executed(outcome) => Some(&outcome.action),
            ProcessingOutcome::Duplicate(action) => Some(action),
            ProcessingOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ModerationError> {
        match &self.outcome {
            ProcessingOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error().is_some()
    }
}

impl ModerationEngine {
    /// Process every item concurrently and return one result per item, in
    /// input order.
    ///
    /// Dropping the returned future cancels items that haven't reached a
    /// decision yet; their slots go back to the limiter. Items that already
    /// decided finish executing.
    pub async fn process_batch(&self, items: Vec<ContentBatchItem>) -> Vec<ContentProcessingResult> {
        let rules = self.rules().snapshot();
        let total = items.len();
        info!(
            items = total,
            rules_version = rules.version,
            max_concurrent = self.limiter().capacity(),
            "Processing moderation batch"
        );

        let results: Vec<ContentProcessingResult> =
            join_all(items.into_iter().map(|item| self.run_item(item, &rules))).await;

        let failed = results.iter().filter(|r| r.is_failure()).count();
        info!(
            items = total,
            decided = total - failed,
            failed,
            "Moderation batch complete"
        );

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_content_id() {
        let item = ContentBatchItem::text("", ContentType::Post, "u1", "hello");
        assert!(matches!(item.validate(), Err(ModerationError::Validation(_))));
    }

    #[test]
    fn test_validate_requires_something_to_moderate() {
        let mut item = ContentBatchItem::text("c1", ContentType::Post, "u1", "   ");
        assert!(item.validate().is_err());

        item.images.push("https://cdn.example.com/a.png".to_string());
        assert!(item.validate().is_ok());
    }

    #[test]
    fn test_batch_item_json() {
        let json = r#"{"contentId": "c1", "contentType": "image", "authorId": "u1",
                       "images": ["https://cdn.example.com/a.png"], "reportCount": 2}"#;
        let item: ContentBatchItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.report_count, 2);
        assert_eq!(item.text, None);
        assert!(item.validate().is_ok());
    }
}
