// Recorded moderation model: replays verdicts captured earlier.
//
// Used by `automod replay` to run a set of stored verdicts through the full
// decision engine, e.g. to see what a new rule set would have done.

use std::collections::HashMap;

use async_trait::async_trait;

use super::models::{ModerationRequest, ModerationResult};
use super::traits::ModerationModel;
use crate::errors::ModerationError;

pub struct RecordedModel {
    verdicts: HashMap<String, ModerationResult>,
}

impl RecordedModel {
    /// Index verdicts by content id. Later duplicates replace earlier ones.
    pub fn new(verdicts: impl IntoIterator<Item = ModerationResult>) -> Self {
        Self {
            verdicts: verdicts
                .into_iter()
                .map(|v| (v.content_id.clone(), v))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }
}

#[async_trait]
impl ModerationModel for RecordedModel {
    async fn moderate(
        &self,
        request: &ModerationRequest,
    ) -> Result<ModerationResult, ModerationError> {
        let verdict = self.verdicts.get(&request.content_id).ok_or_else(|| {
            ModerationError::Rejected {
                status: 404,
                message: format!("no recorded verdict for {}", request.content_id),
            }
        })?;
        verdict.validate()?;
        Ok(verdict.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::models::{ContentType, ModerationFlag};

    fn request(id: &str) -> ModerationRequest {
        ModerationRequest {
            content_id: id.to_string(),
            content_type: ContentType::Comment,
            author_id: "u1".to_string(),
            text: Some("hello".to_string()),
            images: vec![],
        }
    }

    #[tokio::test]
    async fn test_replays_known_verdict() {
        let model = RecordedModel::new(vec![ModerationResult::new(
            "c1",
            ContentType::Comment,
            [ModerationFlag::Spam],
            0.8,
            vec![],
        )]);
        let result = model.moderate(&request("c1")).await.unwrap();
        assert!(result.has_flag(ModerationFlag::Spam));
    }

    #[tokio::test]
    async fn test_unknown_content_is_not_retryable() {
        let model = RecordedModel::new(vec![]);
        let err = model.moderate(&request("missing")).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
