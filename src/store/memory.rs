// In-memory ContentStore and Notifier implementations.
//
// Used by `automod replay` and by tests. State sits behind tokio Mutexes;
// each method locks, does its work and returns without awaiting anything
// else while the lock is held.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use super::traits::{ContentStatus, ContentStore, NotificationKind, Notifier, UserPenalty};
use crate::errors::ModerationError;
use crate::policy::decision::AuthorContext;

/// A known author, as seeded into the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorRecord {
    pub author_id: String,
    pub reputation: i64,
    #[serde(default)]
    pub is_new_user: bool,
}

pub struct InMemoryStore {
    statuses: Mutex<HashMap<String, ContentStatus>>,
    authors: Mutex<HashMap<String, AuthorContext>>,
    penalties: Mutex<Vec<(String, UserPenalty)>>,
    /// Context used for authors nobody seeded
    default_author: AuthorContext,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_default_author(AuthorContext {
            reputation: 100,
            is_new_user: false,
        })
    }

    pub fn with_default_author(default_author: AuthorContext) -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            authors: Mutex::new(HashMap::new()),
            penalties: Mutex::new(Vec::new()),
            default_author,
        }
    }

    pub async fn add_author(&self, record: AuthorRecord) {
        self.authors.lock().await.insert(
            record.author_id,
            AuthorContext {
                reputation: record.reputation,
                is_new_user: record.is_new_user,
            },
        );
    }

    pub async fn status_of(&self, content_id: &str) -> Option<ContentStatus> {
        self.statuses.lock().await.get(content_id).copied()
    }

    pub async fn penalties(&self) -> Vec<(String, UserPenalty)> {
        self.penalties.lock().await.clone()
    }

    async fn author(&self, author_id: &str) -> AuthorContext {
        self.authors
            .lock()
            .await
            .get(author_id)
            .copied()
            .unwrap_or(self.default_author)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn set_content_status(
        &self,
        content_id: &str,
        status: ContentStatus,
    ) -> Result<(), ModerationError> {
        self.statuses
            .lock()
            .await
            .insert(content_id.to_string(), status);
        Ok(())
    }

    async fn get_user_reputation(&self, author_id: &str) -> Result<i64, ModerationError> {
        Ok(self.author(author_id).await.reputation)
    }

    async fn is_new_user(&self, author_id: &str) -> Result<bool, ModerationError> {
        Ok(self.author(author_id).await.is_new_user)
    }

    async fn apply_user_penalty(
        &self,
        author_id: &str,
        penalty: UserPenalty,
    ) -> Result<(), ModerationError> {
        self.penalties
            .lock()
            .await
            .push((author_id.to_string(), penalty));
        Ok(())
    }
}

/// A notification as it was handed to a notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub author_id: String,
    pub kind: NotificationKind,
    pub reason: String,
}

/// Notifier that keeps everything it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_user(
        &self,
        author_id: &str,
        kind: NotificationKind,
        reason: &str,
    ) -> Result<(), ModerationError> {
        self.sent.lock().await.push(SentNotification {
            author_id: author_id.to_string(),
            kind,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

/// Notifier that only writes to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_user(
        &self,
        author_id: &str,
        kind: NotificationKind,
        reason: &str,
    ) -> Result<(), ModerationError> {
        info!(author_id, ?kind, reason, "Notification");
        Ok(())
    }
}
