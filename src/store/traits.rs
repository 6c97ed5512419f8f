// Store and notifier traits: the boundaries to persistence and delivery.
//
// The engine never talks to a database or a push service directly. It sees
// these async traits, which an application implements over its own storage
// and delivery stack. All failures use the ModerationError taxonomy so the
// retry policy can decide whether another attempt is worthwhile.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ModerationError;

/// Publication state of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentStatus {
    Pending,
    Approved,
    Rejected,
    /// Still publicly visible, but marked for attention
    Flagged,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Pending => "pending",
            ContentStatus::Approved => "approved",
            ContentStatus::Rejected => "rejected",
            ContentStatus::Flagged => "flagged",
        }
    }
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Penalty applied to an author whose content was auto-rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UserPenalty {
    None,
    Warning,
    TemporaryBan { days: u32 },
}

impl std::fmt::Display for UserPenalty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserPenalty::None => write!(f, "none"),
            UserPenalty::Warning => write!(f, "warning"),
            UserPenalty::TemporaryBan { days } => write!(f, "{days}-day ban"),
        }
    }
}

/// What an author is being told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    ContentRejected,
    PenaltyApplied,
}

/// Content and user persistence.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn set_content_status(
        &self,
        content_id: &str,
        status: ContentStatus,
    ) -> Result<(), ModerationError>;

    async fn get_user_reputation(&self, author_id: &str) -> Result<i64, ModerationError>;

    async fn is_new_user(&self, author_id: &str) -> Result<bool, ModerationError>;

    async fn apply_user_penalty(
        &self,
        author_id: &str,
        penalty: UserPenalty,
    ) -> Result<(), ModerationError>;
}

/// Author notifications. Delivery is at-least-once; callers don't wait on it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_user(
        &self,
        author_id: &str,
        kind: NotificationKind,
        reason: &str,
    ) -> Result<(), ModerationError>;
}
