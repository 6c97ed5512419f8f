// Moderation model trait: the boundary to AI inference.
//
// Whatever produces the verdicts (a remote HTTP service, a local model, a
// file of recorded verdicts) sits behind this trait so the decision engine
// never knows which one it is talking to.

use async_trait::async_trait;

use super::models::{ModerationRequest, ModerationResult};
use crate::errors::ModerationError;

/// Trait for producing a moderation verdict for one submission.
///
/// Implementations report failures through the `ModerationError` taxonomy
/// so the retry policy can tell transient failures from permanent ones.
/// Callers go through the retry policy; implementations should not retry
/// on their own.
#[async_trait]
pub trait ModerationModel: Send + Sync {
    async fn moderate(&self, request: &ModerationRequest)
        -> Result<ModerationResult, ModerationError>;
}
