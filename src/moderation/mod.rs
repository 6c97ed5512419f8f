// Moderation verdicts: the result model and the swappable model boundary.
//
// The ModerationModel trait defines the interface. HttpModerationModel talks
// to a remote inference service; RecordedModel replays stored verdicts.

pub mod models;
pub mod recorded;
pub mod traits;

#[cfg(feature = "http")]
pub mod http;
