// Concurrency helpers: bounded in-flight moderation calls and retries.

pub mod limiter;
pub mod retry;
