// Moderation pipeline: single submissions and concurrent batches.

pub mod batch;
pub mod engine;
