// Automod: automatic content moderation decisions
//
// This is the library root. Each module corresponds to a stage or a
// supporting subsystem of the moderation pipeline.

pub mod actions;
pub mod concurrency;
pub mod config;
pub mod errors;
pub mod moderation;
pub mod output;
pub mod pipeline;
pub mod policy;
pub mod queue;
pub mod stats;
pub mod store;
