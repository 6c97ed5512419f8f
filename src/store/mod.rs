// Persistence and delivery boundaries, plus in-memory implementations.

pub mod memory;
pub mod traits;
