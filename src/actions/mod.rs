// Action execution: turning a decision into state changes.

pub mod executor;
