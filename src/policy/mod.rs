// Decision policy: configurable rules and the pure decision function.

pub mod decision;
pub mod rules;
