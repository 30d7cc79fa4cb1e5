//! API handlers module

pub mod health;
pub mod metrics;
pub mod search;
