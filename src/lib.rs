//! Inbox Monitor — email-workflow dashboard aggregation.

pub mod aggregator;
pub mod classify;
pub mod config;
pub mod error;
pub mod gmail;
pub mod model;
pub mod scheduler;
pub mod sources;
