//! Engage Booster: event registration with a scheduled, personalized
//! notification workflow.

pub mod api;
pub mod channels;
pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod llm;
pub mod store;
pub mod users;
pub mod workflow;
