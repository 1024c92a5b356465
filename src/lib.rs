pub mod config;
pub mod core;
pub mod insight;
pub mod service;

pub use crate::core::{CoreError, History, Insight, Result};
pub use crate::service::{InsightReport, InsightService};
