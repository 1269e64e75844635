// Library exports for rome_automation

pub mod browser;
pub mod chain;
pub mod config;
pub mod faucet;
pub mod forms;
pub mod http;
pub mod logging;
pub mod orchestrator;
pub mod report;

// Re-export main types for convenience
pub use config::Config;
pub use orchestrator::{AutomationStats, Orchestrator, RunOptions};
