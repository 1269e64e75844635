/// Run statistics collection and reporting
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters for one orchestrator run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutomationStats {
    pub wallets_created: usize,
    pub solana_balance: f64,
    pub r_sol_balance: f64,
    pub transactions_completed: u64,
    pub contracts_deployed: u64,
    pub bridges_completed: u64,
    pub errors: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Default for AutomationStats {
    fn default() -> Self {
        Self {
            wallets_created: 0,
            solana_balance: 0.0,
            r_sol_balance: 0.0,
            transactions_completed: 0,
            contracts_deployed: 0,
            bridges_completed: 0,
            errors: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
        }
    }
}

impl AutomationStats {
    /// Record a stage error; the run continues
    pub fn record_error(&mut self, stage: &str, message: impl std::fmt::Display) {
        self.errors.push(format!("{}: {}", stage, message));
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    pub fn duration_secs(&self) -> i64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_seconds()
    }

    /// Human readable summary printed at the end of a run
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "=== AUTOMATION SUMMARY ===".to_string(),
            format!("Wallets created: {}", self.wallets_created),
            format!("SOL balance: {:.4}", self.solana_balance),
            format!("rSOL balance: {:.4}", self.r_sol_balance),
            format!("Transactions completed: {}", self.transactions_completed),
            format!("Contracts deployed: {}", self.contracts_deployed),
            format!("Bridges completed: {}", self.bridges_completed),
            format!("Duration: {}s", self.duration_secs()),
            format!("Errors: {}", self.errors.len()),
        ];
        for (i, error) in self.errors.iter().enumerate() {
            lines.push(format!("  {}. {}", i + 1, error));
        }
        lines.join("\n")
    }
}
