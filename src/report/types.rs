use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletRow {
    pub index: usize,
    pub solana_address: String,
    pub evm_address: String,
    pub sol_balance: f64,
    pub evm_balance: String,
    pub r_sol_balance: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionRow {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub hash: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractRow {
    pub address: String,
    pub deployer: String,
    pub hash: String,
    pub deployed_at: DateTime<Utc>,
    pub interactions: u64,
}

/// One line of the per-kind activity breakdown
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KindShare {
    pub kind: String,
    pub count: usize,
    pub percentage: f64,
}

/// Derived view over recorded transactions and contracts
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityBreakdown {
    pub total: usize,
    pub by_kind: Vec<KindShare>,
    /// Transactions sent per wallet address, sorted by address
    pub per_wallet: Vec<(String, usize)>,
    /// Recorded interactions per contract address, sorted by address
    pub per_contract: Vec<(String, u64)>,
}
