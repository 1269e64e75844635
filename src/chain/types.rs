use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one logical send (all failover attempts included)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionResult {
    pub hash: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TransactionResult {
    pub fn succeeded(hash: String, gas_used: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            hash,
            success: true,
            gas_used: Some(gas_used),
            error: None,
            timestamp,
        }
    }

    pub fn failed(error: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            hash: String::new(),
            success: false,
            gas_used: None,
            error: Some(error.into()),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractDeployResult {
    pub address: String,
    pub hash: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BridgeResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solana_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evm_hash: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r_sol_balance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BridgeResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
