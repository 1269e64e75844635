/// Progress snapshots written between pipeline stages
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::stats::AutomationStats;
use crate::chain::wallet::WalletPair;

/// Public half of a wallet pair; keys never reach the snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletAddresses {
    pub solana: String,
    pub evm: String,
}

impl From<&WalletPair> for WalletAddresses {
    fn from(pair: &WalletPair) -> Self {
        Self {
            solana: pair.solana.public_key.clone(),
            evm: pair.evm.address.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressSnapshot {
    pub run_id: Uuid,
    pub stage: String,
    pub stats: AutomationStats,
    pub wallets: Vec<WalletAddresses>,
    pub deployed_contracts: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressSnapshot {
    /// Write to `dir/progress_<millis>_<stage>.json`
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let file = dir.join(format!(
            "progress_{}_{}.json",
            self.timestamp.timestamp_millis(),
            self.stage.to_lowercase()
        ));
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(&file, serialized)?;
        log::debug!("Progress saved to {:?}", file);
        Ok(file)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let serialized = fs::read_to_string(path)?;
        let snapshot = serde_json::from_str(&serialized)?;
        log::info!("Loaded progress from {:?}", path);
        Ok(snapshot)
    }
}
