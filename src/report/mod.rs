/// Spreadsheet Recorder - collects run rows in memory and writes an xlsx workbook
use anyhow::Result;
use chrono::Utc;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

mod types;
pub use types::{ActivityBreakdown, ContractRow, KindShare, TransactionRow, WalletRow};

use crate::chain::WalletPair;
use crate::orchestrator::AutomationStats;

pub struct SpreadsheetRecorder {
    path: PathBuf,
    enabled: bool,
    wallets: Vec<WalletRow>,
    transactions: Vec<TransactionRow>,
    contracts: Vec<ContractRow>,
    stats: AutomationStats,
}

impl SpreadsheetRecorder {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
            wallets: Vec::new(),
            transactions: Vec::new(),
            contracts: Vec::new(),
            stats: AutomationStats::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_wallet(&mut self, index: usize, pair: &WalletPair) {
        self.wallets.push(WalletRow {
            index,
            solana_address: pair.solana.public_key.clone(),
            evm_address: pair.evm.address.clone(),
            sol_balance: 0.0,
            evm_balance: "0".to_string(),
            r_sol_balance: 0.0,
            created_at: Utc::now(),
        });
    }

    /// Update balances for the wallet matching either address
    pub fn update_wallet_balance(&mut self, address: &str, sol_balance: f64, evm_balance: &str) {
        if let Some(row) = self
            .wallets
            .iter_mut()
            .find(|w| w.evm_address == address || w.solana_address == address)
        {
            row.sol_balance = sol_balance;
            row.evm_balance = evm_balance.to_string();
        }
    }

    /// Only the SOL column; the EVM balance is left as it was
    pub fn update_sol_balance(&mut self, address: &str, sol_balance: f64) {
        if let Some(row) = self
            .wallets
            .iter_mut()
            .find(|w| w.evm_address == address || w.solana_address == address)
        {
            row.sol_balance = sol_balance;
        }
    }

    pub fn update_r_sol_balance(&mut self, address: &str, r_sol_balance: f64) {
        if let Some(row) = self
            .wallets
            .iter_mut()
            .find(|w| w.evm_address == address || w.solana_address == address)
        {
            row.r_sol_balance = r_sol_balance;
        }
    }

    pub fn add_transaction(&mut self, row: TransactionRow) {
        debug!("Recorded {} transaction {}", row.kind, row.hash);
        self.transactions.push(row);
    }

    pub fn add_contract(&mut self, address: &str, deployer: &str, hash: &str) {
        self.contracts.push(ContractRow {
            address: address.to_string(),
            deployer: deployer.to_string(),
            hash: hash.to_string(),
            deployed_at: Utc::now(),
            interactions: 0,
        });
    }

    pub fn record_contract_interaction(&mut self, address: &str) {
        if let Some(row) = self.contracts.iter_mut().find(|c| c.address == address) {
            row.interactions += 1;
        }
    }

    pub fn set_stats(&mut self, stats: &AutomationStats) {
        self.stats = stats.clone();
    }

    pub fn wallets(&self) -> &[WalletRow] {
        &self.wallets
    }

    pub fn transactions(&self) -> &[TransactionRow] {
        &self.transactions
    }

    pub fn contracts(&self) -> &[ContractRow] {
        &self.contracts
    }

    pub fn activity_breakdown(&self) -> ActivityBreakdown {
        let total = self.transactions.len();

        let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
        let mut per_wallet: BTreeMap<&str, usize> = BTreeMap::new();
        for tx in &self.transactions {
            *by_kind.entry(tx.kind.as_str()).or_default() += 1;
            *per_wallet.entry(tx.from.as_str()).or_default() += 1;
        }

        let by_kind = by_kind
            .into_iter()
            .map(|(kind, count)| KindShare {
                kind: kind.to_string(),
                count,
                percentage: if total > 0 {
                    count as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
            })
            .collect();

        let mut per_contract: Vec<(String, u64)> = self
            .contracts
            .iter()
            .map(|c| (c.address.clone(), c.interactions))
            .collect();
        per_contract.sort();

        ActivityBreakdown {
            total,
            by_kind,
            per_wallet: per_wallet
                .into_iter()
                .map(|(address, count)| (address.to_string(), count))
                .collect(),
            per_contract,
        }
    }

    /// Write the workbook; `None` when recording is disabled
    pub fn save(&self) -> Result<Option<PathBuf>> {
        if !self.enabled {
            debug!("Spreadsheet recording disabled, skipping save");
            return Ok(None);
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let header = Format::new().set_bold();
        let mut workbook = Workbook::new();

        self.write_summary(workbook.add_worksheet(), &header)?;
        self.write_wallets(workbook.add_worksheet(), &header)?;
        if !self.transactions.is_empty() {
            self.write_transactions(workbook.add_worksheet(), &header)?;
        }
        if !self.contracts.is_empty() {
            self.write_contracts(workbook.add_worksheet(), &header)?;
        }
        self.write_activity(workbook.add_worksheet(), &header)?;

        workbook.save(&self.path)?;
        info!("Statistics saved to {:?}", self.path);
        Ok(Some(self.path.clone()))
    }

    fn write_summary(&self, sheet: &mut Worksheet, header: &Format) -> Result<()> {
        sheet.set_name("Summary")?;
        write_header(sheet, header, &["Parameter", "Value"])?;

        let stats = &self.stats;
        let rows: Vec<(&str, String)> = vec![
            ("Wallets created", stats.wallets_created.to_string()),
            ("SOL balance", format!("{:.4}", stats.solana_balance)),
            ("rSOL balance", format!("{:.4}", stats.r_sol_balance)),
            ("Transactions completed", stats.transactions_completed.to_string()),
            ("Contracts deployed", stats.contracts_deployed.to_string()),
            ("Bridges completed", stats.bridges_completed.to_string()),
            ("Errors", stats.errors.len().to_string()),
            ("Start time", stats.start_time.to_rfc3339()),
            (
                "End time",
                stats.end_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
            ),
            ("Duration (s)", stats.duration_secs().to_string()),
        ];
        for (i, (name, value)) in rows.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, *name)?;
            sheet.write_string(row, 1, value)?;
        }
        sheet.set_column_width(0, 26)?;
        sheet.set_column_width(1, 32)?;
        Ok(())
    }

    fn write_wallets(&self, sheet: &mut Worksheet, header: &Format) -> Result<()> {
        sheet.set_name("Wallets")?;
        write_header(
            sheet,
            header,
            &["#", "Solana Address", "EVM Address", "SOL", "EVM Balance", "rSOL", "Created"],
        )?;
        for (i, wallet) in self.wallets.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_number(row, 0, wallet.index as f64 + 1.0)?;
            sheet.write_string(row, 1, &wallet.solana_address)?;
            sheet.write_string(row, 2, &wallet.evm_address)?;
            sheet.write_number(row, 3, wallet.sol_balance)?;
            sheet.write_string(row, 4, &wallet.evm_balance)?;
            sheet.write_number(row, 5, wallet.r_sol_balance)?;
            sheet.write_string(row, 6, wallet.created_at.to_rfc3339())?;
        }
        Ok(())
    }

    fn write_transactions(&self, sheet: &mut Worksheet, header: &Format) -> Result<()> {
        sheet.set_name("Transactions")?;
        write_header(
            sheet,
            header,
            &["Time", "Type", "From", "To", "Amount", "Hash", "Success", "Gas Used", "Error"],
        )?;
        for (i, tx) in self.transactions.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, tx.timestamp.to_rfc3339())?;
            sheet.write_string(row, 1, &tx.kind)?;
            sheet.write_string(row, 2, &tx.from)?;
            sheet.write_string(row, 3, &tx.to)?;
            sheet.write_string(row, 4, &tx.amount)?;
            sheet.write_string(row, 5, &tx.hash)?;
            sheet.write_boolean(row, 6, tx.success)?;
            if let Some(gas) = tx.gas_used {
                sheet.write_number(row, 7, gas as f64)?;
            }
            if let Some(error) = &tx.error {
                sheet.write_string(row, 8, error)?;
            }
        }
        Ok(())
    }

    fn write_contracts(&self, sheet: &mut Worksheet, header: &Format) -> Result<()> {
        sheet.set_name("Contracts")?;
        write_header(sheet, header, &["Address", "Deployer", "Hash", "Deployed", "Interactions"])?;
        for (i, contract) in self.contracts.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, &contract.address)?;
            sheet.write_string(row, 1, &contract.deployer)?;
            sheet.write_string(row, 2, &contract.hash)?;
            sheet.write_string(row, 3, contract.deployed_at.to_rfc3339())?;
            sheet.write_number(row, 4, contract.interactions as f64)?;
        }
        Ok(())
    }

    fn write_activity(&self, sheet: &mut Worksheet, header: &Format) -> Result<()> {
        sheet.set_name("Activity")?;
        let breakdown = self.activity_breakdown();

        write_header(sheet, header, &["Activity Type", "Count", "Percentage"])?;
        let mut row = 1u32;
        for share in &breakdown.by_kind {
            sheet.write_string(row, 0, &share.kind)?;
            sheet.write_number(row, 1, share.count as f64)?;
            sheet.write_string(row, 2, format!("{:.1}%", share.percentage))?;
            row += 1;
        }

        row += 1;
        sheet.write_string_with_format(row, 0, "Wallet", header)?;
        sheet.write_string_with_format(row, 1, "Transactions", header)?;
        row += 1;
        for (address, count) in &breakdown.per_wallet {
            sheet.write_string(row, 0, address)?;
            sheet.write_number(row, 1, *count as f64)?;
            row += 1;
        }

        row += 1;
        sheet.write_string_with_format(row, 0, "Contract", header)?;
        sheet.write_string_with_format(row, 1, "Interactions", header)?;
        row += 1;
        for (address, count) in &breakdown.per_contract {
            sheet.write_string(row, 0, address)?;
            sheet.write_number(row, 1, *count as f64)?;
            row += 1;
        }
        Ok(())
    }
}

fn write_header(sheet: &mut Worksheet, format: &Format, titles: &[&str]) -> Result<()> {
    for (col, title) in titles.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, format)?;
    }
    Ok(())
}
