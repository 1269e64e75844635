/// Transaction Manager - Sends EVM transactions with endpoint failover
///
/// Every logical send makes at most one attempt per configured endpoint.
/// A failed attempt (network error, insufficient balance, revert) advances
/// the shared endpoint cursor and pauses before the next attempt.
use alloy::network::TransactionBuilder;
use alloy::primitives::utils::{format_ether, parse_ether};
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::chain::contracts::interaction_calldata;
use crate::chain::evm::{EvmConnector, TxReceipt};
use crate::chain::wallet::{EvmKeys, WalletPair};
use crate::chain::{ContractDeployResult, TransactionResult};
use crate::config::Config;

/// Used when the endpoint cannot report a gas price
pub const DEFAULT_GAS_PRICE_WEI: u128 = 20_000_000_000;
/// Fallback for `optimize_gas_price`
pub const FALLBACK_OPTIMIZED_GAS_PRICE_WEI: u128 = 25_000_000_000;
pub const TRANSFER_GAS_BUFFER: u64 = 10_000;
pub const DEPLOY_GAS_BUFFER: u64 = 50_000;

/// Configuration for the transaction sender
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub endpoints: Vec<String>,
    /// Minimum spacing between sends from one address
    pub throttle: Duration,
    /// Pause after a failed attempt
    pub retry_backoff: Duration,
    pub batch_size: usize,
    pub batch_delay: Duration,
    /// Default target for `send_random_transactions`
    pub max_transactions: usize,
}

impl SenderConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoints: config.rpc_endpoints(),
            throttle: Duration::from_millis(config.transactions.delay_ms),
            retry_backoff: Duration::from_millis(config.transactions.retry_backoff_ms),
            batch_size: config.transactions.batch_size.max(1),
            batch_delay: Duration::from_millis(config.transactions.delay_ms),
            max_transactions: config.transactions.max_transactions,
        }
    }
}

/// Snapshot of sender counters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SenderStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub failed_attempts: u64,
    pub success_rate: f64,
    pub current_endpoint: String,
}

/// What a send carries beyond sender and value
#[derive(Debug, Clone)]
enum Payload {
    Transfer { to: Address, data: Option<Bytes> },
    Deploy { code: Bytes },
}

impl Payload {
    fn gas_buffer(&self) -> u64 {
        match self {
            Payload::Transfer { .. } => TRANSFER_GAS_BUFFER,
            Payload::Deploy { .. } => DEPLOY_GAS_BUFFER,
        }
    }
}

pub struct TransactionSender {
    connector: Arc<dyn EvmConnector>,
    config: SenderConfig,
    cursor: AtomicUsize,
    last_send: Mutex<HashMap<Address, Instant>>,
    successful: AtomicU64,
    failed: AtomicU64,
    failed_attempts: AtomicU64,
}

impl TransactionSender {
    pub fn new(mut config: SenderConfig, connector: Arc<dyn EvmConnector>) -> Result<Self> {
        if config.endpoints.is_empty() {
            bail!("At least one EVM RPC endpoint is required");
        }
        config.batch_size = config.batch_size.max(1);
        Ok(Self {
            connector,
            config,
            cursor: AtomicUsize::new(0),
            last_send: Mutex::new(HashMap::new()),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
        })
    }

    pub fn endpoint_count(&self) -> usize {
        self.config.endpoints.len()
    }

    /// Index of the endpoint the next attempt will use
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst) % self.endpoint_count()
    }

    pub fn current_endpoint(&self) -> &str {
        &self.config.endpoints[self.cursor()]
    }

    pub fn connector(&self) -> Arc<dyn EvmConnector> {
        self.connector.clone()
    }

    fn switch_endpoint(&self) {
        let next = (self.cursor.fetch_add(1, Ordering::SeqCst) + 1) % self.endpoint_count();
        log::info!("Switched to RPC: {}", self.config.endpoints[next]);
    }

    /// Send `amount_eth` from `from` to `to`, optionally with call data
    pub async fn send_transaction(
        &self,
        from: &EvmKeys,
        to: &str,
        amount_eth: &str,
        data: Option<Bytes>,
    ) -> TransactionResult {
        let started = Utc::now();
        let to = match to.parse::<Address>() {
            Ok(to) => to,
            Err(e) => return TransactionResult::failed(format!("Invalid recipient {}: {}", to, e), started),
        };
        let value = match parse_ether(amount_eth) {
            Ok(value) => value,
            Err(e) => return TransactionResult::failed(format!("Invalid amount {}: {}", amount_eth, e), started),
        };

        match self.send_with_failover(from, value, Payload::Transfer { to, data }).await {
            Ok(receipt) => {
                log::info!(
                    "Transaction successful: {} | Gas used: {}",
                    receipt.hash,
                    receipt.gas_used
                );
                TransactionResult::succeeded(receipt.hash.to_string(), receipt.gas_used, started)
            }
            Err(e) => TransactionResult::failed(e.to_string(), started),
        }
    }

    /// Zero-value call to `contract`
    pub async fn send_contract_call(&self, from: &EvmKeys, contract: &str, data: Bytes) -> TransactionResult {
        self.send_transaction(from, contract, "0", Some(data)).await
    }

    /// Create a contract from `code`; the address comes from the receipt
    pub async fn deploy_contract(&self, from: &EvmKeys, code: Bytes) -> ContractDeployResult {
        match self.send_with_failover(from, U256::ZERO, Payload::Deploy { code }).await {
            Ok(TxReceipt {
                hash,
                contract_address: Some(address),
                ..
            }) => ContractDeployResult {
                address: address.to_checksum(None),
                hash: hash.to_string(),
                success: true,
                error: None,
            },
            Ok(receipt) => ContractDeployResult {
                address: String::new(),
                hash: receipt.hash.to_string(),
                success: false,
                error: Some("Receipt carried no contract address".to_string()),
            },
            Err(e) => ContractDeployResult {
                address: String::new(),
                hash: String::new(),
                success: false,
                error: Some(e.to_string()),
            },
        }
    }

    async fn send_with_failover(&self, from: &EvmKeys, value: U256, payload: Payload) -> Result<TxReceipt> {
        let sender = from.parsed_address()?;
        let max_attempts = self.endpoint_count();
        let mut last_error = anyhow!("no attempt made");

        for attempt in 1..=max_attempts {
            let endpoint = self.current_endpoint().to_string();
            match self.attempt(&endpoint, from, sender, value, &payload).await {
                Ok(receipt) => {
                    self.successful.fetch_add(1, Ordering::Relaxed);
                    return Ok(receipt);
                }
                Err(e) => {
                    log::error!("Transaction attempt {} via {} failed: {}", attempt, endpoint, e);
                    self.failed_attempts.fetch_add(1, Ordering::Relaxed);
                    last_error = e;
                    self.switch_endpoint();
                    if attempt < max_attempts {
                        sleep(self.config.retry_backoff).await;
                    }
                }
            }
        }

        self.failed.fetch_add(1, Ordering::Relaxed);
        Err(anyhow!("Failed after {} attempts: {}", max_attempts, last_error))
    }

    async fn attempt(
        &self,
        endpoint: &str,
        from: &EvmKeys,
        sender: Address,
        value: U256,
        payload: &Payload,
    ) -> Result<TxReceipt> {
        self.throttle(sender).await;

        let rpc = self.connector.connect(endpoint, Some(from))?;

        let balance = rpc.balance(sender).await?;
        if balance.is_zero() || balance < value {
            bail!(
                "Insufficient balance: {} ETH < {} ETH",
                format_ether(balance),
                format_ether(value)
            );
        }

        let gas_price = match rpc.gas_price().await {
            Ok(price) => price,
            Err(e) => {
                log::warn!("Gas price unavailable ({}), using 20 gwei", e);
                DEFAULT_GAS_PRICE_WEI
            }
        };
        let nonce = rpc.pending_nonce(sender).await?;

        let mut tx = TransactionRequest::default()
            .with_from(sender)
            .with_value(value)
            .with_gas_price(gas_price)
            .with_nonce(nonce);
        tx = match payload {
            Payload::Transfer { to, data } => {
                let tx = tx.with_to(*to);
                match data {
                    Some(data) => tx.with_input(data.clone()),
                    None => tx,
                }
            }
            Payload::Deploy { code } => tx.with_deploy_code(code.clone()),
        };

        let estimate = rpc.estimate_gas(&tx).await?;
        let tx = tx.with_gas_limit(estimate + payload.gas_buffer());

        log::info!("Sending {} ETH from {} via {}", format_ether(value), sender, endpoint);
        let receipt = rpc.send_and_confirm(tx).await?;
        if !receipt.success {
            bail!("Transaction {} failed or was reverted", receipt.hash);
        }
        Ok(receipt)
    }

    async fn throttle(&self, sender: Address) {
        let wait = {
            let Ok(mut last_send) = self.last_send.lock() else {
                return;
            };
            let now = Instant::now();
            let wait = last_send
                .get(&sender)
                .map_or(false, |last| now.duration_since(*last) < self.config.throttle);
            last_send.insert(sender, now);
            wait
        };
        if wait {
            sleep(self.config.throttle).await;
        }
    }

    /// Balance in ETH at the current endpoint, trying the others on failure
    pub async fn balance_of(&self, address: &str) -> Result<String> {
        let address: Address = address.parse()?;
        let mut last_error = anyhow!("no endpoint tried");
        for offset in 0..self.endpoint_count() {
            let endpoint = &self.config.endpoints[(self.cursor() + offset) % self.endpoint_count()];
            let result: Result<U256> = async {
                let rpc = self.connector.connect(endpoint, None)?;
                rpc.balance(address).await
            }
            .await;
            match result {
                Ok(balance) => return Ok(format_ether(balance)),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    /// Read-only call against the current endpoint with fallback to the others
    pub async fn read_call(&self, contract: &str, data: Bytes) -> Result<Bytes> {
        let contract: Address = contract.parse()?;
        let tx = TransactionRequest::default().with_to(contract).with_input(data);
        let mut last_error = anyhow!("no endpoint tried");
        for offset in 0..self.endpoint_count() {
            let endpoint = &self.config.endpoints[(self.cursor() + offset) % self.endpoint_count()];
            let result: Result<Bytes> = async {
                let rpc = self.connector.connect(endpoint, None)?;
                rpc.call(&tx).await
            }
            .await;
            match result {
                Ok(bytes) => return Ok(bytes),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    /// Batched random transfers between wallets; `target` defaults to `max_transactions`
    pub async fn send_random_transactions<R: Rng + Send>(
        &self,
        wallets: &[WalletPair],
        target: Option<usize>,
        amount_range: (f64, f64),
        rng: &mut R,
    ) -> Result<Vec<TransactionResult>> {
        if wallets.len() < 2 {
            bail!("Need at least 2 wallets for random transactions");
        }
        let target = target.unwrap_or(self.config.max_transactions);
        log::info!("Starting mass transactions: {} transfers", target);

        let mut results = Vec::with_capacity(target);
        let batches = (target + self.config.batch_size - 1) / self.config.batch_size;
        for batch in 0..batches {
            let in_batch = self.config.batch_size.min(target - results.len());
            for _ in 0..in_batch {
                let from = rng.gen_range(0..wallets.len());
                let mut to = rng.gen_range(0..wallets.len() - 1);
                if to >= from {
                    to += 1;
                }
                let amount = random_amount(rng, amount_range.0, amount_range.1);
                let result = self
                    .send_transaction(&wallets[from].evm, &wallets[to].evm.address, &amount, None)
                    .await;
                results.push(result);
            }

            let succeeded = results.iter().filter(|r| r.success).count();
            log::info!(
                "Batch {}/{} done: {}/{} successful so far",
                batch + 1,
                batches,
                succeeded,
                results.len()
            );
            if batch + 1 < batches {
                sleep(self.config.batch_delay).await;
            }
        }
        Ok(results)
    }

    /// Each wallet sends `amount_eth` to the next one, wrapping around, for `cycles` rounds
    pub async fn send_circular_transactions(
        &self,
        wallets: &[WalletPair],
        cycles: usize,
        amount_eth: &str,
    ) -> Vec<TransactionResult> {
        let mut results = Vec::new();
        if wallets.len() < 2 {
            return results;
        }
        for cycle in 0..cycles {
            for (i, wallet) in wallets.iter().enumerate() {
                let next = &wallets[(i + 1) % wallets.len()];
                results.push(
                    self.send_transaction(&wallet.evm, &next.evm.address, amount_eth, None)
                        .await,
                );
            }
            log::info!("Circular cycle {}/{} complete", cycle + 1, cycles);
        }
        results
    }

    /// Random wallets fire random HelloWorld calls at random contracts
    pub async fn interact_with_contracts<R: Rng + Send>(
        &self,
        wallets: &[WalletPair],
        contracts: &[String],
        count: usize,
        rng: &mut R,
    ) -> Vec<TransactionResult> {
        let calls = interaction_calldata();
        let mut results = Vec::with_capacity(count);
        if wallets.is_empty() || contracts.is_empty() {
            return results;
        }
        for _ in 0..count {
            let (Some(wallet), Some(contract), Some(data)) =
                (wallets.choose(rng), contracts.choose(rng), calls.choose(rng))
            else {
                break;
            };
            results.push(self.send_contract_call(&wallet.evm, contract, data.clone()).await);
        }
        results
    }

    /// Fund each target from `source`
    pub async fn distribute_ether(
        &self,
        source: &WalletPair,
        targets: &[WalletPair],
        amount_eth: &str,
    ) -> Vec<TransactionResult> {
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            results.push(
                self.send_transaction(&source.evm, &target.evm.address, amount_eth, None)
                    .await,
            );
        }
        results
    }

    /// EVM balances by address; failures read as "0"
    pub async fn check_all_balances(&self, wallets: &[WalletPair]) -> HashMap<String, String> {
        let mut balances = HashMap::new();
        for wallet in wallets {
            let balance = match self.balance_of(&wallet.evm.address).await {
                Ok(balance) => balance,
                Err(e) => {
                    log::warn!("Balance check failed for {}: {}", wallet.evm.address, e);
                    "0".to_string()
                }
            };
            balances.insert(wallet.evm.address.clone(), balance);
        }
        balances
    }

    /// Current gas price plus 10%, or 25 gwei when it cannot be read
    pub async fn optimize_gas_price(&self) -> u128 {
        let result: Result<u128> = async {
            let rpc = self.connector.connect(self.current_endpoint(), None)?;
            rpc.gas_price().await
        }
        .await;
        match result {
            Ok(price) => price + price / 10,
            Err(e) => {
                log::warn!("Gas price lookup failed: {}", e);
                FALLBACK_OPTIMIZED_GAS_PRICE_WEI
            }
        }
    }

    pub fn stats(&self) -> SenderStats {
        let successful = self.successful.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let total = successful + failed;
        SenderStats {
            total,
            successful,
            failed,
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            success_rate: if total > 0 {
                successful as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            current_endpoint: self.current_endpoint().to_string(),
        }
    }

    pub fn reset_stats(&self) {
        self.successful.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.failed_attempts.store(0, Ordering::Relaxed);
        if let Ok(mut last_send) = self.last_send.lock() {
            last_send.clear();
        }
    }
}

/// Uniform amount in `[min, max)` formatted for `parse_ether`
pub fn random_amount<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> String {
    let amount = if max > min { rng.gen_range(min..max) } else { min };
    format!("{:.6}", amount)
}

/// Calculate retry delay with exponential backoff
pub fn calculate_retry_delay(retry_count: u32, initial_ms: u64, max_ms: u64) -> u64 {
    let delay = initial_ms.saturating_mul(2u64.saturating_pow(retry_count.saturating_sub(1)));
    delay.min(max_ms)
}
