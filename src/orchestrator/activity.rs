/// Mass Activity Scheduler - randomized on-chain activity across the generated wallets
///
/// Each iteration sleeps a random delay, picks a wallet and an activity kind
/// uniformly, and dispatches it. One iteration counts as one completed
/// transaction regardless of how many sends the handler made or whether they
/// succeeded; failed sends only show up in the recorder. Handler errors (an
/// unreachable balance RPC, a missing wallet) go to the stats error list.
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::deployer::ContractDeployer;
use super::stats::AutomationStats;
use super::transaction_manager::{random_amount, TransactionSender};
use crate::chain::contracts::{interaction_calldata, GREETINGS};
use crate::chain::solana::lamports_to_sol;
use crate::chain::wallet::WalletPair;
use crate::chain::{SolanaRpc, TransactionResult};
use crate::config::ActivityConfig;
use crate::report::{SpreadsheetRecorder, TransactionRow};

const MULTI_TRANSFER_MIN: f64 = 0.0001;
const MULTI_TRANSFER_MAX: f64 = 0.0051;
const MULTI_TRANSFER_MAX_RECIPIENTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    Transfer,
    ContractCall,
    ContractDeploy,
    MultiTransfer,
    ContractRead,
    BalanceCheck,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 6] = [
        ActivityKind::Transfer,
        ActivityKind::ContractCall,
        ActivityKind::ContractDeploy,
        ActivityKind::MultiTransfer,
        ActivityKind::ContractRead,
        ActivityKind::BalanceCheck,
    ];

    /// Uniform choice over all kinds
    pub fn pick<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Label used in the spreadsheet
    pub fn label(&self) -> &'static str {
        match self {
            ActivityKind::Transfer => "Random transfer",
            ActivityKind::ContractCall => "Contract call",
            ActivityKind::ContractDeploy => "Contract deploy",
            ActivityKind::MultiTransfer => "Multi transfer",
            ActivityKind::ContractRead => "Contract read",
            ActivityKind::BalanceCheck => "Balance check",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone)]
pub struct ActivitySettings {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub min_amount: f64,
    pub max_amount: f64,
    pub multi_transfer_gap: Duration,
}

impl ActivitySettings {
    pub fn from_config(config: &ActivityConfig) -> Self {
        Self {
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.min_delay_ms)),
            min_amount: config.min_amount,
            max_amount: config.max_amount,
            multi_transfer_gap: Duration::from_millis(config.multi_transfer_gap_ms),
        }
    }
}

/// State shared between the pipeline and the background activity task
#[derive(Clone)]
pub struct RunContext {
    pub stats: Arc<Mutex<AutomationStats>>,
    pub recorder: Arc<Mutex<SpreadsheetRecorder>>,
    pub contracts: Arc<Mutex<Vec<String>>>,
}

impl RunContext {
    pub fn new(recorder: SpreadsheetRecorder) -> Self {
        Self {
            stats: Arc::new(Mutex::new(AutomationStats::default())),
            recorder: Arc::new(Mutex::new(recorder)),
            contracts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

pub struct ActivityScheduler {
    sender: Arc<TransactionSender>,
    deployer: ContractDeployer,
    solana: Arc<dyn SolanaRpc>,
    wallets: Arc<Vec<WalletPair>>,
    settings: ActivitySettings,
    context: RunContext,
    rng: StdRng,
}

impl ActivityScheduler {
    pub fn new(
        sender: Arc<TransactionSender>,
        solana: Arc<dyn SolanaRpc>,
        wallets: Arc<Vec<WalletPair>>,
        settings: ActivitySettings,
        context: RunContext,
    ) -> Result<Self> {
        if wallets.len() < 2 {
            bail!("Mass activity needs at least 2 wallets, got {}", wallets.len());
        }
        Ok(Self {
            deployer: ContractDeployer::new(sender.clone()),
            sender,
            solana,
            wallets,
            settings,
            context,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    fn next_delay(&mut self) -> Duration {
        let min = self.settings.min_delay.as_millis() as u64;
        let max = self.settings.max_delay.as_millis() as u64;
        Duration::from_millis(self.rng.gen_range(min..=max.max(min)))
    }

    /// Loop until `token` is cancelled; returns the number of iterations run
    pub async fn run(&mut self, token: CancellationToken) -> u64 {
        info!(
            "Starting mass activity over {} wallets ({:?} - {:?} between actions)",
            self.wallets.len(),
            self.settings.min_delay,
            self.settings.max_delay
        );

        let mut iterations = 0u64;
        loop {
            let delay = self.next_delay();
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(delay) => {}
            }
            if token.is_cancelled() {
                break;
            }
            self.step().await;
            iterations += 1;
        }

        info!("Mass activity stopped after {} iterations", iterations);
        iterations
    }

    /// Run for a fixed window
    pub async fn run_for(&mut self, window: Duration) -> u64 {
        let token = CancellationToken::new();
        let timer = token.clone();
        let handle = tokio::spawn(async move {
            sleep(window).await;
            timer.cancel();
        });
        let iterations = self.run(token).await;
        handle.abort();
        iterations
    }

    /// One random iteration
    pub async fn step(&mut self) -> ActivityKind {
        let index = self.rng.gen_range(0..self.wallets.len());
        let kind = ActivityKind::pick(&mut self.rng);
        self.run_iteration(kind, index).await;
        kind
    }

    /// Dispatch `kind` for wallet `index` and account for the outcome
    pub async fn run_iteration(&mut self, kind: ActivityKind, index: usize) -> bool {
        debug!("Activity {} for wallet {}", kind, index + 1);
        match self.dispatch(kind, index).await {
            Ok(()) => {
                self.context.stats.lock().await.transactions_completed += 1;
                true
            }
            Err(e) => {
                warn!("{} failed for wallet {}: {}", kind, index + 1, e);
                self.context
                    .stats
                    .lock()
                    .await
                    .record_error("Mass activity", format!("{}: {}", kind, e));
                false
            }
        }
    }

    async fn dispatch(&mut self, kind: ActivityKind, index: usize) -> Result<()> {
        let wallets = self.wallets.clone();
        let wallet = wallets
            .get(index)
            .ok_or_else(|| anyhow!("No wallet at index {}", index))?;
        match kind {
            ActivityKind::Transfer => self.transfer(wallet).await,
            ActivityKind::ContractCall => self.contract_call(wallet).await,
            ActivityKind::ContractDeploy => self.contract_deploy(wallet).await,
            ActivityKind::MultiTransfer => self.multi_transfer(wallet).await,
            ActivityKind::ContractRead => self.contract_read(wallet).await,
            ActivityKind::BalanceCheck => self.balance_check(wallet).await,
        }
    }

    async fn transfer(&mut self, wallet: &WalletPair) -> Result<()> {
        let wallets = self.wallets.clone();
        let target = wallets
            .iter()
            .find(|w| w.evm.address != wallet.evm.address)
            .ok_or_else(|| anyhow!("No transfer target"))?;
        let amount = random_amount(&mut self.rng, self.settings.min_amount, self.settings.max_amount);

        let result = self
            .sender
            .send_transaction(&wallet.evm, &target.evm.address, &amount, None)
            .await;
        self.record(ActivityKind::Transfer, &wallet.evm.address, &target.evm.address, &amount, &result)
            .await;
        Ok(())
    }

    async fn contract_call(&mut self, wallet: &WalletPair) -> Result<()> {
        let contracts = self.context.contracts.lock().await.clone();
        let calls = interaction_calldata();
        let (Some(contract), Some(data)) = (contracts.choose(&mut self.rng), calls.choose(&mut self.rng)) else {
            debug!("No deployed contracts yet, skipping contract call");
            return Ok(());
        };

        let result = self.sender.send_contract_call(&wallet.evm, contract, data.clone()).await;
        self.record(ActivityKind::ContractCall, &wallet.evm.address, contract, "0", &result)
            .await;
        if result.success {
            self.context.recorder.lock().await.record_contract_interaction(contract);
        }
        Ok(())
    }

    async fn contract_deploy(&mut self, wallet: &WalletPair) -> Result<()> {
        let deployed = self.deployer.deploy_hello_world(wallet).await;
        if !deployed.success {
            self.context.recorder.lock().await.add_transaction(TransactionRow {
                timestamp: Utc::now(),
                kind: ActivityKind::ContractDeploy.label().to_string(),
                from: wallet.evm.address.clone(),
                to: String::new(),
                amount: "0".to_string(),
                hash: deployed.hash.clone(),
                success: false,
                gas_used: None,
                error: deployed.error.clone(),
            });
            return Ok(());
        }

        self.context.contracts.lock().await.push(deployed.address.clone());
        self.context.stats.lock().await.contracts_deployed += 1;
        let mut recorder = self.context.recorder.lock().await;
        recorder.add_contract(&deployed.address, &wallet.evm.address, &deployed.hash);
        recorder.add_transaction(TransactionRow {
            timestamp: Utc::now(),
            kind: ActivityKind::ContractDeploy.label().to_string(),
            from: wallet.evm.address.clone(),
            to: deployed.address.clone(),
            amount: "0".to_string(),
            hash: deployed.hash.clone(),
            success: true,
            gas_used: None,
            error: None,
        });
        Ok(())
    }

    async fn multi_transfer(&mut self, wallet: &WalletPair) -> Result<()> {
        let wallets = self.wallets.clone();
        let recipients: Vec<&WalletPair> = wallets
            .iter()
            .filter(|w| w.evm.address != wallet.evm.address)
            .collect();
        let count = self
            .rng
            .gen_range(1..=MULTI_TRANSFER_MAX_RECIPIENTS)
            .min(recipients.len());

        for i in 0..count {
            let Some(target) = recipients.choose(&mut self.rng) else {
                break;
            };
            let amount = random_amount(&mut self.rng, MULTI_TRANSFER_MIN, MULTI_TRANSFER_MAX);
            let result = self
                .sender
                .send_transaction(&wallet.evm, &target.evm.address, &amount, None)
                .await;
            self.record(ActivityKind::MultiTransfer, &wallet.evm.address, &target.evm.address, &amount, &result)
                .await;
            if i + 1 < count {
                sleep(self.settings.multi_transfer_gap).await;
            }
        }

        Ok(())
    }

    async fn contract_read(&mut self, wallet: &WalletPair) -> Result<()> {
        let contracts = self.context.contracts.lock().await.clone();
        let (Some(contract), Some(greeting)) = (contracts.choose(&mut self.rng), GREETINGS.choose(&mut self.rng)) else {
            debug!("No deployed contracts yet, skipping contract read");
            return Ok(());
        };

        let outcome = self.deployer.interact_with_contract(contract, wallet, greeting).await;
        let mut recorder = self.context.recorder.lock().await;
        recorder.add_transaction(TransactionRow {
            timestamp: Utc::now(),
            kind: ActivityKind::ContractRead.label().to_string(),
            from: wallet.evm.address.clone(),
            to: contract.clone(),
            amount: "0".to_string(),
            hash: String::new(),
            success: outcome.is_ok(),
            gas_used: None,
            error: outcome.as_ref().err().map(|e| e.to_string()),
        });
        match outcome {
            Ok(greeting) => {
                recorder.record_contract_interaction(contract);
                debug!("Read greeting {:?} from {}", greeting, contract);
            }
            Err(e) => warn!("Contract read on {} failed: {}", contract, e),
        }
        Ok(())
    }

    async fn balance_check(&mut self, wallet: &WalletPair) -> Result<()> {
        let sol = lamports_to_sol(self.solana.get_balance(&wallet.solana.public_key).await?);
        let evm = self.sender.balance_of(&wallet.evm.address).await?;
        info!("Wallet {}: {:.4} SOL, {} ETH", wallet.evm.address, sol, evm);

        let mut recorder = self.context.recorder.lock().await;
        recorder.update_wallet_balance(&wallet.evm.address, sol, &evm);
        recorder.add_transaction(TransactionRow {
            timestamp: Utc::now(),
            kind: ActivityKind::BalanceCheck.label().to_string(),
            from: wallet.evm.address.clone(),
            to: wallet.solana.public_key.clone(),
            amount: format!("{:.4} SOL / {} ETH", sol, evm),
            hash: String::new(),
            success: true,
            gas_used: None,
            error: None,
        });
        Ok(())
    }

    async fn record(&self, kind: ActivityKind, from: &str, to: &str, amount: &str, result: &TransactionResult) {
        if !result.success {
            warn!("{} from {} failed: {}", kind, from, result.error.as_deref().unwrap_or("unknown error"));
        }
        self.context.recorder.lock().await.add_transaction(TransactionRow {
            timestamp: result.timestamp,
            kind: kind.label().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            amount: amount.to_string(),
            hash: result.hash.clone(),
            success: result.success,
            gas_used: result.gas_used,
            error: result.error.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::evm::testing::FakeChain;
    use crate::faucet::testing::FakeSolana;
    use crate::orchestrator::transaction_manager::SenderConfig;
    use alloy::primitives::utils::parse_ether;
    use alloy::primitives::U256;
    use std::collections::HashMap;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn settings(delay_ms: u64) -> ActivitySettings {
        ActivitySettings {
            min_delay: Duration::from_millis(delay_ms),
            max_delay: Duration::from_millis(delay_ms),
            min_amount: 0.0001,
            max_amount: 0.001,
            multi_transfer_gap: Duration::ZERO,
        }
    }

    fn scheduler(chain: &Arc<FakeChain>, wallet_count: u32, delay_ms: u64) -> (ActivityScheduler, RunContext) {
        let config = SenderConfig {
            endpoints: vec!["http://rpc-a".to_string()],
            throttle: Duration::ZERO,
            retry_backoff: Duration::ZERO,
            batch_size: 10,
            batch_delay: Duration::ZERO,
            max_transactions: 100,
        };
        let sender = Arc::new(TransactionSender::new(config, chain.connector()).unwrap());
        let wallets: Vec<WalletPair> = (0..wallet_count)
            .map(|i| WalletPair::from_mnemonic(MNEMONIC, "", i).unwrap())
            .collect();
        let context = RunContext::new(SpreadsheetRecorder::new("unused.xlsx", false));
        let scheduler = ActivityScheduler::new(
            sender,
            Arc::new(FakeSolana::new(2_000_000_000, true)),
            Arc::new(wallets),
            settings(delay_ms),
            context.clone(),
        )
        .unwrap()
        .with_rng(StdRng::seed_from_u64(42));
        (scheduler, context)
    }

    #[test]
    fn test_kind_selection_is_uniform() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<ActivityKind, usize> = HashMap::new();
        for _ in 0..60_000 {
            *counts.entry(ActivityKind::pick(&mut rng)).or_default() += 1;
        }
        assert_eq!(counts.len(), 6);
        for (kind, count) in counts {
            assert!((9_400..=10_600).contains(&count), "{} picked {} times", kind, count);
        }
    }

    #[tokio::test]
    async fn test_requires_two_wallets() {
        let chain = Arc::new(FakeChain::new(parse_ether("1").unwrap()));
        let sender = Arc::new(
            TransactionSender::new(
                SenderConfig {
                    endpoints: vec!["http://rpc-a".to_string()],
                    throttle: Duration::ZERO,
                    retry_backoff: Duration::ZERO,
                    batch_size: 1,
                    batch_delay: Duration::ZERO,
                    max_transactions: 100,
                },
                chain.connector(),
            )
            .unwrap(),
        );
        let wallets = vec![WalletPair::from_mnemonic(MNEMONIC, "", 0).unwrap()];
        let result = ActivityScheduler::new(
            sender,
            Arc::new(FakeSolana::new(0, true)),
            Arc::new(wallets),
            settings(0),
            RunContext::new(SpreadsheetRecorder::new("unused.xlsx", false)),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_deploy_then_call() {
        let chain = Arc::new(FakeChain::new(parse_ether("1").unwrap()));
        let (mut scheduler, context) = scheduler(&chain, 2, 0);

        assert!(scheduler.run_iteration(ActivityKind::ContractDeploy, 0).await);
        assert!(scheduler.run_iteration(ActivityKind::ContractCall, 1).await);

        let contracts = context.contracts.lock().await.clone();
        assert_eq!(contracts.len(), 1);
        let stats = context.stats.lock().await.clone();
        assert_eq!(stats.contracts_deployed, 1);
        assert_eq!(stats.transactions_completed, 2);
        let recorder = context.recorder.lock().await;
        assert_eq!(recorder.contracts()[0].interactions, 1);
        assert_eq!(recorder.transactions().len(), 2);
    }

    #[tokio::test]
    async fn test_contract_activity_without_contracts_is_noop() {
        let chain = Arc::new(FakeChain::new(parse_ether("1").unwrap()));
        let (mut scheduler, context) = scheduler(&chain, 2, 0);

        assert!(scheduler.run_iteration(ActivityKind::ContractCall, 0).await);
        assert!(scheduler.run_iteration(ActivityKind::ContractRead, 0).await);
        assert_eq!(chain.broadcast_count(), 0);
        assert!(context.recorder.lock().await.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_multi_transfer_counts_one_iteration() {
        let chain = Arc::new(FakeChain::new(parse_ether("1").unwrap()));
        let (mut scheduler, context) = scheduler(&chain, 4, 0);

        assert!(scheduler.run_iteration(ActivityKind::MultiTransfer, 0).await);
        let sent = chain.broadcast_count();
        assert!((1..=3).contains(&sent));
        assert_eq!(context.recorder.lock().await.transactions().len(), sent);
        assert_eq!(context.stats.lock().await.transactions_completed, 1);
    }

    #[tokio::test]
    async fn test_failed_sends_still_count_iteration() {
        let chain = Arc::new(FakeChain::new(U256::ZERO));
        let (mut scheduler, context) = scheduler(&chain, 2, 0);

        assert!(scheduler.run_iteration(ActivityKind::Transfer, 0).await);
        assert!(scheduler.run_iteration(ActivityKind::MultiTransfer, 0).await);
        assert!(scheduler.run_iteration(ActivityKind::ContractDeploy, 0).await);

        let stats = context.stats.lock().await.clone();
        assert_eq!(stats.transactions_completed, 3);
        assert!(stats.errors.is_empty());
        assert_eq!(stats.contracts_deployed, 0);
        assert!(context.contracts.lock().await.is_empty());
        let recorder = context.recorder.lock().await;
        assert!(recorder.transactions().len() >= 3);
        assert!(recorder.transactions().iter().all(|tx| !tx.success));
        assert_eq!(chain.broadcast_count(), 0);
    }

    #[tokio::test]
    async fn test_handler_error_records_error() {
        let chain = Arc::new(FakeChain::new(parse_ether("1").unwrap()));
        let (mut scheduler, context) = scheduler(&chain, 2, 0);

        assert!(!scheduler.run_iteration(ActivityKind::BalanceCheck, 5).await);
        let stats = context.stats.lock().await.clone();
        assert_eq!(stats.transactions_completed, 0);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].starts_with("Mass activity: Balance check"));
    }

    #[tokio::test]
    async fn test_balance_check_updates_recorder() {
        let chain = Arc::new(FakeChain::new(parse_ether("1").unwrap()));
        let (mut scheduler, context) = scheduler(&chain, 2, 0);
        {
            let mut recorder = context.recorder.lock().await;
            recorder.add_wallet(0, &scheduler.wallets[0]);
        }

        assert!(scheduler.run_iteration(ActivityKind::BalanceCheck, 0).await);
        let recorder = context.recorder.lock().await;
        assert_eq!(recorder.wallets()[0].sol_balance, 2.0);
        assert_eq!(recorder.wallets()[0].evm_balance, "1.000000000000000000");
    }

    #[tokio::test]
    async fn test_run_stops_when_cancelled() {
        let chain = Arc::new(FakeChain::new(parse_ether("1").unwrap()));
        let (mut scheduler, context) = scheduler(&chain, 2, 5);
        let token = CancellationToken::new();
        let stopper = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            stopper.cancel();
        });

        let iterations = tokio::time::timeout(Duration::from_secs(5), scheduler.run(token))
            .await
            .unwrap();
        assert!(iterations > 0);
        let stats = context.stats.lock().await.clone();
        assert_eq!(stats.transactions_completed + stats.errors.len() as u64, iterations);
    }

    #[tokio::test]
    async fn test_run_for_window() {
        let chain = Arc::new(FakeChain::new(parse_ether("1").unwrap()));
        let (mut scheduler, _context) = scheduler(&chain, 2, 60_000);

        let iterations = scheduler.run_for(Duration::from_millis(50)).await;
        assert_eq!(iterations, 0);
    }
}
