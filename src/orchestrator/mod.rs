/// Orchestrator - runs the Rome automation pipeline
///
/// Stages run strictly in order:
/// 1. CreateWallets (failure aborts the run)
/// 2. RequestFunds, ConnectBrowser, Bridge
/// 3. DeployContracts, MassActivity, SubmitForms (each optional)
/// 4. Cleanup (always)
///
/// Every other stage failure is recorded in the stats and the pipeline moves
/// on. A progress snapshot is written after each stage.
use anyhow::{bail, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

pub mod activity;
pub mod deployer;
mod progress;
mod stats;
pub mod transaction_manager;

pub use activity::{ActivityKind, ActivityScheduler, ActivitySettings, RunContext};
pub use deployer::ContractDeployer;
pub use progress::{ProgressSnapshot, WalletAddresses};
pub use stats::AutomationStats;
pub use transaction_manager::{calculate_retry_delay, random_amount, SenderConfig, SenderStats, TransactionSender};

use crate::browser::{DappBrowser, WebDriverBrowser};
use crate::chain::{AlloyConnector, EvmConnector, SolanaRpc, SolanaRpcClient, WalletGenerator, WalletPair, WalletVault};
use crate::config::Config;
use crate::faucet::FaucetClient;
use crate::forms::FormSubmitter;
use crate::http::{HttpPoster, ReqwestPoster};
use crate::report::SpreadsheetRecorder;

/// SOL bridged to rSOL through the dApp
pub const BRIDGE_AMOUNT_SOL: f64 = 1.0;
const DEPLOY_GAP: Duration = Duration::from_secs(3);
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    CreateWallets,
    RequestFunds,
    ConnectBrowser,
    Bridge,
    DeployContracts,
    MassActivity,
    SubmitForms,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a run should do, from the command line
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub wallets: usize,
    pub contracts: usize,
    pub activity: bool,
    pub forms: bool,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            wallets: config.wallet.default_count,
            contracts: config.wallet.default_contracts,
            activity: true,
            forms: true,
        }
    }

    /// Stages before Cleanup, in order
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = vec![Stage::CreateWallets, Stage::RequestFunds, Stage::ConnectBrowser, Stage::Bridge];
        if self.contracts > 0 {
            stages.push(Stage::DeployContracts);
        }
        if self.activity {
            stages.push(Stage::MassActivity);
        }
        if self.forms {
            stages.push(Stage::SubmitForms);
        }
        stages
    }
}

/// External systems the pipeline talks to
pub struct Backends {
    pub evm: Arc<dyn EvmConnector>,
    pub solana: Arc<dyn SolanaRpc>,
    pub http: Arc<dyn HttpPoster>,
    pub browser: Box<dyn DappBrowser>,
}

impl Backends {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            evm: Arc::new(AlloyConnector::default()),
            solana: Arc::new(SolanaRpcClient::new(config.solana.rpc_url.clone())?),
            http: Arc::new(ReqwestPoster::new(HTTP_TIMEOUT)?),
            browser: Box::new(WebDriverBrowser::from_config(config)),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub solana_connection: bool,
    pub rome_connection: bool,
    pub webdriver_available: bool,
    pub config_valid: bool,
}

pub struct Orchestrator {
    config: Config,
    run_id: Uuid,
    stage: Stage,
    sender: Arc<TransactionSender>,
    deployer: ContractDeployer,
    faucet: FaucetClient,
    forms: FormSubmitter,
    solana: Arc<dyn SolanaRpc>,
    http: Arc<dyn HttpPoster>,
    browser: Box<dyn DappBrowser>,
    context: RunContext,
    wallets: Arc<Vec<WalletPair>>,
    activity: Option<(CancellationToken, JoinHandle<u64>)>,
    deploy_gap: Duration,
}

impl Orchestrator {
    pub fn new(config: Config, backends: Backends) -> Result<Self> {
        let sender = Arc::new(TransactionSender::new(SenderConfig::from_config(&config), backends.evm)?);
        let recorder = SpreadsheetRecorder::new(config.report_path(), config.report.enabled);

        Ok(Self {
            run_id: Uuid::new_v4(),
            stage: Stage::CreateWallets,
            deployer: ContractDeployer::new(sender.clone()),
            sender,
            faucet: FaucetClient::new(&config.solana, backends.solana.clone(), backends.http.clone()),
            forms: FormSubmitter::new(config.forms.clone(), backends.http.clone()),
            solana: backends.solana,
            http: backends.http,
            browser: backends.browser,
            context: RunContext::new(recorder),
            wallets: Arc::new(Vec::new()),
            activity: None,
            deploy_gap: DEPLOY_GAP,
            config,
        })
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let backends = Backends::from_config(&config)?;
        Self::new(config, backends)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn wallets(&self) -> &[WalletPair] {
        &self.wallets
    }

    pub fn sender(&self) -> &TransactionSender {
        &self.sender
    }

    pub async fn stats(&self) -> AutomationStats {
        self.context.stats.lock().await.clone()
    }

    pub async fn deployed_contracts(&self) -> Vec<String> {
        self.context.contracts.lock().await.clone()
    }

    /// Run the whole pipeline; only wallet creation failure is returned as an error
    pub async fn run(&mut self, options: &RunOptions) -> Result<AutomationStats> {
        info!("Starting Rome automation run {} ({:?})", self.run_id, options);
        self.context.stats.lock().await.start_time = Utc::now();

        let outcome = self.run_stages(options).await;
        if let Err(e) = &outcome {
            error!("Automation aborted: {:#}", e);
            self.context.stats.lock().await.record_error(&Stage::CreateWallets.to_string(), e);
        }

        self.stage = Stage::Cleanup;
        self.cleanup().await;
        let stats = self.finish().await;

        outcome.map(|_| stats)
    }

    async fn run_stages(&mut self, options: &RunOptions) -> Result<()> {
        for stage in options.stages() {
            self.stage = stage;
            info!("=== Stage: {} ===", stage);

            let result = match stage {
                Stage::CreateWallets => self.create_wallets(options.wallets).await,
                Stage::RequestFunds => self.request_funds().await,
                Stage::ConnectBrowser => self.connect_browser().await,
                Stage::Bridge => self.bridge().await,
                Stage::DeployContracts => self.deploy_contracts(options.contracts).await,
                Stage::MassActivity => self.start_mass_activity().await,
                Stage::SubmitForms => self.submit_forms().await,
                Stage::Cleanup => Ok(()),
            };

            match result {
                Err(e) if stage == Stage::CreateWallets => return Err(e),
                Err(e) => {
                    warn!("Stage {} failed: {:#}", stage, e);
                    self.context.stats.lock().await.record_error(&stage.to_string(), format!("{:#}", e));
                }
                Ok(()) => info!("Stage {} completed", stage),
            }
            self.save_progress().await;
        }
        Ok(())
    }

    async fn create_wallets(&mut self, count: usize) -> Result<()> {
        if count == 0 {
            bail!("At least one wallet is required");
        }
        let vault = WalletVault::new(&self.config.security.encryption_key, self.config.wallets_dir())?;
        let generator = WalletGenerator::new(self.config.security.seed_phrase.as_deref(), vault)?;
        let wallets = generator.generate_multiple(count)?;

        {
            let mut recorder = self.context.recorder.lock().await;
            for (i, wallet) in wallets.iter().enumerate() {
                info!("Wallet {}: Solana {} | EVM {}", i + 1, wallet.solana.public_key, wallet.evm.address);
                recorder.add_wallet(i, wallet);
            }
        }
        self.context.stats.lock().await.wallets_created = wallets.len();
        self.wallets = Arc::new(wallets);
        Ok(())
    }

    async fn request_funds(&mut self) -> Result<()> {
        let addresses: Vec<String> = self.wallets.iter().map(|w| w.solana.public_key.clone()).collect();
        let results = self
            .faucet
            .request_multiple_airdrops(&addresses, self.config.solana.airdrop_amount_sol)
            .await;

        let mut funded = 0;
        let mut total = 0.0;
        for address in &addresses {
            if results.get(address).copied().unwrap_or(false) {
                funded += 1;
                let balance = self.faucet.get_balance(address).await;
                total += balance;
                info!("SOL received for {}: {} SOL", address, balance);
                self.context.recorder.lock().await.update_sol_balance(address, balance);
            } else {
                warn!("Failed to get SOL for {}", address);
            }
        }

        self.context.stats.lock().await.solana_balance = total;
        info!("SOL faucet completed: {}/{} successful", funded, addresses.len());
        if funded == 0 {
            bail!("No wallet received SOL");
        }
        Ok(())
    }

    async fn connect_browser(&mut self) -> Result<()> {
        self.browser.initialize().await?;
        self.browser.navigate(&self.config.rome.deposit_url).await?;

        let Some(primary) = self.wallets.first() else {
            bail!("No wallets to connect");
        };
        if !self.browser.connect_wallet(primary).await? {
            bail!("Failed to connect wallet to Rome Protocol");
        }
        if let Err(e) = self.browser.screenshot("wallet_connected").await {
            warn!("Screenshot failed: {}", e);
        }
        Ok(())
    }

    async fn bridge(&mut self) -> Result<()> {
        let result = self.browser.perform_bridge(BRIDGE_AMOUNT_SOL).await;
        if !result.success {
            bail!(result.error.unwrap_or_else(|| "Bridge operation failed".to_string()));
        }

        let balance = self.browser.check_balance().await;
        let r_sol = balance.parse::<f64>().unwrap_or(0.0);
        {
            let mut stats = self.context.stats.lock().await;
            stats.bridges_completed += 1;
            stats.r_sol_balance = r_sol;
        }
        if let Some(primary) = self.wallets.first() {
            self.context.recorder.lock().await.update_r_sol_balance(&primary.evm.address, r_sol);
        }
        info!("Bridge successful, rSOL balance: {}", balance);
        Ok(())
    }

    async fn deploy_contracts(&mut self, per_wallet: usize) -> Result<()> {
        let wallets = self.wallets.clone();
        let mut deployed = 0;
        for wallet in wallets.iter() {
            for _ in 0..per_wallet {
                let result = self.deployer.deploy_hello_world(wallet).await;
                if result.success {
                    deployed += 1;
                    self.context.contracts.lock().await.push(result.address.clone());
                    self.context.stats.lock().await.contracts_deployed += 1;
                    self.context
                        .recorder
                        .lock()
                        .await
                        .add_contract(&result.address, &wallet.evm.address, &result.hash);
                }
                sleep(self.deploy_gap).await;
            }
        }

        info!("Contract deployment completed: {} contracts deployed", deployed);
        if deployed == 0 {
            bail!("No contracts deployed");
        }
        Ok(())
    }

    /// Spawn the scheduler and let it run for the activity window; Cleanup stops it
    async fn start_mass_activity(&mut self) -> Result<()> {
        let mut scheduler = ActivityScheduler::new(
            self.sender.clone(),
            self.solana.clone(),
            self.wallets.clone(),
            ActivitySettings::from_config(&self.config.activity),
            self.context.clone(),
        )?;

        let token = CancellationToken::new();
        let child = token.child_token();
        let handle = tokio::spawn(async move { scheduler.run(child).await });
        self.activity = Some((token, handle));

        let window = Duration::from_secs(self.config.activity.window_secs);
        info!("Random activity running in background for {:?}", window);
        sleep(window).await;
        Ok(())
    }

    async fn submit_forms(&mut self) -> Result<()> {
        if !self.config.forms.is_complete() {
            warn!("Form configuration not complete, skipping reward forms");
            return Ok(());
        }

        let addresses: Vec<String> = self.wallets.iter().map(|w| w.evm.address.clone()).collect();
        let completed = self.context.stats.lock().await.transactions_completed;
        let per_wallet = completed / addresses.len().max(1) as u64;
        let counts = vec![per_wallet; addresses.len()];

        let results = self.forms.submit_multiple_forms(&addresses, &counts, None).await;
        let submitted = results.values().filter(|ok| **ok).count();
        info!("Reward forms submitted: {}/{} successful", submitted, addresses.len());
        if submitted == 0 {
            bail!("No reward forms submitted");
        }
        Ok(())
    }

    async fn cleanup(&mut self) {
        if let Some((token, handle)) = self.activity.take() {
            token.cancel();
            match handle.await {
                Ok(iterations) => info!("Mass activity finished after {} iterations", iterations),
                Err(e) => warn!("Mass activity task ended abnormally: {}", e),
            }
        }
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        info!("Automation cleanup completed");
    }

    /// Stamp the end time, write the final snapshot and the workbook
    async fn finish(&mut self) -> AutomationStats {
        let stats = {
            let mut stats = self.context.stats.lock().await;
            stats.finish();
            stats.clone()
        };
        self.save_progress().await;

        let mut recorder = self.context.recorder.lock().await;
        recorder.set_stats(&stats);
        match recorder.save() {
            Ok(Some(path)) => info!("Statistics workbook written to {:?}", path),
            Ok(None) => {}
            Err(e) => error!("Failed to write statistics workbook: {}", e),
        }
        info!("{}", stats.summary());
        stats
    }

    async fn save_progress(&self) {
        let snapshot = ProgressSnapshot {
            run_id: self.run_id,
            stage: self.stage.to_string(),
            stats: self.context.stats.lock().await.clone(),
            wallets: self.wallets.iter().map(WalletAddresses::from).collect(),
            deployed_contracts: self.context.contracts.lock().await.clone(),
            timestamp: Utc::now(),
        };
        if let Err(e) = snapshot.save(&self.config.progress_dir()) {
            warn!("Failed to save progress: {}", e);
        }
    }

    /// Restore stats and deployed contracts from a snapshot; wallets are not restored
    pub async fn load_progress(&mut self, path: &Path) -> Result<()> {
        let snapshot = ProgressSnapshot::load(path)?;
        *self.context.stats.lock().await = snapshot.stats;
        *self.context.contracts.lock().await = snapshot.deployed_contracts;
        info!("Progress from run {} restored", snapshot.run_id);
        Ok(())
    }

    pub async fn health_check(&self) -> HealthReport {
        let rome_connection = match self.sender.connector().connect(self.sender.current_endpoint(), None) {
            Ok(rpc) => match rpc.chain_id().await {
                Ok(chain_id) => {
                    if chain_id != self.config.rome.chain_id {
                        warn!("Rome RPC reports chain id {}, expected {}", chain_id, self.config.rome.chain_id);
                    }
                    true
                }
                Err(e) => {
                    warn!("Rome RPC unreachable: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("Rome RPC unreachable: {}", e);
                false
            }
        };

        let status_url = format!("{}/status", self.config.browser.webdriver_url.trim_end_matches('/'));
        let webdriver_available = matches!(self.http.get(&status_url).await, Ok(reply) if reply.is_success());

        let report = HealthReport {
            solana_connection: self.faucet.validate_connection().await,
            rome_connection,
            webdriver_available,
            config_valid: self.config.validate().is_ok() && !self.config.rpc_endpoints().is_empty(),
        };
        info!("Health check completed: {:?}", report);
        report
    }

    #[cfg(test)]
    fn immediate(mut self) -> Self {
        self.faucet = self.faucet.with_timings(crate::faucet::FaucetTimings::immediate());
        self.forms = self.forms.with_gap(Duration::ZERO);
        self.deploy_gap = Duration::ZERO;
        self
    }
}
