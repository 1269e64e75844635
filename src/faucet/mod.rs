/// Solana devnet funding with layered fallbacks.
///
/// Order per request: cooldown gate, balance short-circuit, direct RPC
/// airdrop, the configured web faucet (bounded exponential backoff on 429),
/// then each alternative faucet once.
use anyhow::Result;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::chain::solana::{lamports_to_sol, sol_to_lamports, SolanaRpc};
use crate::config::SolanaConfig;
use crate::http::HttpPoster;
use crate::orchestrator::calculate_retry_delay;

pub const AIRDROP_COOLDOWN: Duration = Duration::from_secs(8 * 60 * 60);
const SUFFICIENT_BALANCE_SOL: f64 = 1.0;

/// Endpoints tried after the configured faucet, each posted `{account, lamports}`
pub const ALTERNATIVE_FAUCETS: &[(&str, &str)] = &[
    ("Solana Devnet", "https://api.devnet.solana.com/airdrop"),
    ("Solana Official", "https://faucet.solana.com/api/v1/airdrop"),
];

#[derive(Debug, Clone)]
pub struct FaucetTimings {
    pub rate_limit_pause: Duration,
    pub web_retry_pause: Duration,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub alternative_gap: Duration,
    pub balance_poll: Duration,
    pub bulk_step_ms: u64,
    pub bulk_max_ms: u64,
}

impl Default for FaucetTimings {
    fn default() -> Self {
        Self {
            rate_limit_pause: Duration::from_secs(10),
            web_retry_pause: Duration::from_secs(2),
            backoff_initial_ms: 1000,
            backoff_max_ms: 30_000,
            alternative_gap: Duration::from_secs(3),
            balance_poll: Duration::from_secs(5),
            bulk_step_ms: 500,
            bulk_max_ms: 20_000,
        }
    }
}

impl FaucetTimings {
    #[cfg(test)]
    pub(crate) fn immediate() -> Self {
        Self {
            rate_limit_pause: Duration::ZERO,
            web_retry_pause: Duration::ZERO,
            backoff_initial_ms: 0,
            backoff_max_ms: 0,
            alternative_gap: Duration::ZERO,
            balance_poll: Duration::from_millis(1),
            bulk_step_ms: 0,
            bulk_max_ms: 0,
        }
    }
}

pub struct FaucetClient {
    rpc: Arc<dyn SolanaRpc>,
    http: Arc<dyn HttpPoster>,
    faucet_url: String,
    alternatives: Vec<(String, String)>,
    max_retries: u32,
    base_delay_ms: u64,
    timings: FaucetTimings,
    cooldown: Duration,
    last_request: Mutex<HashMap<String, Instant>>,
}

impl FaucetClient {
    pub fn new(config: &SolanaConfig, rpc: Arc<dyn SolanaRpc>, http: Arc<dyn HttpPoster>) -> Self {
        Self {
            rpc,
            http,
            faucet_url: config.faucet_url.clone(),
            alternatives: ALTERNATIVE_FAUCETS
                .iter()
                .map(|(name, url)| (name.to_string(), url.to_string()))
                .collect(),
            max_retries: config.max_retries.max(1),
            base_delay_ms: config.faucet_delay_ms,
            timings: FaucetTimings::default(),
            cooldown: AIRDROP_COOLDOWN,
            last_request: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timings(mut self, timings: FaucetTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_alternatives(mut self, alternatives: Vec<(String, String)>) -> Self {
        self.alternatives = alternatives;
        self
    }

    /// Fund `address` with `amount_sol`; `false` when every route failed or the cooldown is active
    pub async fn request_airdrop(&self, address: &str, amount_sol: f64) -> bool {
        if let Some(remaining) = self.time_until_next_request(address) {
            let hours = (remaining.as_secs() + 3599) / 3600;
            warn!("Airdrop cooldown active for {}, retry in ~{}h", address, hours);
            return false;
        }

        let balance = self.get_balance(address).await;
        if balance >= SUFFICIENT_BALANCE_SOL {
            info!("Wallet {} already holds {} SOL, skipping airdrop", address, balance);
            return true;
        }

        info!("Requesting {} SOL airdrop for {}", amount_sol, address);
        let lamports = sol_to_lamports(amount_sol);

        if self.try_rpc_airdrop(address, lamports).await {
            self.mark_requested(address);
            info!("Airdrop via RPC succeeded for {}", address);
            return true;
        }

        info!("Trying web faucet for {}", address);
        if self.try_web_faucet(address, lamports).await {
            self.mark_requested(address);
            return true;
        }

        info!("Trying alternative faucets for {}", address);
        if self.try_alternative_faucets(address, lamports).await {
            self.mark_requested(address);
            return true;
        }

        error!("All faucet routes failed for {}", address);
        false
    }

    async fn try_rpc_airdrop(&self, address: &str, lamports: u64) -> bool {
        let result: Result<bool> = async {
            let signature = self.rpc.request_airdrop(address, lamports).await?;
            self.rpc.confirm_transaction(&signature).await
        }
        .await;

        match result {
            Ok(true) => true,
            Ok(false) => {
                warn!("RPC airdrop for {} was not confirmed in time", address);
                false
            }
            Err(e) => {
                let message = e.to_string();
                if message.contains("429") || message.contains("Too Many Requests") {
                    warn!("RPC rate limit hit for {}, pausing {:?}", address, self.timings.rate_limit_pause);
                    sleep(self.timings.rate_limit_pause).await;
                } else {
                    warn!("RPC airdrop failed for {}: {}", address, message);
                }
                false
            }
        }
    }

    async fn try_web_faucet(&self, address: &str, lamports: u64) -> bool {
        let body = json!({ "publicKey": address, "amount": lamports });

        for attempt in 1..=self.max_retries {
            match self.http.post_json(&self.faucet_url, &body).await {
                Ok(reply) if reply.is_success() => {
                    info!("Web faucet funded {} (attempt {})", address, attempt);
                    return true;
                }
                Ok(reply) if reply.is_rate_limited() => {
                    let delay = calculate_retry_delay(
                        attempt,
                        self.timings.backoff_initial_ms,
                        self.timings.backoff_max_ms,
                    );
                    warn!(
                        "Web faucet rate limited (attempt {}/{}), backing off {}ms",
                        attempt, self.max_retries, delay
                    );
                    if attempt < self.max_retries {
                        sleep(Duration::from_millis(delay)).await;
                    }
                }
                Ok(reply) => {
                    warn!("Web faucet returned HTTP {} (attempt {})", reply.status, attempt);
                    if attempt < self.max_retries {
                        sleep(self.timings.web_retry_pause).await;
                    }
                }
                Err(e) => {
                    warn!("Web faucet request failed (attempt {}): {}", attempt, e);
                    if attempt < self.max_retries {
                        sleep(self.timings.web_retry_pause).await;
                    }
                }
            }
        }
        false
    }

    async fn try_alternative_faucets(&self, address: &str, lamports: u64) -> bool {
        let body = json!({ "account": address, "lamports": lamports });

        for (i, (name, url)) in self.alternatives.iter().enumerate() {
            if i > 0 {
                sleep(self.timings.alternative_gap).await;
            }
            match self.http.post_json(url, &body).await {
                Ok(reply) if reply.is_success() => {
                    info!("{} faucet funded {}", name, address);
                    return true;
                }
                Ok(reply) => debug!("{} faucet returned HTTP {}", name, reply.status),
                Err(e) => debug!("{} faucet failed: {}", name, e),
            }
        }
        false
    }

    /// Balance in SOL; RPC failures read as zero
    pub async fn get_balance(&self, address: &str) -> f64 {
        match self.rpc.get_balance(address).await {
            Ok(lamports) => lamports_to_sol(lamports),
            Err(e) => {
                error!("Failed to get balance for {}: {}", address, e);
                0.0
            }
        }
    }

    /// Poll until the balance reaches `min_sol` or `timeout` elapses
    pub async fn wait_for_balance(&self, address: &str, min_sol: f64, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            let balance = self.get_balance(address).await;
            if balance >= min_sol {
                info!("Balance confirmed for {}: {} SOL", address, balance);
                return true;
            }
            debug!("Waiting for balance on {}: {} / {} SOL", address, balance, min_sol);
            sleep(self.timings.balance_poll).await;
        }
        error!("Timed out waiting for balance on {}", address);
        false
    }

    /// Fund each address in turn; larger batches are spaced out further
    pub async fn request_multiple_airdrops(&self, addresses: &[String], amount_sol: f64) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for (i, address) in addresses.iter().enumerate() {
            let funded = self.request_airdrop(address, amount_sol).await;
            results.insert(address.clone(), funded);

            if i + 1 < addresses.len() {
                sleep(self.bulk_delay(addresses.len())).await;
            }
        }
        results
    }

    /// Gap between bulk requests for a batch of `count` wallets
    pub fn bulk_delay(&self, count: usize) -> Duration {
        let delay = self.base_delay_ms + count as u64 * self.timings.bulk_step_ms;
        Duration::from_millis(delay.min(self.timings.bulk_max_ms))
    }

    pub fn can_request_airdrop(&self, address: &str) -> bool {
        self.time_until_next_request(address).is_none()
    }

    /// Remaining cooldown for `address`, if any
    pub fn time_until_next_request(&self, address: &str) -> Option<Duration> {
        let last_request = self.last_request.lock().ok()?;
        let last = last_request.get(address)?;
        self.cooldown.checked_sub(last.elapsed()).filter(|d| !d.is_zero())
    }

    pub async fn validate_connection(&self) -> bool {
        match self.rpc.get_version().await {
            Ok(version) => {
                info!("Connected to Solana devnet, version {}", version);
                true
            }
            Err(e) => {
                error!("Failed to connect to Solana devnet: {}", e);
                false
            }
        }
    }

    fn mark_requested(&self, address: &str) {
        if let Ok(mut last_request) = self.last_request.lock() {
            last_request.insert(address.to_string(), Instant::now());
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeHttp, FakeSolana};
    use super::*;
    use crate::config::Config;
    use std::sync::atomic::Ordering;

    const ADDRESS: &str = "7Np41oeYqPefeNQEHSv1UDhYrehxin3NStELsSKCT4K2";

    fn faucet(rpc: Arc<FakeSolana>, http: Arc<FakeHttp>) -> FaucetClient {
        let config = Config::default();
        FaucetClient::new(&config.solana, rpc, http).with_timings(FaucetTimings::immediate())
    }

    #[tokio::test]
    async fn test_rpc_airdrop_success_sets_cooldown() {
        let rpc = Arc::new(FakeSolana::new(0, true));
        let http = Arc::new(FakeHttp::new(vec![500]));
        let faucet = faucet(rpc.clone(), http.clone());

        assert!(faucet.request_airdrop(ADDRESS, 1.0).await);
        assert!(!faucet.can_request_airdrop(ADDRESS));
        assert_eq!(http.request_count(), 0);
        assert!((faucet.get_balance(ADDRESS).await - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_cooldown_blocks_without_network() {
        let rpc = Arc::new(FakeSolana::new(0, true));
        let http = Arc::new(FakeHttp::new(vec![200]));
        let faucet = faucet(rpc.clone(), http.clone());

        assert!(faucet.request_airdrop(ADDRESS, 1.0).await);
        let rpc_calls = rpc.calls.load(Ordering::SeqCst);
        let http_calls = http.request_count();

        assert!(!faucet.request_airdrop(ADDRESS, 1.0).await);
        assert_eq!(rpc.calls.load(Ordering::SeqCst), rpc_calls);
        assert_eq!(http.request_count(), http_calls);
        assert!(faucet.time_until_next_request(ADDRESS).is_some());
    }

    #[tokio::test]
    async fn test_sufficient_balance_short_circuits() {
        let rpc = Arc::new(FakeSolana::new(2 * crate::chain::solana::LAMPORTS_PER_SOL, false));
        let http = Arc::new(FakeHttp::new(vec![500]));
        let faucet = faucet(rpc, http.clone());

        assert!(faucet.request_airdrop(ADDRESS, 1.0).await);
        assert_eq!(http.request_count(), 0);
        assert!(faucet.can_request_airdrop(ADDRESS));
    }

    #[tokio::test]
    async fn test_web_faucet_retries_after_rate_limit() {
        let rpc = Arc::new(FakeSolana {
            rate_limited: true,
            ..FakeSolana::new(0, false)
        });
        let http = Arc::new(FakeHttp::new(vec![429, 429, 200]));
        let faucet = faucet(rpc, http.clone());

        assert!(faucet.request_airdrop(ADDRESS, 1.0).await);
        assert_eq!(http.request_count(), 3);
    }

    #[tokio::test]
    async fn test_falls_back_to_alternatives() {
        let rpc = Arc::new(FakeSolana::new(0, false));
        // three web faucet failures, then the first alternative fails and the second succeeds
        let http = Arc::new(FakeHttp::new(vec![500, 500, 500, 503, 200]));
        let faucet = faucet(rpc, http.clone());

        assert!(faucet.request_airdrop(ADDRESS, 1.0).await);
        let requests = http.requests.lock().unwrap();
        assert_eq!(requests.len(), 5);
        assert_eq!(requests[4].0, ALTERNATIVE_FAUCETS[1].1);
        assert!(requests[4].1.contains("lamports"));
    }

    #[tokio::test]
    async fn test_all_routes_fail() {
        let rpc = Arc::new(FakeSolana::new(0, false));
        let http = Arc::new(FakeHttp::new(vec![500]));
        let faucet = faucet(rpc, http.clone());

        assert!(!faucet.request_airdrop(ADDRESS, 1.0).await);
        assert_eq!(http.request_count(), 3 + ALTERNATIVE_FAUCETS.len());
        assert!(faucet.can_request_airdrop(ADDRESS));
    }

    #[tokio::test]
    async fn test_wait_for_balance_times_out() {
        let rpc = Arc::new(FakeSolana::new(0, false));
        let faucet = faucet(rpc, Arc::new(FakeHttp::new(vec![500])));
        assert!(!faucet.wait_for_balance(ADDRESS, 0.1, Duration::from_millis(20)).await);
    }

    #[test]
    fn test_bulk_delay_scales_with_batch_size() {
        let mut config = Config::default();
        config.solana.faucet_delay_ms = 1000;
        let faucet = FaucetClient::new(
            &config.solana,
            Arc::new(FakeSolana::new(0, true)),
            Arc::new(FakeHttp::new(vec![200])),
        );

        assert_eq!(faucet.bulk_delay(3), Duration::from_millis(2500));
        assert_eq!(faucet.bulk_delay(10), Duration::from_millis(6000));
        assert_eq!(faucet.bulk_delay(100), Duration::from_millis(20_000));
    }

    #[tokio::test]
    async fn test_multiple_airdrops() {
        let rpc = Arc::new(FakeSolana::new(0, true));
        let faucet = faucet(rpc, Arc::new(FakeHttp::new(vec![500])));
        let addresses = vec![ADDRESS.to_string(), "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".to_string()];

        let results = faucet.request_multiple_airdrops(&addresses, 1.0).await;
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|funded| *funded));
    }

    #[tokio::test]
    async fn test_validate_connection() {
        let rpc = Arc::new(FakeSolana::new(0, false));
        let faucet = faucet(rpc, Arc::new(FakeHttp::new(vec![500])));
        assert!(faucet.validate_connection().await);
    }
}
