use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{sleep, Instant};

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// The subset of Solana JSON-RPC the automation needs
#[async_trait]
pub trait SolanaRpc: Send + Sync {
    /// Balance in lamports at confirmed commitment
    async fn get_balance(&self, address: &str) -> Result<u64>;
    /// Returns the airdrop transaction signature
    async fn request_airdrop(&self, address: &str, lamports: u64) -> Result<String>;
    /// Poll until the signature reaches confirmed status
    async fn confirm_transaction(&self, signature: &str) -> Result<bool>;
    async fn get_version(&self) -> Result<String>;
}

pub struct SolanaRpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl SolanaRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
            confirm_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
        })
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            bail!("{} 429 Too Many Requests", method);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("{} failed with HTTP {}: {}", method, status, text);
        }

        let payload: Value = response.json().await?;
        parse_rpc_response(payload)
    }
}

/// Extract `result` from a JSON-RPC envelope or turn `error` into an `Err`
fn parse_rpc_response(payload: Value) -> Result<Value> {
    if let Some(error) = payload.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        bail!("RPC error {}: {}", code, message);
    }
    payload
        .get("result")
        .cloned()
        .ok_or_else(|| anyhow!("RPC response without result"))
}

#[async_trait]
impl SolanaRpc for SolanaRpcClient {
    async fn get_balance(&self, address: &str) -> Result<u64> {
        let result = self
            .request("getBalance", json!([address, { "commitment": "confirmed" }]))
            .await?;
        result
            .get("value")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("Malformed getBalance response: {}", result))
    }

    async fn request_airdrop(&self, address: &str, lamports: u64) -> Result<String> {
        let result = self.request("requestAirdrop", json!([address, lamports])).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Malformed requestAirdrop response: {}", result))
    }

    async fn confirm_transaction(&self, signature: &str) -> Result<bool> {
        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            let result = self
                .request(
                    "getSignatureStatuses",
                    json!([[signature], { "searchTransactionHistory": true }]),
                )
                .await?;

            if let Some(status) = result.get("value").and_then(|v| v.get(0)).filter(|s| !s.is_null()) {
                if let Some(err) = status.get("err").filter(|e| !e.is_null()) {
                    bail!("Transaction {} failed: {}", signature, err);
                }
                let level = status
                    .get("confirmationStatus")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if level == "confirmed" || level == "finalized" {
                    return Ok(true);
                }
            }

            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn get_version(&self) -> Result<String> {
        let result = self.request("getVersion", json!([])).await?;
        Ok(result
            .get("solana-core")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result() {
        let value = parse_rpc_response(json!({"jsonrpc": "2.0", "id": 1, "result": {"value": 42}})).unwrap();
        assert_eq!(value["value"], 42);
    }

    #[test]
    fn test_parse_error() {
        let err = parse_rpc_response(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32600, "message": "airdrop limit reached"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("airdrop limit reached"));
    }

    #[test]
    fn test_lamport_conversion() {
        assert_eq!(sol_to_lamports(1.0), LAMPORTS_PER_SOL);
        assert_eq!(sol_to_lamports(0.5), 500_000_000);
        assert!((lamports_to_sol(2_500_000_000) - 2.5).abs() < f64::EPSILON);
    }
}
