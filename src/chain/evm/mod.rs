/// EVM chain access used by the sender, deployer and activity handlers.
///
/// `EvmConnector` builds an `EvmRpc` bound to one endpoint (and optionally a
/// signer). The sender reconnects on every attempt so failover only has to
/// move its endpoint cursor.
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use anyhow::Result;
use async_trait::async_trait;

use crate::chain::wallet::EvmKeys;

mod alloy_client;
pub use alloy_client::AlloyConnector;

/// Summary of a mined transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TxReceipt {
    pub hash: TxHash,
    pub success: bool,
    pub gas_used: u64,
    pub contract_address: Option<Address>,
}

#[async_trait]
pub trait EvmRpc: Send + Sync {
    async fn balance(&self, address: Address) -> Result<U256>;
    async fn gas_price(&self) -> Result<u128>;
    async fn pending_nonce(&self, address: Address) -> Result<u64>;
    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64>;
    /// Broadcast and wait for one confirmation
    async fn send_and_confirm(&self, tx: TransactionRequest) -> Result<TxReceipt>;
    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes>;
    async fn code_at(&self, address: Address) -> Result<Bytes>;
    async fn chain_id(&self) -> Result<u64>;
}

pub trait EvmConnector: Send + Sync {
    fn connect(&self, url: &str, signer: Option<&EvmKeys>) -> Result<Box<dyn EvmRpc>>;
}
