use alloy::eips::BlockId;
use alloy::network::{EthereumWallet, ReceiptResponse};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::{EvmConnector, EvmRpc, TxReceipt};
use crate::chain::wallet::EvmKeys;

/// Builds alloy HTTP providers, with a local signer when keys are supplied
#[derive(Debug, Clone)]
pub struct AlloyConnector {
    confirmation_timeout: Duration,
}

impl AlloyConnector {
    pub fn new(confirmation_timeout: Duration) -> Self {
        Self { confirmation_timeout }
    }
}

impl Default for AlloyConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

impl EvmConnector for AlloyConnector {
    fn connect(&self, url: &str, signer: Option<&EvmKeys>) -> Result<Box<dyn EvmRpc>> {
        let url: Url = url
            .parse()
            .map_err(|e| anyhow!("Invalid RPC url {}: {}", url, e))?;

        let provider = match signer {
            Some(keys) => {
                let signer = PrivateKeySigner::from_bytes(&B256::from(keys.secret_bytes()?))?;
                ProviderBuilder::new()
                    .wallet(EthereumWallet::from(signer))
                    .connect_http(url)
                    .erased()
            }
            None => ProviderBuilder::new().connect_http(url).erased(),
        };

        Ok(Box::new(AlloyRpc {
            provider,
            confirmation_timeout: self.confirmation_timeout,
        }))
    }
}

struct AlloyRpc {
    provider: DynProvider,
    confirmation_timeout: Duration,
}

#[async_trait]
impl EvmRpc for AlloyRpc {
    async fn balance(&self, address: Address) -> Result<U256> {
        Ok(self.provider.get_balance(address).await?)
    }

    async fn gas_price(&self) -> Result<u128> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        Ok(self
            .provider
            .get_transaction_count(address)
            .block_id(BlockId::pending())
            .await?)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        Ok(self.provider.estimate_gas(tx.clone()).await?)
    }

    async fn send_and_confirm(&self, tx: TransactionRequest) -> Result<TxReceipt> {
        let receipt = self
            .provider
            .send_transaction(tx)
            .await?
            .with_required_confirmations(1)
            .with_timeout(Some(self.confirmation_timeout))
            .get_receipt()
            .await?;

        Ok(TxReceipt {
            hash: receipt.transaction_hash,
            success: receipt.status(),
            gas_used: receipt.gas_used() as u64,
            contract_address: receipt.contract_address,
        })
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes> {
        Ok(self.provider.call(tx.clone()).await?)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        Ok(self.provider.get_code_at(address).await?)
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.provider.get_chain_id().await?)
    }
}
