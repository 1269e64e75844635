/// HelloWorld deployment and interaction on top of the failover sender
use alloy::network::TransactionBuilder;
use alloy::primitives::utils::format_ether;
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{info, warn};

use super::transaction_manager::{TransactionSender, DEFAULT_GAS_PRICE_WEI, DEPLOY_GAS_BUFFER};
use crate::chain::contracts::{decode_greeting, greet_calldata, hello_world_bytecode, set_greeting_calldata};
use crate::chain::wallet::WalletPair;
use crate::chain::ContractDeployResult;

pub struct ContractDeployer {
    sender: Arc<TransactionSender>,
}

impl ContractDeployer {
    pub fn new(sender: Arc<TransactionSender>) -> Self {
        Self { sender }
    }

    pub async fn deploy_hello_world(&self, wallet: &WalletPair) -> ContractDeployResult {
        let code = match hello_world_bytecode() {
            Ok(code) => code,
            Err(e) => {
                return ContractDeployResult {
                    address: String::new(),
                    hash: String::new(),
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        };

        info!("Deploying HelloWorld from {}", wallet.evm.address);
        let result = self.sender.deploy_contract(&wallet.evm, code).await;
        if result.success {
            info!("HelloWorld deployed at {} ({})", result.address, result.hash);
            match self.read_greeting(&result.address).await {
                Ok(greeting) => info!("Contract greeting: {}", greeting),
                Err(e) => warn!("Deployed contract did not answer greet(): {}", e),
            }
        } else {
            warn!(
                "HelloWorld deployment from {} failed: {}",
                wallet.evm.address,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        result
    }

    /// Deploy `per_wallet` contracts from every wallet, in wallet order
    pub async fn deploy_multiple(&self, wallets: &[WalletPair], per_wallet: usize) -> Vec<ContractDeployResult> {
        let mut results = Vec::with_capacity(wallets.len() * per_wallet);
        for wallet in wallets {
            for _ in 0..per_wallet {
                results.push(self.deploy_hello_world(wallet).await);
            }
        }
        results
    }

    /// Set a new greeting and read it back; returns the greeting on success
    pub async fn interact_with_contract(
        &self,
        contract: &str,
        wallet: &WalletPair,
        greeting: &str,
    ) -> Result<String> {
        let result = self
            .sender
            .send_contract_call(&wallet.evm, contract, set_greeting_calldata(greeting))
            .await;
        if !result.success {
            return Err(anyhow!(
                "setGreeting on {} failed: {}",
                contract,
                result.error.unwrap_or_default()
            ));
        }
        info!("Updated greeting on {}. Transaction: {}", contract, result.hash);

        let current = self.read_greeting(contract).await?;
        info!("Current greeting: {}", current);
        Ok(current)
    }

    pub async fn read_greeting(&self, contract: &str) -> Result<String> {
        let data = self.sender.read_call(contract, greet_calldata()).await?;
        decode_greeting(&data)
    }

    /// True when code exists at `contract`
    pub async fn verify_contract(&self, contract: &str) -> bool {
        let result: Result<Bytes> = async {
            let address: Address = contract.parse()?;
            let rpc = self.sender.connector().connect(self.sender.current_endpoint(), None)?;
            rpc.code_at(address).await
        }
        .await;

        match result {
            Ok(code) => !code.is_empty(),
            Err(e) => {
                warn!("Contract verification for {} failed: {}", contract, e);
                false
            }
        }
    }

    /// Estimated deployment fee in ETH
    pub async fn estimate_deployment_cost(&self, wallet: &WalletPair) -> Result<String> {
        let from = wallet.evm.parsed_address()?;
        let rpc = self
            .sender
            .connector()
            .connect(self.sender.current_endpoint(), None)?;
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_deploy_code(hello_world_bytecode()?);
        let gas = rpc.estimate_gas(&tx).await? + DEPLOY_GAS_BUFFER;
        let gas_price = rpc.gas_price().await.unwrap_or(DEFAULT_GAS_PRICE_WEI);
        Ok(format_ether(U256::from(gas) * U256::from(gas_price)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::evm::testing::FakeChain;
    use crate::orchestrator::transaction_manager::SenderConfig;
    use alloy::primitives::utils::parse_ether;
    use std::time::Duration;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn deployer(chain: &Arc<FakeChain>) -> ContractDeployer {
        let config = SenderConfig {
            endpoints: vec!["http://rpc-a".to_string(), "http://rpc-b".to_string()],
            throttle: Duration::ZERO,
            retry_backoff: Duration::ZERO,
            batch_size: 10,
            batch_delay: Duration::ZERO,
            max_transactions: 100,
        };
        ContractDeployer::new(Arc::new(TransactionSender::new(config, chain.connector()).unwrap()))
    }

    #[tokio::test]
    async fn test_deploy_and_interact() {
        let chain = Arc::new(FakeChain::new(parse_ether("1").unwrap()));
        let deployer = deployer(&chain);
        let wallet = WalletPair::from_mnemonic(MNEMONIC, "", 0).unwrap();

        let deployed = deployer.deploy_hello_world(&wallet).await;
        assert!(deployed.success);
        assert!(deployer.verify_contract(&deployed.address).await);

        let greeting = deployer
            .interact_with_contract(&deployed.address, &wallet, "Hello Rome!")
            .await
            .unwrap();
        assert_eq!(greeting, "Hello, World!");
        assert_eq!(chain.broadcast_count(), 2);
    }

    #[tokio::test]
    async fn test_deploy_multiple() {
        let chain = Arc::new(FakeChain::new(parse_ether("1").unwrap()));
        let deployer = deployer(&chain);
        let wallets: Vec<WalletPair> = (0..2)
            .map(|i| WalletPair::from_mnemonic(MNEMONIC, "", i).unwrap())
            .collect();

        let results = deployer.deploy_multiple(&wallets, 2).await;
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn test_deploy_without_funds_fails() {
        let chain = Arc::new(FakeChain::new(U256::ZERO));
        let deployer = deployer(&chain);
        let wallet = WalletPair::from_mnemonic(MNEMONIC, "", 0).unwrap();

        let deployed = deployer.deploy_hello_world(&wallet).await;
        assert!(!deployed.success);
        assert!(deployed.error.unwrap().contains("Insufficient balance"));
        assert_eq!(chain.broadcast_count(), 0);
    }

    #[tokio::test]
    async fn test_estimate_deployment_cost() {
        let chain = Arc::new(FakeChain::new(U256::ZERO));
        let deployer = deployer(&chain);
        let wallet = WalletPair::from_mnemonic(MNEMONIC, "", 0).unwrap();

        // (21_000 + 50_000) gas at 1 gwei
        let cost = deployer.estimate_deployment_cost(&wallet).await.unwrap();
        assert_eq!(cost, format_ether(U256::from(71_000u64) * U256::from(1_000_000_000u64)));
    }
}
