pub mod contracts;
pub mod evm;
pub mod solana;
pub mod types;
pub mod wallet;

pub use evm::{AlloyConnector, EvmConnector, EvmRpc, TxReceipt};
pub use solana::{SolanaRpc, SolanaRpcClient};
pub use types::{BridgeResult, ContractDeployResult, TransactionResult};
pub use wallet::{EvmKeys, SolanaKeys, WalletGenerator, WalletPair, WalletVault};
