mod keys;
mod vault;

pub use keys::{EvmKeys, SolanaKeys, WalletPair};
pub use vault::{EncryptedWallet, WalletVault};

use anyhow::Result;
use bip39::Mnemonic;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

/// Derives wallet pairs from one seed phrase and persists them encrypted
pub struct WalletGenerator {
    phrase: Zeroizing<String>,
    vault: WalletVault,
}

impl WalletGenerator {
    /// Use the configured phrase, or a fresh 12-word phrase when none is given
    pub fn new(seed_phrase: Option<&str>, vault: WalletVault) -> Result<Self> {
        let phrase = match seed_phrase {
            Some(phrase) => {
                Mnemonic::parse(phrase)?;
                phrase.to_string()
            }
            None => {
                let mut entropy = [0u8; 16];
                rand::thread_rng().fill_bytes(&mut entropy);
                let mnemonic = Mnemonic::from_entropy(&entropy)?;
                entropy.zeroize();
                log::warn!("No SEED_PHRASE configured, generated a one-off phrase for this run");
                mnemonic.to_string()
            }
        };
        Ok(Self {
            phrase: Zeroizing::new(phrase),
            vault,
        })
    }

    pub fn vault(&self) -> &WalletVault {
        &self.vault
    }

    pub fn derive(&self, index: u32) -> Result<WalletPair> {
        WalletPair::from_mnemonic(&self.phrase, "", index)
    }

    /// Derive `count` pairs starting at index 0 and write each to the vault
    pub fn generate_multiple(&self, count: usize) -> Result<Vec<WalletPair>> {
        let mut wallets = Vec::with_capacity(count);
        for index in 0..count {
            let pair = self.derive(index as u32)?;
            self.vault.save(&pair, index)?;
            log::info!(
                "Generated wallet {}: solana={} evm={}",
                index + 1,
                pair.solana.public_key,
                pair.evm.address
            );
            wallets.push(pair);
        }
        Ok(wallets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef0123456789abcdef";
    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_deterministic_generation() {
        let dir = tempfile::tempdir().unwrap();
        let first = WalletGenerator::new(Some(MNEMONIC), WalletVault::new(KEY, dir.path().join("a")).unwrap()).unwrap();
        let second = WalletGenerator::new(Some(MNEMONIC), WalletVault::new(KEY, dir.path().join("b")).unwrap()).unwrap();

        let a = first.generate_multiple(3).unwrap();
        let b = second.generate_multiple(3).unwrap();
        assert_eq!(a, b);
        assert_eq!(first.derive(2).unwrap(), a[2]);
    }

    #[test]
    fn test_generated_wallets_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let generator = WalletGenerator::new(Some(MNEMONIC), WalletVault::new(KEY, dir.path()).unwrap()).unwrap();

        let wallets = generator.generate_multiple(2).unwrap();
        let restored = generator.vault().load_all().unwrap();
        assert_eq!(restored, wallets);
    }

    #[test]
    fn test_random_phrase_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        let generator = WalletGenerator::new(None, WalletVault::new(KEY, dir.path()).unwrap()).unwrap();
        let pair = generator.derive(0).unwrap();
        assert!(pair.evm.address.starts_with("0x"));
    }

    #[test]
    fn test_invalid_phrase_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = WalletGenerator::new(Some("not a mnemonic"), WalletVault::new(KEY, dir.path()).unwrap());
        assert!(result.is_err());
    }
}
