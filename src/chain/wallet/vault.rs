use aes::Aes256;
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use super::keys::WalletPair;
use crate::config::MIN_ENCRYPTION_KEY_LEN;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const PBKDF2_ROUNDS: u32 = 10_000;
const SALT_LEN: usize = 16;
const IV_LEN: usize = 16;

/// On-disk form of a wallet pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncryptedWallet {
    /// base64 AES-256-CBC ciphertext of the JSON-encoded pair
    pub encrypted: String,
    /// hex salt for PBKDF2
    pub salt: String,
    /// hex CBC initialisation vector
    pub iv: String,
}

/// Encrypts wallet pairs and keeps them under a directory
pub struct WalletVault {
    passphrase: Zeroizing<String>,
    dir: PathBuf,
}

impl WalletVault {
    pub fn new(encryption_key: &str, dir: impl Into<PathBuf>) -> Result<Self> {
        if encryption_key.chars().count() < MIN_ENCRYPTION_KEY_LEN {
            bail!("Encryption key must be at least {} characters", MIN_ENCRYPTION_KEY_LEN);
        }
        Ok(Self {
            passphrase: Zeroizing::new(encryption_key.to_string()),
            dir: dir.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn encrypt(&self, pair: &WalletPair) -> Result<EncryptedWallet> {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut iv);

        let key = self.derive_key(&salt);
        let plaintext = Zeroizing::new(serde_json::to_vec(pair)?);

        let cipher = Aes256CbcEnc::new_from_slices(key.as_slice(), &iv)
            .map_err(|_| anyhow!("Invalid key or IV length"))?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

        Ok(EncryptedWallet {
            encrypted: STANDARD.encode(ciphertext),
            salt: hex::encode(salt),
            iv: hex::encode(iv),
        })
    }

    pub fn decrypt(&self, wallet: &EncryptedWallet) -> Result<WalletPair> {
        let salt = hex::decode(&wallet.salt).context("Invalid salt encoding")?;
        let iv = hex::decode(&wallet.iv).context("Invalid IV encoding")?;
        let ciphertext = STANDARD
            .decode(&wallet.encrypted)
            .context("Invalid ciphertext encoding")?;

        let key = self.derive_key(&salt);
        let cipher = Aes256CbcDec::new_from_slices(key.as_slice(), &iv)
            .map_err(|_| anyhow!("Invalid key or IV length"))?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
                .map_err(|_| anyhow!("Failed to decrypt wallet: wrong key or corrupted data"))?,
        );

        serde_json::from_slice(&plaintext).context("Decrypted wallet is not valid JSON")
    }

    /// Encrypt and write `wallet_<index>_<unix ms>.json`, returning the path
    pub fn save(&self, pair: &WalletPair, index: usize) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let encrypted = self.encrypt(pair)?;
        let path = self.dir.join(format!(
            "wallet_{}_{}.json",
            index,
            chrono::Utc::now().timestamp_millis()
        ));
        fs::write(&path, serde_json::to_string_pretty(&encrypted)?)?;
        log::debug!("Wallet {} saved to {:?}", index, path);
        Ok(path)
    }

    pub fn load(&self, path: &Path) -> Result<WalletPair> {
        let serialized = fs::read_to_string(path)?;
        let encrypted: EncryptedWallet = serde_json::from_str(&serialized)?;
        self.decrypt(&encrypted)
    }

    /// Load every wallet file in the vault directory, in file-name order
    pub fn load_all(&self) -> Result<Vec<WalletPair>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension().map_or(false, |ext| ext == "json")
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .map_or(false, |n| n.starts_with("wallet_"))
            })
            .collect();
        paths.sort_by_key(|p| (wallet_index(p), p.clone()));
        paths.iter().map(|p| self.load(p)).collect()
    }

    fn derive_key(&self, salt: &[u8]) -> Zeroizing<[u8; 32]> {
        let mut key = Zeroizing::new([0u8; 32]);
        pbkdf2::pbkdf2_hmac::<Sha256>(self.passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut key[..]);
        key
    }
}

fn wallet_index(path: &Path) -> usize {
    path.file_stem()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('_').nth(1))
        .and_then(|i| i.parse().ok())
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef0123456789abcdef";
    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let vault = WalletVault::new(KEY, "unused").unwrap();
        let pair = WalletPair::from_mnemonic(MNEMONIC, "", 0).unwrap();

        let encrypted = vault.encrypt(&pair).unwrap();
        assert_eq!(hex::decode(&encrypted.salt).unwrap().len(), SALT_LEN);
        assert_eq!(hex::decode(&encrypted.iv).unwrap().len(), IV_LEN);

        let decrypted = vault.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted, pair);
    }

    #[test]
    fn test_wrong_key_fails() {
        let vault = WalletVault::new(KEY, "unused").unwrap();
        let other = WalletVault::new("fedcba9876543210fedcba9876543210-other", "unused").unwrap();
        let pair = WalletPair::from_mnemonic(MNEMONIC, "", 0).unwrap();

        for _ in 0..8 {
            let encrypted = vault.encrypt(&pair).unwrap();
            assert!(other.decrypt(&encrypted).is_err());
            assert_eq!(vault.decrypt(&encrypted).unwrap(), pair);
        }
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(WalletVault::new("short", "unused").is_err());
    }

    #[test]
    fn test_save_and_load_all() {
        let dir = tempfile::tempdir().unwrap();
        let vault = WalletVault::new(KEY, dir.path().join("wallets")).unwrap();

        let pairs: Vec<WalletPair> = (0..2)
            .map(|i| WalletPair::from_mnemonic(MNEMONIC, "", i).unwrap())
            .collect();
        for (i, pair) in pairs.iter().enumerate() {
            vault.save(pair, i).unwrap();
        }

        let loaded = vault.load_all().unwrap();
        assert_eq!(loaded, pairs);
    }
}
