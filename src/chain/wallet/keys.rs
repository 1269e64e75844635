use alloy::primitives::Address;
use anyhow::{anyhow, Result};
use bip32::{ChildNumber, XPrv};
use bip39::Mnemonic;
use ed25519_dalek::SigningKey;
use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use tiny_keccak::{Hasher, Keccak};
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha512 = Hmac<Sha512>;

const SLIP10_ED25519_KEY: &[u8] = b"ed25519 seed";
const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Solana half of a wallet pair: base58 public key, hex of the 64-byte keypair
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SolanaKeys {
    #[zeroize(skip)]
    pub public_key: String,
    pub private_key: String,
}

/// EVM half of a wallet pair: checksummed address, 0x-prefixed secret key
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EvmKeys {
    #[zeroize(skip)]
    pub address: String,
    pub private_key: String,
}

/// Solana and EVM keys derived from the same seed at the same index
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletPair {
    pub solana: SolanaKeys,
    pub evm: EvmKeys,
}

impl std::fmt::Debug for WalletPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletPair")
            .field("solana", &self.solana.public_key)
            .field("evm", &self.evm.address)
            .finish()
    }
}

impl WalletPair {
    /// Derive the pair at `index` from a BIP39 phrase
    pub fn from_mnemonic(phrase: &str, passphrase: &str, index: u32) -> Result<Self> {
        let mnemonic = Mnemonic::parse(phrase)?;
        let mut seed = mnemonic.to_seed(passphrase);
        let pair = Self::from_seed(&seed, index);
        seed.zeroize();
        pair
    }

    pub fn from_seed(seed: &[u8], index: u32) -> Result<Self> {
        let solana = derive_solana_keys(seed, index)?;
        let evm = derive_evm_keys(seed, index)?;
        Ok(Self { solana, evm })
    }
}

impl EvmKeys {
    pub fn parsed_address(&self) -> Result<Address> {
        self.address
            .parse()
            .map_err(|e| anyhow!("Invalid EVM address {}: {}", self.address, e))
    }

    /// Raw 32-byte secret key
    pub fn secret_bytes(&self) -> Result<[u8; 32]> {
        let raw = hex::decode(self.private_key.trim_start_matches("0x"))?;
        raw.as_slice()
            .try_into()
            .map_err(|_| anyhow!("EVM private key must be 32 bytes, got {}", raw.len()))
    }
}

impl SolanaKeys {
    pub fn signing_key(&self) -> Result<SigningKey> {
        let raw = hex::decode(&self.private_key)?;
        let keypair: [u8; 64] = raw
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("Solana keypair must be 64 bytes, got {}", raw.len()))?;
        Ok(SigningKey::from_keypair_bytes(&keypair)?)
    }
}

/// SLIP-10 ed25519 derivation along m/44'/501'/index'/0'
fn derive_solana_keys(seed: &[u8], index: u32) -> Result<SolanaKeys> {
    let mut mac = HmacSha512::new_from_slice(SLIP10_ED25519_KEY)
        .map_err(|e| anyhow!("Failed to initialise SLIP-10 master key: {}", e))?;
    mac.update(seed);
    let master = mac.finalize().into_bytes();

    let mut key = [0u8; 32];
    let mut chain_code = [0u8; 32];
    key.copy_from_slice(&master[..32]);
    chain_code.copy_from_slice(&master[32..]);

    // ed25519 only supports hardened children
    for segment in [44, 501, index, 0] {
        let mut mac = HmacSha512::new_from_slice(&chain_code)
            .map_err(|e| anyhow!("Failed to derive Solana child key: {}", e))?;
        mac.update(&[0u8]);
        mac.update(&key);
        mac.update(&(segment | HARDENED_OFFSET).to_be_bytes());
        let child = mac.finalize().into_bytes();
        key.copy_from_slice(&child[..32]);
        chain_code.copy_from_slice(&child[32..]);
    }

    let signing_key = SigningKey::from_bytes(&key);
    key.zeroize();
    chain_code.zeroize();

    let public_key = bs58::encode(signing_key.verifying_key().as_bytes()).into_string();
    let mut keypair = signing_key.to_keypair_bytes();
    let private_key = hex::encode(keypair);
    keypair.zeroize();

    Ok(SolanaKeys {
        public_key,
        private_key,
    })
}

/// BIP32 secp256k1 derivation along m/44'/60'/0'/0/index
fn derive_evm_keys(seed: &[u8], index: u32) -> Result<EvmKeys> {
    let xprv = XPrv::new(seed)
        .map_err(|e| anyhow!("Failed to create XPrv from seed: {}", e))?;

    let derived = xprv
        .derive_child(ChildNumber::new(44, true)?)
        .and_then(|k| k.derive_child(ChildNumber::new(60, true)?))
        .and_then(|k| k.derive_child(ChildNumber::new(0, true)?))
        .and_then(|k| k.derive_child(ChildNumber::new(0, false)?))
        .and_then(|k| k.derive_child(ChildNumber::new(index, false)?))
        .map_err(|e| anyhow!("Failed to derive key: {}", e))?;

    let mut secret = derived.to_bytes();
    let secp = Secp256k1::new();
    let secret_key = SecretKey::from_slice(&secret)?;
    let public_key = PublicKey::from_secret_key(&secp, &secret_key);

    let address = evm_address(&public_key);
    let private_key = format!("0x{}", hex::encode(secret));
    secret.zeroize();

    Ok(EvmKeys {
        address: address.to_checksum(None),
        private_key,
    })
}

fn evm_address(public_key: &PublicKey) -> Address {
    // Keccak of the 64 coordinate bytes, without the 0x04 prefix
    let pubkey_bytes = public_key.serialize_uncompressed();
    let mut hasher = Keccak::v256();
    let mut hash = [0u8; 32];
    hasher.update(&pubkey_bytes[1..]);
    hasher.finalize(&mut hash);
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_evm_known_vector() {
        // Widely published first account for the all-"abandon" phrase
        let pair = WalletPair::from_mnemonic(MNEMONIC, "", 0).unwrap();
        assert_eq!(pair.evm.address, "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");
        assert_eq!(pair.evm.private_key.len(), 66);
    }

    #[test]
    fn test_solana_key_shape() {
        let pair = WalletPair::from_mnemonic(MNEMONIC, "", 0).unwrap();
        let decoded = bs58::decode(&pair.solana.public_key).into_vec().unwrap();
        assert_eq!(decoded.len(), 32);
        assert_eq!(pair.solana.private_key.len(), 128);

        // Second half of the keypair is the public key
        let signing_key = pair.solana.signing_key().unwrap();
        assert_eq!(signing_key.verifying_key().as_bytes().to_vec(), decoded);
    }

    #[test]
    fn test_indices_produce_distinct_wallets() {
        let first = WalletPair::from_mnemonic(MNEMONIC, "", 0).unwrap();
        let second = WalletPair::from_mnemonic(MNEMONIC, "", 1).unwrap();
        assert_ne!(first.evm.address, second.evm.address);
        assert_ne!(first.solana.public_key, second.solana.public_key);
    }

    #[test]
    fn test_secret_bytes_round_trip() {
        let pair = WalletPair::from_mnemonic(MNEMONIC, "", 3).unwrap();
        let secret = pair.evm.secret_bytes().unwrap();
        assert_eq!(format!("0x{}", hex::encode(secret)), pair.evm.private_key);
        assert!(pair.evm.parsed_address().is_ok());
    }

    #[test]
    fn test_debug_hides_private_keys() {
        let pair = WalletPair::from_mnemonic(MNEMONIC, "", 0).unwrap();
        let rendered = format!("{:?}", pair);
        assert!(!rendered.contains(&pair.evm.private_key));
        assert!(!rendered.contains(&pair.solana.private_key));
    }
}
