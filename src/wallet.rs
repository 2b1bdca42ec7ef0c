//! Local-key signer for EVM-family networks.
//!
//! # Security
//! - Private keys are loaded from a hex string or an environment variable
//! - Keys are never logged or serialized

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer as _;
use async_trait::async_trait;

use crate::error::{BtpError, BtpResult};
use crate::provider::signer::Signer;
use crate::provider::types::NetworkType;

/// Environment variable name for the private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "BTP_EVM_PRIVATE_KEY";

const SUPPORTED_TYPES: &[&str] = &["evm", "eth", "eth2", "bsc"];

/// Signs EIP-191 personal messages with a local private key.
#[derive(Debug, Clone)]
pub struct EvmWallet {
    signer: PrivateKeySigner,
}

impl EvmWallet {
    /// Create a wallet from a hex-encoded private key (with or without 0x prefix).
    pub fn from_private_key(private_key_hex: &str) -> BtpResult<Self> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);
        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| BtpError::Signer(format!("Invalid private key format: {}", e)))?;

        tracing::info!(address = %signer.address(), "EVM wallet initialized");
        Ok(Self { signer })
    }

    /// Load the wallet from `BTP_EVM_PRIVATE_KEY`.
    pub fn from_env() -> BtpResult<Self> {
        let private_key = std::env::var(PRIVATE_KEY_ENV_VAR).map_err(|_| {
            BtpError::Signer(format!(
                "Environment variable {} not set",
                PRIVATE_KEY_ENV_VAR
            ))
        })?;
        Self::from_private_key(&private_key)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    fn check(&self, network_type: &NetworkType) -> BtpResult<()> {
        if self.supports(network_type) {
            Ok(())
        } else {
            Err(BtpError::InvalidArgument(format!(
                "unsupported network type - type({network_type})"
            )))
        }
    }
}

#[async_trait]
impl Signer for EvmWallet {
    fn supports(&self, network_type: &NetworkType) -> bool {
        SUPPORTED_TYPES.contains(&network_type.as_str())
    }

    async fn address(&self, network_type: &NetworkType) -> BtpResult<String> {
        self.check(network_type)?;
        Ok(self.signer.address().to_string())
    }

    async fn sign(&self, network_type: &NetworkType, message: &str) -> BtpResult<String> {
        self.check(network_type)?;
        let bytes = hex::decode(message.strip_prefix("0x").unwrap_or(message))
            .map_err(|e| BtpError::InvalidArgument(format!("message is not hex: {e}")))?;
        let signature = self
            .signer
            .sign_message(&bytes)
            .await
            .map_err(|e| BtpError::Signer(format!("Message signing failed: {}", e)))?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Anvil's first account
    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_wallet_from_private_key() {
        let wallet = EvmWallet::from_private_key(&format!("0x{}", TEST_PRIVATE_KEY)).unwrap();
        assert_eq!(
            wallet.address().to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_invalid_private_key() {
        let err = EvmWallet::from_private_key("invalid_key").unwrap_err();
        assert!(err.to_string().contains("Invalid private key"));
    }

    #[tokio::test]
    async fn test_address_per_network_type() {
        let wallet = EvmWallet::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let address = wallet.address();
        assert_eq!(
            Signer::address(&wallet, &NetworkType::Bsc).await.unwrap(),
            address.to_string()
        );
        assert!(matches!(
            Signer::address(&wallet, &NetworkType::Icon).await,
            Err(BtpError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_sign_hex_message() {
        let wallet = EvmWallet::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let signature = wallet
            .sign(&NetworkType::Eth2, &hex::encode(b"Hello, World!"))
            .await
            .unwrap();
        let bytes = hex::decode(signature.trim_start_matches("0x")).unwrap();
        assert_eq!(bytes.len(), 65);

        assert!(matches!(
            wallet.sign(&NetworkType::Eth2, "zz").await,
            Err(BtpError::InvalidArgument(_))
        ));
    }
}
