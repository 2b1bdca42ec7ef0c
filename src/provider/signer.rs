use async_trait::async_trait;

use crate::error::BtpResult;
use crate::provider::types::NetworkType;

/// Produces account addresses and signatures for a network type.
///
/// `sign` receives the raw transaction as a lowercase hex string (no `0x`
/// prefix) and returns the signature as hex, with or without `0x`.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Whether this signer can act on networks of the given type.
    fn supports(&self, _network_type: &NetworkType) -> bool {
        true
    }

    async fn address(&self, network_type: &NetworkType) -> BtpResult<String>;

    async fn sign(&self, network_type: &NetworkType, message: &str) -> BtpResult<String>;
}
