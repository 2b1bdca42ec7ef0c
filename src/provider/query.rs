//! Read-side gateway lookups shared by the provider, the finality registry
//! and pending transactions.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{BtpError, BtpResult, INCONSISTENT_BLOCK_CODE};
use crate::provider::format::{format_networks, format_receipt, format_services_info, query_string};
use crate::provider::request::{HttpProvider, RequestOptions};
use crate::provider::types::{Network, Receipt, ServiceInfo};

/// Answers whether a block is final on a network.
#[async_trait]
pub trait BlockFinality: Send + Sync {
    /// `Ok(false)` while not yet final; `InconsistentBlock` when `id` is no
    /// longer the block at `height`.
    async fn get_block_finality(&self, network: &str, id: &str, height: u64) -> BtpResult<bool>;
}

/// Looks up the receipt of a submitted transaction.
#[async_trait]
pub trait TransactionResults: Send + Sync {
    async fn get_transaction_result(&self, network: &Network, id: &str) -> BtpResult<Receipt>;
}

/// Resolves a network name against the gateway.
#[async_trait]
pub trait NetworkResolver: Send + Sync {
    async fn resolve_network(&self, name: &str) -> BtpResult<Network>;
}

/// Gateway-backed implementation of the lookup traits.
#[derive(Clone)]
pub struct GatewayQuery {
    client: Arc<dyn HttpProvider>,
}

impl GatewayQuery {
    pub fn new(client: Arc<dyn HttpProvider>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn HttpProvider> {
        &self.client
    }

    pub async fn services(&self) -> BtpResult<Vec<ServiceInfo>> {
        let value = self.client.request("/api", RequestOptions::get()).await?;
        format_services_info(&value)
    }

    pub async fn service(&self, name: &str) -> BtpResult<ServiceInfo> {
        self.services()
            .await?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| BtpError::UnknownService(name.to_string()))
    }

    pub async fn networks(&self) -> BtpResult<Vec<Network>> {
        Ok(format_networks(&self.services().await?))
    }
}

#[async_trait]
impl BlockFinality for GatewayQuery {
    async fn get_block_finality(&self, network: &str, id: &str, height: u64) -> BtpResult<bool> {
        let query = query_string(&json!({ "network": network, "height": height }))?;
        let path = format!("/api/finality/{id}?{query}");
        match self.client.request(&path, RequestOptions::get()).await {
            Ok(Value::Bool(finalized)) => {
                debug!(network = %network, id = %id, height, finalized, "Block finality");
                Ok(finalized)
            }
            Ok(_) => Err(BtpError::InvalidFormat("block finality".into())),
            Err(e) if e.server_code() == Some(INCONSISTENT_BLOCK_CODE) => {
                Err(BtpError::InconsistentBlock {
                    network: network.to_string(),
                    id: id.to_string(),
                    height,
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TransactionResults for GatewayQuery {
    async fn get_transaction_result(&self, network: &Network, id: &str) -> BtpResult<Receipt> {
        let query = query_string(&json!({ "network": network.name }))?;
        let value = self
            .client
            .request(&format!("/api/result/{id}?{query}"), RequestOptions::get())
            .await?;
        format_receipt(&network.network_type, &value)
    }
}

#[async_trait]
impl NetworkResolver for GatewayQuery {
    async fn resolve_network(&self, name: &str) -> BtpResult<Network> {
        self.networks()
            .await?
            .into_iter()
            .find(|n| n.name == name)
            .ok_or_else(|| BtpError::UnknownNetworkName(name.to_string()))
    }
}
