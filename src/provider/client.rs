//! Gateway provider: the entry point of the SDK.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::SdkConfig;
use crate::error::{BtpError, BtpResult};
use crate::events::{
    EventFilter, EventListener, EventRouter, EventType, FinalityRegistry, SocketConnector,
    SubscriptionId, WsConnector,
};
use crate::provider::format::query_string;
use crate::provider::query::{BlockFinality, GatewayQuery, TransactionResults};
use crate::provider::request::{GatewayClient, HttpProvider, RequestOptions};
use crate::provider::submission::Submitter;
use crate::provider::transaction::PendingTransaction;
use crate::provider::types::{
    CallOpts, Network, NetworkRef, Params, Receipt, ServiceInfo, TransactOpts,
};

pub struct BtpProvider {
    query: Arc<GatewayQuery>,
    submitter: Submitter,
    router: EventRouter,
}

impl BtpProvider {
    /// Provider with default settings for the gateway at `url`.
    pub fn new(url: &str) -> Self {
        let mut config = SdkConfig::default();
        config.gateway.url = url.to_string();
        Self::from_config(&config)
    }

    pub fn from_config(config: &SdkConfig) -> Self {
        let client = Arc::new(GatewayClient::new(
            &config.gateway.url,
            Some(config.gateway.request_timeout_ms),
        ));
        Self::with_parts(
            client,
            Arc::new(WsConnector),
            config.ws_url(),
            Duration::from_millis(config.finality.poll_interval_ms),
        )
    }

    /// Assemble a provider from its transport parts.
    pub fn with_parts(
        client: Arc<dyn HttpProvider>,
        connector: Arc<dyn SocketConnector>,
        ws_base: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        let ws_base = ws_base.into();
        let query = Arc::new(GatewayQuery::new(client.clone()));
        let finality = FinalityRegistry::new(query.clone(), poll_interval);
        let router = EventRouter::new(query.clone(), finality, connector, ws_base.clone());
        info!(
            base_url = %client.base_url(),
            ws_base = %ws_base,
            poll_interval_ms = poll_interval.as_millis() as u64,
            "BTP provider ready"
        );
        Self {
            query,
            submitter: Submitter::new(client),
            router,
        }
    }

    pub fn base_url(&self) -> &str {
        self.query.client().base_url()
    }

    pub async fn services(&self) -> BtpResult<Vec<ServiceInfo>> {
        self.query.services().await
    }

    pub async fn service(&self, name: &str) -> BtpResult<ServiceInfo> {
        self.query.service(name).await
    }

    pub async fn networks(&self) -> BtpResult<Vec<Network>> {
        self.query.networks().await
    }

    /// Resolve `network` against the networks `service` is deployed on.
    async fn service_network(&self, network: NetworkRef, service: &str) -> BtpResult<Network> {
        match network {
            NetworkRef::Resolved(network) => Ok(network),
            NetworkRef::Name(name) => self
                .service(service)
                .await?
                .network(&name)
                .cloned()
                .ok_or(BtpError::UnknownNetworkName(name)),
        }
    }

    /// Submit a write call and return a handle to track it.
    pub async fn transact(
        &self,
        network: impl Into<NetworkRef>,
        service: &str,
        method: &str,
        params: &Params,
        options: TransactOpts,
    ) -> BtpResult<PendingTransaction> {
        options.validate()?;
        let network = self.service_network(network.into(), service).await?;
        let id = self
            .submitter
            .transact(&network, service, method, params, options)
            .await?;
        Ok(PendingTransaction::new(
            network,
            id,
            self.query.clone(),
            self.router.finality().clone(),
        ))
    }

    /// Read-only call; returns the gateway's JSON result.
    pub async fn call(
        &self,
        network: impl Into<NetworkRef>,
        service: &str,
        method: &str,
        params: &Params,
        options: CallOpts,
    ) -> BtpResult<Value> {
        let network = self.service_network(network.into(), service).await?;
        let query = query_string(&json!({
            "network": network.name,
            "params": params,
            "options": options,
        }))?;
        debug!(network = %network.name, service, method, "Calling read-only method");
        self.query
            .client()
            .request(&format!("/api/{service}/{method}?{query}"), RequestOptions::get())
            .await
    }

    pub async fn get_transaction_result(&self, network: &Network, id: &str) -> BtpResult<Receipt> {
        self.query.get_transaction_result(network, id).await
    }

    pub async fn get_block_finality(
        &self,
        network: &str,
        id: &str,
        height: u64,
    ) -> BtpResult<bool> {
        self.query.get_block_finality(network, id, height).await
    }

    /// Handle to a transaction submitted elsewhere.
    pub fn pending_transaction(&self, network: Network, id: &str) -> PendingTransaction {
        PendingTransaction::new(network, id, self.query.clone(), self.router.finality().clone())
    }

    pub fn events(&self) -> &EventRouter {
        &self.router
    }

    pub async fn on(
        &self,
        filter: impl Into<EventFilter>,
        listener: EventListener,
    ) -> BtpResult<SubscriptionId> {
        self.router.on(filter, listener).await
    }

    pub async fn once(
        &self,
        filter: impl Into<EventFilter>,
        listener: EventListener,
    ) -> BtpResult<SubscriptionId> {
        self.router.once(filter, listener).await
    }

    pub fn off(&self, subscription: SubscriptionId) -> BtpResult<()> {
        self.router.off(subscription)
    }

    pub fn off_all(&self, event_type: EventType) -> usize {
        self.router.off_all(event_type)
    }
}
