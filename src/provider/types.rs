//! Gateway-facing value types: networks, receipts, event logs, filters and
//! transaction options.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BtpError, BtpResult};
use crate::provider::signer::Signer;

/// Method parameters, sent to the gateway as a JSON object.
pub type Params = Map<String, Value>;

/// Network type string as reported by the gateway (`icon`, `eth2`, `bsc`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NetworkType {
    Icon,
    Eth2,
    Bsc,
    Other(String),
}

/// Chain family deciding payload shapes and transaction option fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFamily {
    Icon,
    Evm,
}

impl NetworkType {
    pub fn as_str(&self) -> &str {
        match self {
            NetworkType::Icon => "icon",
            NetworkType::Eth2 => "eth2",
            NetworkType::Bsc => "bsc",
            NetworkType::Other(s) => s,
        }
    }

    /// Resolve the chain family, failing for types the SDK cannot decode.
    pub fn family(&self) -> BtpResult<ChainFamily> {
        match self {
            NetworkType::Icon => Ok(ChainFamily::Icon),
            NetworkType::Eth2 | NetworkType::Bsc => Ok(ChainFamily::Evm),
            NetworkType::Other(s) if s == "eth" || s == "evm" => Ok(ChainFamily::Evm),
            NetworkType::Other(s) => Err(BtpError::UnknownNetworkType(s.clone())),
        }
    }
}

impl From<String> for NetworkType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "icon" => NetworkType::Icon,
            "eth2" => NetworkType::Eth2,
            "bsc" => NetworkType::Bsc,
            _ => NetworkType::Other(s),
        }
    }
}

impl From<&str> for NetworkType {
    fn from(s: &str) -> Self {
        NetworkType::from(s.to_string())
    }
}

impl From<NetworkType> for String {
    fn from(t: NetworkType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chain instance served by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    #[serde(rename = "type")]
    pub network_type: NetworkType,
}

impl Network {
    pub fn new(name: impl Into<String>, network_type: impl Into<NetworkType>) -> Self {
        Self {
            name: name.into(),
            network_type: network_type.into(),
        }
    }
}

/// A network given either by name (resolved against the gateway) or as an
/// already-resolved descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkRef {
    Name(String),
    Resolved(Network),
}

impl NetworkRef {
    pub fn name(&self) -> &str {
        match self {
            NetworkRef::Name(name) => name,
            NetworkRef::Resolved(network) => &network.name,
        }
    }
}

impl From<&str> for NetworkRef {
    fn from(name: &str) -> Self {
        NetworkRef::Name(name.to_string())
    }
}

impl From<String> for NetworkRef {
    fn from(name: String) -> Self {
        NetworkRef::Name(name)
    }
}

impl From<Network> for NetworkRef {
    fn from(network: Network) -> Self {
        NetworkRef::Resolved(network)
    }
}

impl From<&Network> for NetworkRef {
    fn from(network: &Network) -> Self {
        NetworkRef::Resolved(network.clone())
    }
}

/// A service and the networks it is deployed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub networks: Vec<Network>,
}

impl ServiceInfo {
    pub fn network(&self, name: &str) -> Option<&Network> {
        self.networks.iter().find(|n| n.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub id: String,
    pub height: u64,
}

/// Execution failure attached to a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IconLog {
    pub score_address: String,
    #[serde(default)]
    pub indexed: Vec<String>,
    #[serde(default)]
    pub data: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmLog {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub block_hash: String,
    #[serde(default)]
    pub block_number: String,
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub transaction_index: String,
    #[serde(default)]
    pub log_index: String,
    #[serde(default)]
    pub removed: bool,
}

/// Log entry in the shape of the network family that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworkLog {
    Icon(IconLog),
    Evm(EvmLog),
}

/// Transaction receipt, normalized across chain families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub block: BlockRef,
    pub cumulative_resource_used: String,
    pub resource_used: String,
    pub resource_price: String,
    pub logs: Vec<NetworkLog>,
    pub failure: Option<Failure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRef {
    pub id: String,
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub name: String,
    pub params: Value,
}

/// A decoded service event delivered over the event socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub block: BlockRef,
    pub tx: TxRef,
    pub index: u64,
    pub payload: EventPayload,
}

/// Block status a filter waits for. Only finality is observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockStatus {
    #[default]
    Finalized,
}

/// Identifies exactly one block to confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFilter {
    pub network: NetworkRef,
    pub status: BlockStatus,
    pub id: String,
    pub height: u64,
}

impl BlockFilter {
    pub fn finalized(network: impl Into<NetworkRef>, id: impl Into<String>, height: u64) -> Self {
        Self {
            network: network.into(),
            status: BlockStatus::Finalized,
            id: id.into(),
            height,
        }
    }
}

/// Event name plus an optional parameter filter (a mapping or a list of mappings).
#[derive(Debug, Clone, PartialEq)]
pub struct EventSpec {
    pub name: String,
    pub params: Option<Value>,
}

/// Identifies one log subscription intent.
#[derive(Debug, Clone, PartialEq)]
pub struct LogFilter {
    pub network: NetworkRef,
    pub service: String,
    pub event: EventSpec,
}

impl LogFilter {
    pub fn new(
        network: impl Into<NetworkRef>,
        service: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        Self {
            network: network.into(),
            service: service.into(),
            event: EventSpec {
                name: event.into(),
                params: None,
            },
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.event.params = Some(params);
        self
    }
}

/// Options for a write operation.
///
/// Fee and nonce fields are kept as raw JSON so values handed out by the
/// gateway in a signing challenge are echoed back unchanged.
#[derive(Clone, Default)]
pub struct TransactOpts {
    pub signer: Option<Arc<dyn Signer>>,
    pub from: Option<String>,
    pub signature: Option<String>,
    pub value: Option<Value>,
    pub estimate: Option<bool>,

    // ICON family
    pub step_limit: Option<Value>,
    pub timestamp: Option<Value>,

    // EVM family
    pub gas_price: Option<Value>,
    pub gas_limit: Option<Value>,
    pub gas_fee_cap: Option<Value>,
    pub gas_tip_cap: Option<Value>,
    pub nonce: Option<Value>,
}

impl TransactOpts {
    pub fn with_signer(signer: Arc<dyn Signer>) -> Self {
        Self {
            signer: Some(signer),
            ..Default::default()
        }
    }

    /// Options carrying a signature computed outside the SDK.
    pub fn presigned(from: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            from: Some(from.into()),
            signature: Some(signature.into()),
            ..Default::default()
        }
    }

    /// `from` and `signature` must be given together or not at all.
    pub fn validate(&self) -> BtpResult<()> {
        if self.from.is_some() != self.signature.is_some() {
            return Err(BtpError::InvalidArgument(
                "`options.from` and `options.signature` must both be set or both be absent"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Wire representation, camelCase keys, absent fields omitted, signer excluded.
    pub fn to_wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(v) = value {
                map.insert(key.to_string(), v);
            }
        };
        put("from", self.from.clone().map(Value::String));
        put("signature", self.signature.clone().map(Value::String));
        put("value", self.value.clone());
        put("estimate", self.estimate.map(Value::Bool));
        put("stepLimit", self.step_limit.clone());
        put("timestamp", self.timestamp.clone());
        put("gasPrice", self.gas_price.clone());
        put("gasLimit", self.gas_limit.clone());
        put("gasFeeCap", self.gas_fee_cap.clone());
        put("gasTipCap", self.gas_tip_cap.clone());
        put("nonce", self.nonce.clone());
        map
    }

    /// Overwrite one fee/nonce field by its wire name. Unknown names are ignored.
    pub(crate) fn set_wire_field(&mut self, key: &str, value: Value) {
        let slot = match key {
            "stepLimit" => &mut self.step_limit,
            "timestamp" => &mut self.timestamp,
            "gasPrice" => &mut self.gas_price,
            "gasLimit" => &mut self.gas_limit,
            "gasFeeCap" => &mut self.gas_fee_cap,
            "gasTipCap" => &mut self.gas_tip_cap,
            "nonce" => &mut self.nonce,
            _ => return,
        };
        *slot = Some(value);
    }
}

impl fmt::Debug for TransactOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactOpts")
            .field("signer", &self.signer.as_ref().map(|_| "<signer>"))
            .field("wire", &self.to_wire())
            .finish()
    }
}

/// Options for a read-only call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}
