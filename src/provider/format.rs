//! Decoders for gateway payloads and encoders for gateway requests.
//!
//! # Responsibilities
//! - Turn raw JSON from the gateway into typed values per chain family
//! - Filter transaction options down to what a chain family accepts
//! - Merge a signing challenge back into transaction options
//! - Encode nested query strings for read-only calls

use base64::{engine::general_purpose, Engine as _};
use serde_json::{Map, Value};

use crate::error::{BtpError, BtpResult};
use crate::provider::types::{
    BlockRef, ChainFamily, EventLog, EventPayload, Failure, Network, NetworkLog, NetworkType,
    Receipt, ServiceInfo, TransactOpts, TxRef,
};

const COMMON_OPTION_FIELDS: &[&str] = &["from", "value", "estimate", "signature"];
const ICON_OPTION_FIELDS: &[&str] = &["stepLimit", "timestamp"];
const EVM_OPTION_FIELDS: &[&str] = &["gasPrice", "gasLimit", "gasFeeCap", "gasTipCap", "nonce"];

fn invalid(what: &str) -> BtpError {
    BtpError::InvalidFormat(what.to_string())
}

fn family_fields(family: ChainFamily) -> &'static [&'static str] {
    match family {
        ChainFamily::Icon => ICON_OPTION_FIELDS,
        ChainFamily::Evm => EVM_OPTION_FIELDS,
    }
}

/// Decode the `/api` response: `[{name, networks: {name: type}}]`.
pub fn format_services_info(value: &Value) -> BtpResult<Vec<ServiceInfo>> {
    let entries = value.as_array().ok_or_else(|| invalid("services"))?;
    entries
        .iter()
        .map(|entry| {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("services"))?;
            let networks = entry
                .get("networks")
                .and_then(Value::as_object)
                .ok_or_else(|| invalid("services"))?;
            let networks = networks
                .iter()
                .map(|(name, ty)| {
                    ty.as_str()
                        .map(|ty| Network::new(name.as_str(), ty))
                        .ok_or_else(|| invalid("services"))
                })
                .collect::<BtpResult<Vec<_>>>()?;
            Ok(ServiceInfo {
                name: name.to_string(),
                networks,
            })
        })
        .collect()
}

/// Flatten the networks of every service, keeping the first occurrence of each name.
pub fn format_networks(services: &[ServiceInfo]) -> Vec<Network> {
    let mut networks: Vec<Network> = Vec::new();
    for network in services.iter().flat_map(|s| s.networks.iter()) {
        if !networks.iter().any(|n| n.name == network.name) {
            networks.push(network.clone());
        }
    }
    networks
}

/// Parse a `0x`-prefixed (or bare) hex quantity.
pub(crate) fn parse_hex_quantity(value: &str) -> Option<u64> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u64::from_str_radix(digits, 16).ok()
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn decode_logs(raw: Option<&Value>, what: &str) -> BtpResult<Vec<NetworkLog>> {
    match raw {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(logs) => serde_json::from_value(logs.clone()).map_err(|_| invalid(what)),
    }
}

fn decode_failure(value: &Value) -> BtpResult<Option<Failure>> {
    match value.get("Failure") {
        None | Some(Value::Null) => Ok(None),
        Some(failure) => serde_json::from_value(failure.clone())
            .map(Some)
            .map_err(|_| invalid("receipt")),
    }
}

/// Decode a `/api/result/<id>` response for the given network type.
pub fn format_receipt(network_type: &NetworkType, value: &Value) -> BtpResult<Receipt> {
    let raw = value.get("Raw").cloned().unwrap_or(Value::Null);
    match network_type.family()? {
        ChainFamily::Icon => {
            let id = value
                .get("BlockHash")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("receipt"))?;
            let height = value
                .get("BlockHeight")
                .and_then(Value::as_u64)
                .ok_or_else(|| invalid("receipt"))?;
            Ok(Receipt {
                block: BlockRef {
                    id: id.to_string(),
                    height,
                },
                cumulative_resource_used: str_field(&raw, "cumulativeStepUsed"),
                resource_used: str_field(&raw, "stepUsed"),
                resource_price: str_field(&raw, "stepPrice"),
                logs: decode_logs(raw.get("eventLogs"), "receipt")?,
                failure: decode_failure(value)?,
            })
        }
        ChainFamily::Evm => {
            let id = raw
                .get("blockHash")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("receipt"))?;
            let height = raw
                .get("blockNumber")
                .and_then(Value::as_str)
                .and_then(parse_hex_quantity)
                .ok_or_else(|| invalid("receipt"))?;
            Ok(Receipt {
                block: BlockRef {
                    id: id.to_string(),
                    height,
                },
                cumulative_resource_used: str_field(&raw, "cumulativeGasUsed"),
                resource_used: str_field(&raw, "gasUsed"),
                resource_price: str_field(&raw, "effectiveGasPrice"),
                logs: decode_logs(raw.get("logs"), "receipt")?,
                failure: decode_failure(value)?,
            })
        }
    }
}

/// Decode one event message pushed over the monitor socket.
pub fn format_event_log(network_type: &NetworkType, value: &Value) -> BtpResult<EventLog> {
    let family = network_type.family()?;
    let base = value.get("BaseEvent").ok_or_else(|| invalid("event log"))?;
    let name = value
        .get("Name")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("event log"))?;
    let params = value.get("Params").cloned().unwrap_or(Value::Null);

    let (block, tx, index) = match family {
        ChainFamily::Icon => {
            let num = |key: &str| {
                base.get(key)
                    .and_then(Value::as_u64)
                    .ok_or_else(|| invalid("event log"))
            };
            let text = |key: &str| {
                base.get(key)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| invalid("event log"))
            };
            (
                BlockRef {
                    id: text("BlockHash")?,
                    height: num("BlockHeight")?,
                },
                TxRef {
                    id: text("TxHash")?,
                    index: num("TxIndex")?,
                },
                num("IndexInTx")?,
            )
        }
        ChainFamily::Evm => {
            let raw = base.get("Raw").ok_or_else(|| invalid("event log"))?;
            let text = |key: &str| {
                raw.get(key)
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("event log"))
            };
            let quantity = |key: &str| {
                text(key).and_then(|v| parse_hex_quantity(v).ok_or_else(|| invalid("event log")))
            };
            (
                BlockRef {
                    id: text("blockHash")?.to_string(),
                    height: quantity("blockNumber")?,
                },
                TxRef {
                    id: text("transactionHash")?.to_string(),
                    index: quantity("transactionIndex")?,
                },
                quantity("logIndex")?,
            )
        }
    };

    Ok(EventLog {
        block,
        tx,
        index,
        payload: EventPayload {
            name: name.to_string(),
            params,
        },
    })
}

/// Wire options restricted to the fields valid for `network_type`.
pub fn format_transact_opts(
    network_type: &NetworkType,
    options: &TransactOpts,
) -> BtpResult<Map<String, Value>> {
    let allowed = family_fields(network_type.family()?);
    Ok(options
        .to_wire()
        .into_iter()
        .filter(|(key, _)| {
            COMMON_OPTION_FIELDS.contains(&key.as_str()) || allowed.contains(&key.as_str())
        })
        .collect())
}

/// Signing challenge carried in a needs-signature rejection.
#[derive(Debug, Clone, PartialEq)]
pub struct SigningChallenge {
    pub from: String,
    pub message: Vec<u8>,
    pub fields: Map<String, Value>,
}

impl SigningChallenge {
    /// Raw message as lowercase hex without prefix.
    pub fn message_hex(&self) -> String {
        hex::encode(&self.message)
    }
}

/// Decode the `data` of a needs-signature rejection.
///
/// Only fee and nonce fields of the target family are kept in `fields`.
pub fn format_signing_challenge(
    network_type: &NetworkType,
    data: &Value,
) -> BtpResult<SigningChallenge> {
    let allowed = family_fields(network_type.family()?);
    let payload = data
        .as_object()
        .ok_or_else(|| invalid("signing challenge"))?;
    let from = payload
        .get("from")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("signing challenge"))?;
    let message = payload
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("signing challenge"))?;
    let message = general_purpose::STANDARD
        .decode(message)
        .map_err(|_| invalid("signing challenge"))?;
    let fields = payload
        .iter()
        .filter(|(key, _)| allowed.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Ok(SigningChallenge {
        from: from.to_string(),
        message,
        fields,
    })
}

/// Merge a challenge's fee and nonce fields into `options` and attach `signature`.
///
/// `signature` is hex (optional `0x`); it is stored base64-encoded. `options.from`
/// is left as submitted.
pub fn merge_challenge(
    mut options: TransactOpts,
    challenge: &SigningChallenge,
    signature: &str,
) -> BtpResult<TransactOpts> {
    let digits = signature
        .strip_prefix("0x")
        .unwrap_or(signature);
    let bytes = hex::decode(digits)
        .map_err(|e| BtpError::Signer(format!("signature is not hex: {e}")))?;
    for (key, value) in &challenge.fields {
        options.set_wire_field(key, value.clone());
    }
    options.signature = Some(general_purpose::STANDARD.encode(bytes));
    Ok(options)
}

/// Bracket-nested query string (`a=1&b[c]=2`). Arrays are rejected.
pub fn query_string(value: &Value) -> BtpResult<String> {
    let mut pairs = Vec::new();
    match value {
        Value::Object(map) => encode_query(map, "", &mut pairs)?,
        _ => {
            return Err(BtpError::InvalidArgument(
                "query must be a mapping".to_string(),
            ))
        }
    }
    Ok(pairs.join("&"))
}

fn encode_component(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

fn encode_query(map: &Map<String, Value>, ns: &str, out: &mut Vec<String>) -> BtpResult<()> {
    for (key, value) in map {
        let key = if ns.is_empty() {
            encode_component(key)
        } else {
            format!("{ns}[{}]", encode_component(key))
        };
        match value {
            Value::Null => {}
            Value::String(s) => out.push(format!("{key}={}", encode_component(s))),
            Value::Number(n) => out.push(format!("{key}={n}")),
            Value::Bool(b) => out.push(format!("{key}={b}")),
            Value::Array(_) => {
                return Err(BtpError::InvalidArgument(format!(
                    "array is not allowed in query - key({key})"
                )))
            }
            Value::Object(inner) => encode_query(inner, &key, out)?,
        }
    }
    Ok(())
}
