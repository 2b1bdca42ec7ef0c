//! Challenge–response transaction submission.
//!
//! # Data Flow
//! ```text
//! signer.address ──► POST {network, params, options+from}
//!                        │
//!          ┌─────────────┼──────────────────────┐
//!          ▼             ▼                      ▼
//!       accepted   reject(1005, challenge)   other reject
//!       (tx id)          │                   (propagated)
//!                        ▼
//!          from matches? ──no──► ChallengeMismatch
//!                        │yes
//!                        ▼
//!          signer.sign(hex(raw)) ──► merge fields + signature
//!                        │
//!                        ▼
//!             POST {network, params, filtered options} ──► tx id
//! ```
//!
//! # Design Decisions
//! - At most two POSTs and one signing operation per submission
//! - A challenge naming a different account aborts before the second POST

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{BtpError, BtpResult, NEEDS_SIGNATURE_CODE};
use crate::observability::metrics;
use crate::provider::format::{format_signing_challenge, format_transact_opts, merge_challenge};
use crate::provider::request::{HttpProvider, RequestOptions};
use crate::provider::types::{Network, Params, TransactOpts};

pub struct Submitter {
    client: Arc<dyn HttpProvider>,
}

impl Submitter {
    pub fn new(client: Arc<dyn HttpProvider>) -> Self {
        Self { client }
    }

    /// Submit `service.method(params)` on `network` and return the transaction id.
    pub async fn transact(
        &self,
        network: &Network,
        service: &str,
        method: &str,
        params: &Params,
        options: TransactOpts,
    ) -> BtpResult<String> {
        options.validate()?;
        let path = format!("/api/{service}/{method}");

        let options = match options.signer.clone() {
            Some(signer) if options.from.is_none() => {
                let from = signer.address(&network.network_type).await?;
                let mut first = options;
                first.from = Some(from.clone());
                debug!(
                    network = %network.name,
                    service,
                    method,
                    from = %from,
                    "Submitting unsigned transaction"
                );

                match self.post(&path, network, params, &first).await {
                    Ok(id) => {
                        info!(
                            network = %network.name,
                            service,
                            method,
                            id = %id,
                            "Transaction accepted without signing"
                        );
                        metrics::record_transaction_submitted(&network.name, false);
                        return Ok(id);
                    }
                    Err(BtpError::ServerReject { code, data, .. })
                        if code == NEEDS_SIGNATURE_CODE =>
                    {
                        let challenge = format_signing_challenge(&network.network_type, &data)?;
                        if !challenge.from.eq_ignore_ascii_case(&from) {
                            warn!(
                                network = %network.name,
                                expected = %from,
                                actual = %challenge.from,
                                "Signing challenge address mismatch"
                            );
                            return Err(BtpError::ChallengeMismatch {
                                expected: from,
                                actual: challenge.from,
                            });
                        }
                        let signature = signer
                            .sign(&network.network_type, &challenge.message_hex())
                            .await?;
                        merge_challenge(first, &challenge, &signature)?
                    }
                    Err(e) => return Err(e),
                }
            }
            _ => options,
        };

        let id = self.post(&path, network, params, &options).await?;
        info!(network = %network.name, service, method, id = %id, "Transaction submitted");
        metrics::record_transaction_submitted(&network.name, options.signature.is_some());
        Ok(id)
    }

    async fn post(
        &self,
        path: &str,
        network: &Network,
        params: &Params,
        options: &TransactOpts,
    ) -> BtpResult<String> {
        let body = json!({
            "network": network.name,
            "params": params,
            "options": format_transact_opts(&network.network_type, options)?,
        });
        match self.client.request(path, RequestOptions::post(body)).await? {
            Value::String(id) => Ok(id),
            _ => Err(BtpError::InvalidFormat("transaction id".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::signer::Signer;
    use crate::provider::types::NetworkType;
    use async_trait::async_trait;
    use base64::{engine::general_purpose, Engine as _};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedHttp {
        responses: Mutex<VecDeque<BtpResult<Value>>>,
        bodies: Mutex<Vec<Value>>,
    }

    impl ScriptedHttp {
        fn new(responses: Vec<BtpResult<Value>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                bodies: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpProvider for ScriptedHttp {
        fn base_url(&self) -> &str {
            "http://gateway"
        }

        async fn request(&self, _path: &str, options: RequestOptions) -> BtpResult<Value> {
            self.bodies
                .lock()
                .unwrap()
                .push(options.body.unwrap_or(Value::Null));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BtpError::Transport("unexpected request".into())))
        }
    }

    struct StaticSigner {
        address: String,
        signed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Signer for StaticSigner {
        async fn address(&self, _network_type: &NetworkType) -> BtpResult<String> {
            Ok(self.address.clone())
        }

        async fn sign(&self, _network_type: &NetworkType, message: &str) -> BtpResult<String> {
            self.signed.lock().unwrap().push(message.to_string());
            Ok("0x0102".into())
        }
    }

    fn challenge(from: &str) -> BtpResult<Value> {
        Err(BtpError::ServerReject {
            status: 400,
            code: NEEDS_SIGNATURE_CODE,
            message: "need signature".into(),
            data: json!({
                "from": from,
                "data": general_purpose::STANDARD.encode(b"rawtx"),
                "stepLimit": "0x1000",
                "timestamp": "0x5f"
            }),
        })
    }

    fn signer(address: &str) -> Arc<StaticSigner> {
        Arc::new(StaticSigner {
            address: address.into(),
            signed: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_challenge_response_resubmits_signed() {
        let http = ScriptedHttp::new(vec![challenge("hx01"), Ok(json!("0xtx"))]);
        let signer = signer("hx01");
        let submitter = Submitter::new(http.clone());
        let network = Network::new("icon_test", "icon");

        let id = submitter
            .transact(
                &network,
                "bmc",
                "sendMessage",
                &Params::new(),
                TransactOpts::with_signer(signer.clone()),
            )
            .await
            .unwrap();
        assert_eq!(id, "0xtx");
        assert_eq!(*signer.signed.lock().unwrap(), vec![hex::encode(b"rawtx")]);

        let bodies = http.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["options"]["from"], "hx01");
        assert!(bodies[0]["options"].get("signature").is_none());
        assert_eq!(bodies[1]["options"]["from"], "hx01");
        assert_eq!(
            bodies[1]["options"]["signature"],
            general_purpose::STANDARD.encode([1u8, 2])
        );
        assert_eq!(bodies[1]["options"]["stepLimit"], "0x1000");
    }

    #[tokio::test]
    async fn test_challenge_differing_in_case_keeps_submitted_from() {
        let reject = Err(BtpError::ServerReject {
            status: 400,
            code: NEEDS_SIGNATURE_CODE,
            message: "need signature".into(),
            data: json!({
                "from": "0xabcdef",
                "data": general_purpose::STANDARD.encode(b"rawtx"),
                "nonce": "0x7"
            }),
        });
        let http = ScriptedHttp::new(vec![reject, Ok(json!("0xtx"))]);
        let submitter = Submitter::new(http.clone());
        let network = Network::new("bsc_test", "bsc");

        submitter
            .transact(
                &network,
                "bmc",
                "sendMessage",
                &Params::new(),
                TransactOpts::with_signer(signer("0xABCDEF")),
            )
            .await
            .unwrap();

        let bodies = http.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["options"]["from"], "0xABCDEF");
        assert_eq!(bodies[1]["options"]["from"], "0xABCDEF");
        assert_eq!(bodies[1]["options"]["nonce"], "0x7");
    }

    #[tokio::test]
    async fn test_challenge_mismatch_stops_before_resubmit() {
        let http = ScriptedHttp::new(vec![challenge("hx02"), Ok(json!("0xtx"))]);
        let submitter = Submitter::new(http.clone());
        let network = Network::new("icon_test", "icon");

        let err = submitter
            .transact(
                &network,
                "bmc",
                "sendMessage",
                &Params::new(),
                TransactOpts::with_signer(signer("hx01")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BtpError::ChallengeMismatch { .. }));
        assert_eq!(http.bodies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_rejection_propagates() {
        let reject = Err(BtpError::ServerReject {
            status: 500,
            code: 1,
            message: "boom".into(),
            data: Value::Null,
        });
        let http = ScriptedHttp::new(vec![reject]);
        let submitter = Submitter::new(http.clone());
        let network = Network::new("bsc_test", "bsc");

        let err = submitter
            .transact(
                &network,
                "bmc",
                "sendMessage",
                &Params::new(),
                TransactOpts::with_signer(signer("0x01")),
            )
            .await
            .unwrap_err();
        assert_eq!(err.server_code(), Some(1));
        assert_eq!(http.bodies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_challenge_is_fatal() {
        let reject = Err(BtpError::ServerReject {
            status: 400,
            code: NEEDS_SIGNATURE_CODE,
            message: "need signature".into(),
            data: json!({"from": "0x01"}),
        });
        let http = ScriptedHttp::new(vec![reject]);
        let submitter = Submitter::new(http.clone());
        let network = Network::new("bsc_test", "bsc");

        let err = submitter
            .transact(
                &network,
                "bmc",
                "sendMessage",
                &Params::new(),
                TransactOpts::with_signer(signer("0x01")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BtpError::InvalidFormat(_)));
        assert_eq!(http.bodies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_presigned_options_submit_once() {
        let http = ScriptedHttp::new(vec![Ok(json!("0xtx"))]);
        let submitter = Submitter::new(http.clone());
        let network = Network::new("icon_test", "icon");

        let mut options = TransactOpts::presigned("hx01", "c2ln");
        options.gas_price = Some(json!("0x1"));
        let id = submitter
            .transact(&network, "bmc", "sendMessage", &Params::new(), options)
            .await
            .unwrap();
        assert_eq!(id, "0xtx");

        let bodies = http.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["options"]["signature"], "c2ln");
        assert!(bodies[0]["options"].get("gasPrice").is_none());
    }

    #[tokio::test]
    async fn test_partial_presigned_options_rejected() {
        let http = ScriptedHttp::new(vec![]);
        let submitter = Submitter::new(http.clone());
        let network = Network::new("icon_test", "icon");
        let options = TransactOpts {
            signature: Some("c2ln".into()),
            ..Default::default()
        };

        let err = submitter
            .transact(&network, "bmc", "sendMessage", &Params::new(), options)
            .await
            .unwrap_err();
        assert!(matches!(err, BtpError::InvalidArgument(_)));
        assert!(http.bodies.lock().unwrap().is_empty());
    }
}
