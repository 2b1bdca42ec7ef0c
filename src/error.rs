//! Error taxonomy shared by every subsystem.
//!
//! # Propagation
//! - Caller input and gateway protocol violations are returned from the
//!   operation that detected them
//! - Fork detection inside the finality registry is delivered to listeners
//! - Socket failures are delivered to the subscribed listener

use serde_json::Value;
use thiserror::Error;

/// Payload code the gateway uses to reject a finality query whose
/// `(id, height)` pair no longer matches the canonical chain.
pub const INCONSISTENT_BLOCK_CODE: i64 = 400;

/// Payload code the gateway uses to hand a signing challenge back.
pub const NEEDS_SIGNATURE_CODE: i64 = 1005;

/// Errors that can occur while talking to the gateway.
#[derive(Debug, Clone, Error)]
pub enum BtpError {
    /// Malformed caller input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Network name is not served by the gateway (or by the service).
    #[error("unknown network name - name({0})")]
    UnknownNetworkName(String),

    /// Network type has no known chain family.
    #[error("unknown network type - type({0})")]
    UnknownNetworkType(String),

    /// Service name is not served by the gateway.
    #[error("unknown service - service({0})")]
    UnknownService(String),

    /// Gateway payload is missing expected fields.
    #[error("invalid {0} format")]
    InvalidFormat(String),

    /// Block at the given height is no longer the observed one.
    #[error("inconsistent block - network({network}) block({height}:{id})")]
    InconsistentBlock {
        network: String,
        id: String,
        height: u64,
    },

    /// Event socket closed with a code other than normal closure.
    #[error("websocket connection has closed - code({code}) reason({reason})")]
    ClosedConnection { code: u16, reason: String },

    /// Operation did not complete before its deadline.
    #[error("operation timeout - operation({0})")]
    Timeout(String),

    /// Gateway answered with a non-2xx status.
    #[error("server response status({status}) code({code}) message({message})")]
    ServerReject {
        status: u16,
        code: i64,
        message: String,
        data: Value,
    },

    /// Request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation is not valid in the current state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Operation is not supported for this event type.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Signing challenge names a different account than the one submitted.
    #[error("signing challenge address mismatch - expected({expected}) actual({actual})")]
    ChallengeMismatch { expected: String, actual: String },

    /// Signer failed to produce an address or signature.
    #[error("signer error: {0}")]
    Signer(String),

    /// Event socket failed.
    #[error("socket error: {0}")]
    Socket(String),
}

impl BtpError {
    /// Payload code of a gateway rejection, if this is one.
    pub fn server_code(&self) -> Option<i64> {
        match self {
            BtpError::ServerReject { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_inconsistent_block(&self) -> bool {
        matches!(self, BtpError::InconsistentBlock { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BtpError::Timeout(_))
    }
}

/// Result type for SDK operations.
pub type BtpResult<T> = Result<T, BtpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BtpError::Timeout("wait".into());
        assert_eq!(err.to_string(), "operation timeout - operation(wait)");

        let err = BtpError::InconsistentBlock {
            network: "icon:berlin".into(),
            id: "0xabc".into(),
            height: 2,
        };
        assert!(err.to_string().contains("2:0xabc"));
        assert!(err.is_inconsistent_block());
    }

    #[test]
    fn test_server_code() {
        let err = BtpError::ServerReject {
            status: 400,
            code: NEEDS_SIGNATURE_CODE,
            message: "sign required".into(),
            data: Value::Null,
        };
        assert_eq!(err.server_code(), Some(1005));
        assert_eq!(BtpError::Transport("refused".into()).server_code(), None);
    }
}
