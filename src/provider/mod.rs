//! Gateway provider subsystem.
//!
//! # Data Flow
//! ```text
//! BtpProvider (client.rs)
//!     → transact → submission.rs → request.rs (POST, challenge, POST)
//!                → transaction.rs (PendingTransaction)
//!     → call / services / networks / results → query.rs → request.rs (GET)
//!     → on / once / off → crate::events
//!
//! Gateway JSON ↔ typed values: format.rs, types.rs
//! ```
//!
//! # Design Decisions
//! - Collaborators sit behind traits (`HttpProvider`, `Signer`,
//!   `BlockFinality`, `TransactionResults`, `NetworkResolver`)
//! - Decoding is per chain family, not per network type

pub mod client;
pub mod format;
pub mod query;
pub mod request;
pub mod signer;
pub mod submission;
pub mod transaction;
pub mod types;

pub use client::BtpProvider;
pub use query::{BlockFinality, GatewayQuery, NetworkResolver, TransactionResults};
pub use request::{GatewayClient, HttpProvider, Method, RequestOptions};
pub use signer::Signer;
pub use transaction::{PendingTransaction, WaitStatus};
pub use types::{
    BlockFilter, BlockRef, BlockStatus, CallOpts, ChainFamily, EventLog, EventPayload, EventSpec,
    Failure, LogFilter, Network, NetworkLog, NetworkRef, NetworkType, Params, Receipt,
    ServiceInfo, TransactOpts, TxRef,
};
