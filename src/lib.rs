//! BTP gateway client SDK
//!
//! ```text
//!   caller ──► BtpProvider ──► gateway HTTP (/api/...)
//!                 │
//!                 ├─► PendingTransaction ──► FinalityRegistry (poll per network)
//!                 └─► EventRouter ──► LogSubscription ──► gateway WS (/monitor/...)
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod observability;
pub mod provider;
pub mod wallet;

pub use config::schema::SdkConfig;
pub use error::{BtpError, BtpResult};
pub use events::{Event, EventFilter, EventListener, EventRouter, EventType, SubscriptionId};
pub use provider::{BtpProvider, PendingTransaction, Signer, TransactOpts, WaitStatus};
pub use wallet::EvmWallet;
