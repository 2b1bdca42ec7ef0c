//! Metrics collection.
//!
//! # Metrics
//! - `btp_finality_polls_total` (counter): finality queries by network
//! - `btp_finality_notifications_total` (counter): listener notifications by network, outcome
//! - `btp_finality_queue_depth` (gauge): pending confirmation items by network
//! - `btp_log_events_total` (counter): decoded log events by service
//! - `btp_transactions_submitted_total` (counter): submissions by network, signed

use metrics::{counter, gauge};

pub fn record_finality_poll(network: &str) {
    counter!("btp_finality_polls_total", "network" => network.to_string()).increment(1);
}

/// `outcome` is one of `finalized`, `inconsistent`, `error`.
pub fn record_finality_notification(network: &str, outcome: &'static str, listeners: usize) {
    counter!(
        "btp_finality_notifications_total",
        "network" => network.to_string(),
        "outcome" => outcome
    )
    .increment(listeners as u64);
}

pub fn record_queue_depth(network: &str, depth: usize) {
    gauge!("btp_finality_queue_depth", "network" => network.to_string()).set(depth as f64);
}

pub fn record_log_event(service: &str) {
    counter!("btp_log_events_total", "service" => service.to_string()).increment(1);
}

pub fn record_transaction_submitted(network: &str, signed: bool) {
    counter!(
        "btp_transactions_submitted_total",
        "network" => network.to_string(),
        "signed" => if signed { "true" } else { "false" }
    )
    .increment(1);
}
