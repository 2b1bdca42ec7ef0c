//! Log-event subscription over the gateway monitor socket.
//!
//! # Data Flow
//! ```text
//! connect <ws>/monitor/<service>/event
//!     → send {network, service, nameToParams}
//!     → ack {code: 0}            (ignored)
//!     → event message            → format_event_log → listener(Ok)
//!     → close != 1000            → listener(Err(ClosedConnection))
//!     → socket error             → listener(Err(Socket)), no reconnect
//! ```

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{BtpError, BtpResult};
use crate::events::socket::{SocketChannel, SocketConnector, SocketEvent, NORMAL_CLOSURE};
use crate::events::SubscriptionId;
use crate::observability::metrics;
use crate::provider::format::format_event_log;
use crate::provider::types::{EventLog, EventSpec, Network};

pub type LogListener = Box<dyn FnMut(BtpResult<EventLog>) + Send + 'static>;

/// What a subscription listens for.
#[derive(Debug, Clone)]
pub struct LogTarget {
    pub network: Network,
    pub service: String,
    pub event: EventSpec,
}

impl LogTarget {
    fn handshake(&self) -> Value {
        let mut name_to_params = Map::new();
        name_to_params.insert(
            self.event.name.clone(),
            self.event.params.clone().unwrap_or(Value::Null),
        );
        json!({
            "network": self.network.name,
            "service": self.service,
            "nameToParams": name_to_params,
        })
    }
}

/// One socket, one listener.
///
/// Dropping the handle closes the socket like [`unsubscribe`](Self::unsubscribe).
pub struct LogSubscription {
    id: SubscriptionId,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl LogSubscription {
    /// Open `<ws_base>/monitor/<service>/event` and relay events to `listener`.
    ///
    /// With `once`, the socket is closed normally after the first event.
    pub fn spawn(
        connector: Arc<dyn SocketConnector>,
        ws_base: &str,
        target: LogTarget,
        listener: LogListener,
        once: bool,
    ) -> Self {
        let id = SubscriptionId::new();
        let url = format!(
            "{}/monitor/{}/event",
            ws_base.trim_end_matches('/'),
            target.service
        );
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(connector, url, target, listener, once, shutdown_rx, id));
        Self {
            id,
            shutdown: Some(shutdown),
            task,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Close the socket with normal closure. The listener is not notified.
    pub fn unsubscribe(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

async fn run(
    connector: Arc<dyn SocketConnector>,
    url: String,
    target: LogTarget,
    mut listener: LogListener,
    once: bool,
    mut shutdown: oneshot::Receiver<()>,
    id: SubscriptionId,
) {
    let mut channel = match connector.connect(&url).await {
        Ok(channel) => channel,
        Err(e) => {
            warn!(url = %url, error = %e, "Failed to open event socket");
            listener(Err(e));
            return;
        }
    };

    if let Err(e) = channel.send(target.handshake().to_string()).await {
        warn!(url = %url, error = %e, "Failed to send event filter");
        listener(Err(e));
        return;
    }
    info!(
        subscription = %id,
        network = %target.network.name,
        service = %target.service,
        event = %target.event.name,
        "Log subscription opened"
    );

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                close(channel.as_mut(), id).await;
                return;
            }
            event = channel.next_event() => match event {
                SocketEvent::Message(text) => {
                    let Some(decoded) = decode(&target, &text) else {
                        continue;
                    };
                    let delivered = decoded.is_ok();
                    if delivered {
                        metrics::record_log_event(&target.service);
                    }
                    listener(decoded);
                    if once && delivered {
                        close(channel.as_mut(), id).await;
                        return;
                    }
                }
                SocketEvent::Closed { code, reason } => {
                    if code == NORMAL_CLOSURE {
                        info!(subscription = %id, "Log subscription closed by gateway");
                    } else {
                        warn!(
                            subscription = %id,
                            code,
                            reason = %reason,
                            "Event socket closed abnormally"
                        );
                        listener(Err(BtpError::ClosedConnection { code, reason }));
                    }
                    return;
                }
                SocketEvent::Error(message) => {
                    warn!(subscription = %id, error = %message, "Event socket failed");
                    listener(Err(BtpError::Socket(message)));
                    return;
                }
            }
        }
    }
}

async fn close(channel: &mut dyn SocketChannel, id: SubscriptionId) {
    if let Err(e) = channel.close(NORMAL_CLOSURE).await {
        debug!(subscription = %id, error = %e, "Close frame not sent");
    }
    info!(subscription = %id, "Log subscription closed");
}

/// `None` for control messages carrying a `code`.
fn decode(target: &LogTarget, text: &str) -> Option<BtpResult<EventLog>> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => return Some(Err(BtpError::InvalidFormat("event log".into()))),
    };
    if let Some(code) = value.get("code") {
        if code.as_i64() == Some(0) {
            debug!(service = %target.service, "Event filter acknowledged");
        } else {
            warn!(
                service = %target.service,
                code = %code,
                message = %value["message"],
                "Gateway reported monitor error"
            );
        }
        return None;
    }
    Some(format_event_log(&target.network.network_type, &value))
}
