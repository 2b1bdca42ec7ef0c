//! Event socket abstraction.
//!
//! # Responsibilities
//! - Hide the WebSocket client behind `SocketConnector` / `SocketChannel`
//! - Normalize frames into text messages, close codes and errors
//!
//! # Design Decisions
//! - Ping/pong and raw frames never reach callers
//! - A stream that ends without a close frame reports abnormal closure

use async_trait::async_trait;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message},
    tungstenite::Error as WsError,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, trace, warn};

use crate::error::{BtpError, BtpResult};

/// Close code for an orderly shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close frame arrived without a status code.
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Message(String),
    Closed { code: u16, reason: String },
    Error(String),
}

/// An open bidirectional channel.
#[async_trait]
pub trait SocketChannel: Send {
    async fn send(&mut self, payload: String) -> BtpResult<()>;

    /// Next inbound event. After `Closed` or `Error` the channel is done.
    async fn next_event(&mut self) -> SocketEvent;

    async fn close(&mut self, code: u16) -> BtpResult<()>;
}

/// Opens channels to a URL.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self, url: &str) -> BtpResult<Box<dyn SocketChannel>>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// tokio-tungstenite connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

struct WsChannel {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl SocketConnector for WsConnector {
    async fn connect(&self, url: &str) -> BtpResult<Box<dyn SocketChannel>> {
        let (ws, response) = connect_async(url)
            .await
            .map_err(|e| BtpError::Socket(format!("failed to connect {url}: {e}")))?;
        debug!(url = %url, status = %response.status(), "Event socket connected");
        let (sink, stream) = ws.split();
        Ok(Box::new(WsChannel { sink, stream }))
    }
}

#[async_trait]
impl SocketChannel for WsChannel {
    async fn send(&mut self, payload: String) -> BtpResult<()> {
        self.sink
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| BtpError::Socket(format!("failed to send: {e}")))
    }

    async fn next_event(&mut self) -> SocketEvent {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return SocketEvent::Closed {
                        code: ABNORMAL_CLOSURE,
                        reason: "connection dropped".into(),
                    }
                }
                Some(Err(e)) => return SocketEvent::Error(e.to_string()),
            };
            match message {
                Message::Text(text) => return SocketEvent::Message(text.as_str().to_owned()),
                Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return SocketEvent::Message(text),
                    Err(_) => warn!(bytes = data.len(), "Dropped non-UTF-8 binary frame"),
                },
                Message::Close(frame) => {
                    return match frame {
                        Some(frame) => SocketEvent::Closed {
                            code: u16::from(frame.code),
                            reason: frame.reason.as_str().to_owned(),
                        },
                        None => SocketEvent::Closed {
                            code: NO_STATUS_RECEIVED,
                            reason: String::new(),
                        },
                    }
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    trace!("Skipped control frame");
                }
            }
        }
    }

    async fn close(&mut self, code: u16) -> BtpResult<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: String::new().into(),
        };
        self.sink
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| BtpError::Socket(format!("failed to close: {e}")))?;
        let _ = self.sink.close().await;
        Ok(())
    }
}
