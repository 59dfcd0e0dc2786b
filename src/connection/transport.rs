//! Transport seam for the notification channel.
//!
//! A [`Transport`] opens a [`Channel`]: a pair of queues to and from a live
//! connection.  [`WebSocketTransport`] backs it with tokio-tungstenite and a
//! pump task; tests substitute an in-memory transport.

use crate::error::{CivicLinkError, Result};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Close code of a normal, intentional closure.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code reported when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Something that happened on an open channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Text(String),
    Binary(Vec<u8>),
    /// Transport-level failure; a `Closed` event follows.
    Error(String),
    /// The channel is gone. `code` is `None` when no close frame was received.
    Closed { code: Option<u16>, reason: String },
}

/// Frame written by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close { code: u16, reason: String },
}

/// An open connection as seen by the connection manager.
#[derive(Debug)]
pub struct Channel {
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    pub inbound: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Opens channels to a URL.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<Channel>;
}

/// tokio-tungstenite transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<Channel> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| CivicLinkError::WebSocketError(format!("Connection failed: {}", e)))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(ws_stream, outbound_rx, inbound_tx));

        Ok(Channel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Move frames between the socket and the channel queues until either side
/// goes away.
async fn pump(
    ws_stream: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    inbound_tx: mpsc::UnboundedSender<ChannelEvent>,
) {
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let (message, closing) = match frame {
                    Some(OutboundFrame::Text(text)) => (Message::Text(text.into()), false),
                    Some(OutboundFrame::Close { code, reason }) => (close_message(code, &reason), true),
                    // Manager dropped the channel without closing it.
                    None => (close_message(NORMAL_CLOSURE, "client gone"), true),
                };
                if let Err(e) = sink.send(message).await {
                    log::debug!("[civic-link] WebSocket send failed: {}", e);
                    let _ = inbound_tx.send(ChannelEvent::Error(e.to_string()));
                    let _ = inbound_tx.send(ChannelEvent::Closed {
                        code: None,
                        reason: e.to_string(),
                    });
                    return;
                }
                if closing {
                    return;
                }
            }
            incoming = stream.next() => {
                let event = match incoming {
                    Some(Ok(Message::Text(text))) => ChannelEvent::Text(text.as_str().to_owned()),
                    Some(Ok(Message::Binary(data))) => ChannelEvent::Binary(data.to_vec()),
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (Some(u16::from(f.code)), f.reason.as_str().to_owned()))
                            .unwrap_or((None, String::new()));
                        let _ = inbound_tx.send(ChannelEvent::Closed { code, reason });
                        return;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => continue,
                    Some(Err(e)) => {
                        let _ = inbound_tx.send(ChannelEvent::Error(e.to_string()));
                        let _ = inbound_tx.send(ChannelEvent::Closed {
                            code: None,
                            reason: e.to_string(),
                        });
                        return;
                    }
                    None => {
                        let _ = inbound_tx.send(ChannelEvent::Closed {
                            code: None,
                            reason: "stream ended".to_string(),
                        });
                        return;
                    }
                };
                if inbound_tx.send(event).is_err() {
                    let _ = sink.send(close_message(NORMAL_CLOSURE, "client gone")).await;
                    return;
                }
            }
        }
    }
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_owned().into(),
    }))
}

/// Build `ws_url?token=<token>&connection_type=<channel>`.
///
/// `http(s)` URLs are rewritten to `ws(s)`; existing query parameters are kept.
pub fn build_channel_url(ws_url: &str, token: &str, channel: &str) -> Result<String> {
    let mut url = Url::parse(ws_url.trim()).map_err(|e| {
        CivicLinkError::ConfigurationError(format!("Invalid ws_url '{}': {}", ws_url, e))
    })?;

    let ws_scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(CivicLinkError::ConfigurationError(format!(
                "Unsupported ws_url scheme '{}'",
                other
            )))
        },
    };
    url.set_scheme(ws_scheme).map_err(|_| {
        CivicLinkError::ConfigurationError(format!("Cannot use scheme '{}' for {}", ws_scheme, ws_url))
    })?;

    url.query_pairs_mut()
        .append_pair("token", token)
        .append_pair("connection_type", channel);
    Ok(url.to_string())
}
