//! Socket factory backed by tokio-tungstenite

use crate::traits::*;
use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use std::borrow::Cow;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as TungsteniteCloseFrame;
use tokio_tungstenite::tungstenite::{Error as TungsteniteError, Message};
use tokio_tungstenite::connect_async;

/// Opens real WebSocket connections
///
/// Ping/pong frames are answered by tungstenite itself and never reach the
/// connection manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteFactory;

#[async_trait]
impl SocketFactory for TungsteniteFactory {
    async fn open(&self, url: &str) -> Result<SocketPair> {
        let (ws_stream, _response) = connect_async(url).await.map_err(handshake_error)?;
        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| SocketError::WebSocket(e.to_string()))
            .with(|message: WsMessage| {
                future::ready(Ok::<Message, SocketError>(to_tungstenite(message)))
            });

        let stream = read.filter_map(|frame| {
            future::ready(match frame {
                Ok(message) => from_tungstenite(message).map(Ok),
                Err(e) => Some(Err(SocketError::WebSocket(e.to_string()))),
            })
        });

        Ok(SocketPair::new(Box::pin(sink), Box::pin(stream)))
    }
}

fn handshake_error(error: TungsteniteError) -> SocketError {
    match error {
        TungsteniteError::Http(response) => {
            let status = response.status();
            SocketError::Rejected {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("handshake refused").to_string(),
            }
        }
        other => SocketError::Connection(other.to_string()),
    }
}

/// Convert WsMessage to tungstenite Message
fn to_tungstenite(message: WsMessage) -> Message {
    match message {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data),
        WsMessage::Close(frame) => Message::Close(frame.map(|f| TungsteniteCloseFrame {
            code: CloseCode::from(f.code),
            reason: Cow::Owned(f.reason),
        })),
    }
}

/// Convert tungstenite Message to WsMessage; control frames are dropped
fn from_tungstenite(message: Message) -> Option<WsMessage> {
    match message {
        Message::Text(text) => Some(WsMessage::Text(text)),
        Message::Binary(data) => Some(WsMessage::Binary(data)),
        Message::Close(frame) => Some(WsMessage::Close(
            frame.map(|f| CloseFrame::new(u16::from(f.code), f.reason.into_owned())),
        )),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}
