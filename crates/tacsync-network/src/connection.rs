//! WebSocket channel to a room relay

use crate::transport::{Channel, Connector};
use crate::{NetworkError, ProtocolError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsChannel {
    stream: WsStream,
}

#[async_trait]
impl Channel for WsChannel {
    async fn send(&mut self, text: String) -> Result<(), NetworkError> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, NetworkError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(String::from_utf8(bytes).map_err(|e| {
                        NetworkError::Protocol(ProtocolError::MalformedEnvelope(e.to_string()))
                    }))
                }
                Ok(Message::Close(frame)) => {
                    debug!("Relay closed the socket: {:?}", frame);
                    return None;
                }
                Ok(other) => trace!("Ignoring control frame: {:?}", other),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), NetworkError> {
        self.stream.close(None).await?;
        Ok(())
    }
}

/// Connects over `ws://` URLs
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn Channel>, NetworkError> {
        validate_endpoint(endpoint)?;
        let (stream, _response) = connect_async(endpoint)
            .await
            .map_err(|e| NetworkError::ConnectionFailed(format!("{endpoint}: {e}")))?;
        debug!("WebSocket open to {}", endpoint);
        Ok(Box::new(WsChannel { stream }))
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), NetworkError> {
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        Ok(())
    } else {
        Err(NetworkError::ConnectionFailed(format!(
            "unsupported endpoint {endpoint:?}, expected ws:// or wss://"
        )))
    }
}
