//! WebSocket client transport

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::TransportError;
use crate::transport::{ChunkStream, Connector};

/// Connects to a `ws://` or `wss://` stream endpoint
///
/// Binary messages are chunks. Text, ping and pong messages are ignored; a
/// close frame ends the stream. There is no reconnection.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self) -> BoxFuture<'static, Result<ChunkStream, TransportError>> {
        let url = self.url.clone();

        Box::pin(async move {
            let (ws_stream, _) = connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", url, e)))?;
            tracing::info!("Connected to {}", url);

            let chunks = stream::unfold(Some(ws_stream), |state| async move {
                let Some(mut ws) = state else {
                    return None;
                };
                loop {
                    match ws.next().await {
                        Some(Ok(Message::Binary(data))) => return Some((Ok(Bytes::from(data)), Some(ws))),
                        Some(Ok(Message::Close(frame))) => {
                            tracing::debug!("Server closed connection: {:?}", frame);
                            return None;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            return Some((Err(TransportError::ReceiveFailed(e.to_string())), None));
                        }
                        None => return None,
                    }
                }
            });

            Ok(Box::pin(chunks) as ChunkStream)
        })
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_refused() {
        // Port 9 (discard) is essentially never listening for WebSocket.
        let connector = WebSocketConnector::new("ws://127.0.0.1:9/ws/test");
        let err = match connector.connect().await {
            Ok(_) => panic!("connect should fail"),
            Err(e) => e,
        };
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
    }
}
