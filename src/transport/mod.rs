//! Byte-chunk transport boundary
//!
//! The player only needs an ordered stream of binary chunks. Where they come
//! from is behind [`Connector`]; the WebSocket client is the production one.

pub mod websocket;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, Stream, StreamExt};
use std::pin::Pin;

use crate::error::TransportError;

pub use websocket::WebSocketConnector;

/// Ordered binary chunks; ends when the peer closes
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Opens one chunk stream per playback session
pub trait Connector: Send + Sync {
    fn connect(&self) -> BoxFuture<'static, Result<ChunkStream, TransportError>>;

    /// Endpoint description for logs
    fn describe(&self) -> String {
        "transport".to_string()
    }
}

/// Replays a fixed list of chunks
///
/// Each `connect()` yields the same script. Used by tests and for replaying
/// captured streams.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    items: Vec<Result<Bytes, TransportError>>,
    hold_open: bool,
    refuse: Option<TransportError>,
}

impl MemoryConnector {
    pub fn new(chunks: Vec<Bytes>) -> Self {
        Self {
            items: chunks.into_iter().map(Ok).collect(),
            ..Self::default()
        }
    }

    /// Append a receive error after the chunks
    pub fn with_error(mut self, error: TransportError) -> Self {
        self.items.push(Err(error));
        self
    }

    /// Keep the stream pending after the script instead of closing it
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Make every `connect()` fail
    pub fn refusing(error: TransportError) -> Self {
        Self {
            refuse: Some(error),
            ..Self::default()
        }
    }
}

impl Connector for MemoryConnector {
    fn connect(&self) -> BoxFuture<'static, Result<ChunkStream, TransportError>> {
        let refuse = self.refuse.clone();
        let items = self.items.clone();
        let hold_open = self.hold_open;

        Box::pin(async move {
            if let Some(error) = refuse {
                return Err(error);
            }
            let script = stream::iter(items);
            let chunks: ChunkStream = if hold_open {
                Box::pin(script.chain(stream::pending()))
            } else {
                Box::pin(script)
            };
            Ok(chunks)
        })
    }

    fn describe(&self) -> String {
        format!("memory ({} items)", self.items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_connector_replays_script() {
        let connector = MemoryConnector::new(vec![Bytes::from_static(b"ab"), Bytes::from_static(b"c")])
            .with_error(TransportError::Closed);

        for _ in 0..2 {
            let items: Vec<_> = connector.connect().await.unwrap().collect().await;
            assert_eq!(items.len(), 3);
            assert_eq!(items[0], Ok(Bytes::from_static(b"ab")));
            assert_eq!(items[2], Err(TransportError::Closed));
        }
    }

    #[tokio::test]
    async fn test_refusing_connector() {
        let connector = MemoryConnector::refusing(TransportError::ConnectionFailed("down".into()));
        assert!(connector.connect().await.is_err());
    }
}
