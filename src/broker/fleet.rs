//! Fleet transports: how a node publishes to and hears from the shared topic.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::RwLock;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::utils::{RelayError, Result};

/// Stream of raw publication bodies received on a topic.
pub type Publications = BoxStream<'static, Result<Vec<u8>>>;

#[async_trait]
pub trait FleetTransport: Send + Sync {
    /// Establishes the connection used for publishing.
    async fn init(&self) -> Result<()>;

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;

    /// Every publication on `topic` from any node, this one included.
    async fn subscribe(&self, topic: &str) -> Result<Publications>;
}

/// In-process pub/sub for single-node deployments.
#[derive(Debug)]
pub struct LocalFleet {
    /// Topic name → broadcast sender
    topics: RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    buffer_size: usize,
}

impl LocalFleet {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            buffer_size,
        }
    }

    async fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        if let Some(tx) = self.topics.read().await.get(topic) {
            return tx.clone();
        }
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .clone()
    }
}

impl Default for LocalFleet {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl FleetTransport for LocalFleet {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        // no subscribers yet is not an error; the queue already holds the message
        let _ = self.sender(topic).await.send(payload.to_vec());
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Publications> {
        let rx = self.sender(topic).await.subscribe();
        let publications = stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Ok(body) => Some((Ok(body), rx)),
                Err(RecvError::Lagged(skipped)) => Some((
                    Err(RelayError::Subscribe(format!(
                        "subscriber lagged, {skipped} publications skipped"
                    ))),
                    rx,
                )),
                Err(RecvError::Closed) => None,
            }
        });
        Ok(publications.boxed())
    }
}
