//! Redis pub/sub transport for multi-node deployments.

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;
use tracing::info;

use super::fleet::{FleetTransport, Publications};
use crate::persistence::redis_store::mask_redis_url;
use crate::utils::{RelayError, Result};

pub struct RedisFleet {
    client: redis::Client,
    /// Publishing connection, set by `init`.
    publisher: OnceCell<ConnectionManager>,
}

impl RedisFleet {
    pub fn new(url: &str) -> Result<Self> {
        info!(url = %mask_redis_url(url), "Configuring Redis fleet transport");
        let client = redis::Client::open(url)
            .map_err(|e| RelayError::FleetUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            publisher: OnceCell::new(),
        })
    }
}

#[async_trait]
impl FleetTransport for RedisFleet {
    async fn init(&self) -> Result<()> {
        let conn = ConnectionManager::new(self.client.clone())
            .await
            .map_err(|e| RelayError::FleetUnavailable(e.to_string()))?;
        let _ = self.publisher.set(conn);
        info!("Connected to Redis fleet transport");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let mut conn = self
            .publisher
            .get()
            .cloned()
            .ok_or_else(|| RelayError::FleetUnavailable("transport not initialized".into()))?;
        let _: i64 = conn
            .publish(topic, payload)
            .await
            .map_err(|e| RelayError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Publications> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| RelayError::Subscribe(e.to_string()))?;
        pubsub
            .subscribe(topic)
            .await
            .map_err(|e| RelayError::Subscribe(e.to_string()))?;
        let publications = pubsub
            .into_on_message()
            .map(|msg| Ok(msg.get_payload_bytes().to_vec()));
        Ok(publications.boxed())
    }
}

impl std::fmt::Debug for RedisFleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisFleet").finish()
    }
}
