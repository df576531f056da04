//! HTTP-polling configuration source.
//!
//! Fetches the route payload (`{"routes": [...]}`) from a URL, delivers it
//! to the listener immediately, then polls for changes by comparing a hash
//! of the serialized payload. A real deployment would use ETag or a push
//! channel; polling keeps the adapter dependency-free on the server side.
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    time::Duration,
};

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use reqwest::Client;

use crate::{
    config::models::{RoutesPayload, SourceConfig},
    ports::{ConfigSource, RoutesChangeListener},
};

pub struct HttpConfigSource {
    url: String,
    poll_interval: Duration,
    client: Client,
}

impl HttpConfigSource {
    pub fn new(config: &SourceConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            url: config.url.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            client,
        }
    }

    async fn fetch(client: &Client, url: &str) -> Result<RoutesPayload> {
        let response = client
            .get(url)
            .send()
            .await
            .wrap_err("Failed to fetch route configuration")?;
        response
            .json::<RoutesPayload>()
            .await
            .wrap_err("Failed to parse route configuration payload")
    }

    fn payload_hash(payload: &RoutesPayload) -> Option<u64> {
        let json = serde_json::to_string(payload).ok()?;
        let mut hasher = DefaultHasher::new();
        json.hash(&mut hasher);
        Some(hasher.finish())
    }
}

#[async_trait]
impl ConfigSource for HttpConfigSource {
    async fn subscribe_routes(&self, listener: RoutesChangeListener) -> Result<()> {
        let initial = Self::fetch(&self.client, &self.url).await?;
        tracing::info!(routes = initial.routes.len(), "loaded initial route configuration");
        let mut last_hash = Self::payload_hash(&initial);
        listener(initial.routes);

        let client = self.client.clone();
        let url = self.url.clone();
        let poll_interval = self.poll_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match Self::fetch(&client, &url).await {
                    Ok(payload) => {
                        let new_hash = Self::payload_hash(&payload);
                        if new_hash != last_hash {
                            tracing::info!(
                                routes = payload.routes.len(),
                                "route configuration changed"
                            );
                            last_hash = new_hash;
                            listener(payload.routes);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to poll route configuration");
                    }
                }
            }
        });
        Ok(())
    }
}
