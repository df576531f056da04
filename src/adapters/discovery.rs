//! HTTP-polling service-discovery source.
//!
//! Fetches the topology payload (`{"services": [{"service", "instances"}]}`)
//! from a URL and delivers each service's definition and instance set to the
//! listener, on the initial load and whenever the payload changes.
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    time::Duration,
};

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use reqwest::Client;

use crate::{
    config::models::{ServicesPayload, SourceConfig},
    ports::{DiscoverySource, ServiceChangeListener},
};

pub struct HttpDiscoverySource {
    url: String,
    poll_interval: Duration,
    client: Client,
}

impl HttpDiscoverySource {
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

    async fn fetch(client: &Client, url: &str) -> Result<ServicesPayload> {
        let response = client
            .get(url)
            .send()
            .await
            .wrap_err("Failed to fetch service topology")?;
        response
            .json::<ServicesPayload>()
            .await
            .wrap_err("Failed to parse service topology payload")
    }

    fn payload_hash(payload: &ServicesPayload) -> Option<u64> {
        let json = serde_json::to_string(payload).ok()?;
        let mut hasher = DefaultHasher::new();
        json.hash(&mut hasher);
        Some(hasher.finish())
    }

    fn deliver(payload: ServicesPayload, listener: &ServiceChangeListener) {
        for entry in payload.services {
            listener(entry.service, entry.instances);
        }
    }
}

#[async_trait]
impl DiscoverySource for HttpDiscoverySource {
    async fn subscribe_services(&self, listener: ServiceChangeListener) -> Result<()> {
        let initial = Self::fetch(&self.client, &self.url).await?;
        tracing::info!(
            services = initial.services.len(),
            "loaded initial service topology"
        );
        let mut last_hash = Self::payload_hash(&initial);
        Self::deliver(initial, &listener);

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
                                services = payload.services.len(),
                                "service topology changed"
                            );
                            last_hash = new_hash;
                            Self::deliver(payload, &listener);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to poll service topology");
                    }
                }
            }
        });
        Ok(())
    }
}
