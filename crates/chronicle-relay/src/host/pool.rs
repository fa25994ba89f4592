//! Remote relay pool backed by nostr-sdk.
//!
//! Relays are added to a single shared `Client` lazily, the first time an
//! operation names them, and stay connected for the life of the process.

use super::RemotePool;
use crate::{Error, Result};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use nostr_sdk::prelude::*;
use std::collections::HashSet;
use std::time::Duration;

/// Remote pool sharing one nostr-sdk client across all operations.
#[derive(Clone)]
pub struct NostrPool {
    client: Client,
}

impl Default for NostrPool {
    fn default() -> Self {
        Self::new()
    }
}

impl NostrPool {
    /// Create a pool with an ephemeral keypair used only for NIP-42 auth.
    pub fn new() -> Self {
        let keys = Keys::generate();
        tracing::debug!(
            "Generated ephemeral keypair for relay auth: {}",
            keys.public_key()
                .to_bech32()
                .unwrap_or_else(|_| "unknown".to_string())
        );

        let client = Client::builder().signer(keys).build();
        client.automatic_authentication(true);

        Self { client }
    }

    /// Disconnect from every relay.
    pub async fn shutdown(&self) {
        self.client.disconnect().await;
    }

    /// Add and connect the given relays, returning the ones that were usable.
    async fn ensure_relays(client: &Client, urls: &[String]) -> Vec<String> {
        let mut usable = Vec::with_capacity(urls.len());
        for url in urls {
            if let Err(e) = client.add_relay(url.as_str()).await {
                tracing::debug!("Failed to add relay {}: {}", url, e);
                continue;
            }
            if let Err(e) = client.connect_relay(url.as_str()).await {
                tracing::debug!("Failed to connect relay {}: {}", url, e);
                continue;
            }
            usable.push(url.clone());
        }
        usable
    }
}

impl RemotePool for NostrPool {
    fn subscribe_many(
        &self,
        urls: Vec<String>,
        filters: Vec<Filter>,
        timeout: Duration,
    ) -> BoxStream<'static, Event> {
        let client = self.client.clone();

        let merged = async move {
            let usable = Self::ensure_relays(&client, &urls).await;
            if usable.is_empty() {
                tracing::warn!("None of the {} requested relays is reachable", urls.len());
                return stream::select_all(Vec::new());
            }

            let mut streams = Vec::with_capacity(filters.len());
            for filter in filters {
                match client
                    .stream_events_from(usable.clone(), filter, timeout)
                    .await
                {
                    Ok(events) => streams.push(events),
                    Err(e) => tracing::warn!("Subscription failed: {}", e),
                }
            }
            stream::select_all(streams)
        };

        let mut seen: HashSet<EventId> = HashSet::new();
        stream::once(merged)
            .flatten()
            .filter(move |event| futures::future::ready(seen.insert(event.id)))
            .boxed()
    }

    fn publish(&self, url: String, event: Event, timeout: Duration) -> BoxFuture<'static, Result<()>> {
        let client = self.client.clone();

        async move {
            client.add_relay(url.as_str()).await?;
            client.connect_relay(url.as_str()).await?;

            let output = tokio::time::timeout(timeout, client.send_event_to([url.as_str()], &event))
                .await
                .map_err(|_| Error::Timeout(timeout))??;

            if output.success.is_empty() {
                let reason = output
                    .failed
                    .into_values()
                    .next()
                    .unwrap_or_else(|| "no acknowledgement".to_string());
                return Err(Error::Publish { url, reason });
            }
            Ok(())
        }
        .boxed()
    }
}
