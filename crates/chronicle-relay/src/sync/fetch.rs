//! On-demand backfill of a single conversation.
//!
//! Triggered when an owner replies in a thread the relay does not track yet.
//! The root and every event referencing it are pulled from the seed relays
//! (plus the relay hint carried by the reply) and written straight to the
//! store. Nothing fetched here touches the root registry.

use crate::Result;
use crate::host::{EventStore, RemotePool, SaveStatus};
use chronicle_core::{CONVERSATION_KINDS, ThreadReference};
use futures::StreamExt;
use metrics::counter;
use nostr_sdk::Filter;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for conversation backfill.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Relays queried in addition to the reply's relay hint.
    pub seed_relays: Vec<String>,

    /// Overall time budget for one conversation.
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            seed_relays: chronicle_core::DEFAULT_SEED_RELAYS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Statistics from one backfill.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Events received from remote relays.
    pub events_received: usize,
    /// Events newly written to the store.
    pub events_stored: usize,
    /// Events the store already had.
    pub events_duplicate: usize,
}

/// Backfills missing threads into the store.
pub struct ConversationFetcher {
    pool: Arc<dyn RemotePool>,
    store: Arc<dyn EventStore>,
    config: FetchConfig,
}

impl ConversationFetcher {
    pub fn new(pool: Arc<dyn RemotePool>, store: Arc<dyn EventStore>, config: FetchConfig) -> Self {
        Self {
            pool,
            store,
            config,
        }
    }

    /// Relays to query for a thread: the hint first, then the seeds.
    fn relays_for(&self, reference: &ThreadReference) -> Vec<String> {
        let mut relays = Vec::with_capacity(self.config.seed_relays.len() + 1);
        if let Some(hint) = &reference.relay_hint {
            relays.push(hint.clone());
        }
        for url in &self.config.seed_relays {
            if !relays.contains(url) {
                relays.push(url.clone());
            }
        }
        relays
    }

    /// Pull the thread rooted at `reference.root` into the store.
    ///
    /// Stops when the remote stream ends or the timeout elapses; whatever
    /// arrived by then stays stored. Store failures skip the event.
    pub async fn fetch(&self, reference: &ThreadReference) -> Result<FetchStats> {
        let filters = vec![
            Filter::new().id(reference.root),
            Filter::new()
                .kinds(CONVERSATION_KINDS)
                .event(reference.root),
        ];

        counter!("fetch_conversations_total").increment(1);
        let mut events =
            self.pool
                .subscribe_many(self.relays_for(reference), filters, self.config.timeout);

        let mut stats = FetchStats::default();
        let deadline = tokio::time::sleep(self.config.timeout);
        tokio::pin!(deadline);

        loop {
            let event = tokio::select! {
                _ = &mut deadline => break,
                next = events.next() => match next {
                    Some(event) => event,
                    None => break,
                },
            };

            stats.events_received += 1;
            match self.store.save(&event).await {
                Ok(SaveStatus::Stored) => stats.events_stored += 1,
                Ok(SaveStatus::Duplicate) => stats.events_duplicate += 1,
                Err(e) => tracing::warn!("Failed to store backfilled event {}: {}", event.id, e),
            }
        }

        counter!("fetch_events_stored_total").increment(stats.events_stored as u64);
        tracing::debug!(
            "Backfilled thread {}: {} received, {} stored",
            reference.root,
            stats.events_received,
            stats.events_stored
        );
        Ok(stats)
    }
}
