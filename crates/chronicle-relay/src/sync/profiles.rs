//! Profile metadata for the trust network.
//!
//! Before each trust rebuild the latest kind:0 metadata of every member is
//! pulled from the seed relays and written to the store, so clients of the
//! relay can render names and avatars for the people allowed to post.

use crate::host::{EventStore, RemotePool, SaveStatus};
use futures::StreamExt;
use metrics::counter;
use nostr_sdk::{Event, Filter, Kind, PublicKey};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Configuration for profile refreshes.
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    /// Relays queried for metadata.
    pub seed_relays: Vec<String>,

    /// Time budget for each batch query.
    pub fetch_timeout: Duration,

    /// Authors per metadata query.
    pub batch_size: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            seed_relays: chronicle_core::DEFAULT_SEED_RELAYS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            fetch_timeout: Duration::from_secs(30),
            batch_size: 500,
        }
    }
}

/// Statistics from one profile refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileStats {
    /// Authors metadata was requested for.
    pub requested: usize,
    /// Profiles newly written to the store.
    pub stored: usize,
    /// Profiles the store already had in this or a newer version.
    pub unchanged: usize,
    /// Profiles the store refused.
    pub failed: usize,
}

/// Pulls kind:0 metadata for a set of authors into the store.
pub struct ProfileRefresher {
    pool: Arc<dyn RemotePool>,
    store: Arc<dyn EventStore>,
    config: ProfileConfig,
}

impl ProfileRefresher {
    pub fn new(pool: Arc<dyn RemotePool>, store: Arc<dyn EventStore>, config: ProfileConfig) -> Self {
        Self {
            pool,
            store,
            config,
        }
    }

    /// Fetch and store the latest profile of each author.
    ///
    /// Batches that return nothing and profiles the store refuses are logged
    /// and skipped.
    pub async fn refresh(&self, authors: &[PublicKey]) -> ProfileStats {
        let started = Instant::now();
        let mut stats = ProfileStats {
            requested: authors.len(),
            ..Default::default()
        };

        for batch in authors.chunks(self.config.batch_size.max(1)) {
            for event in self.fetch_batch(batch).await {
                match self.store.save(&event).await {
                    Ok(SaveStatus::Stored) => stats.stored += 1,
                    Ok(SaveStatus::Duplicate) => stats.unchanged += 1,
                    Err(e) => {
                        stats.failed += 1;
                        tracing::warn!("Failed to store profile of {}: {}", event.pubkey, e);
                    }
                }
            }
        }

        counter!("profiles_stored_total").increment(stats.stored as u64);
        tracing::info!(
            "Refreshed profiles: {} requested, {} updated, {} unchanged ({:.1}s)",
            stats.requested,
            stats.stored,
            stats.unchanged,
            started.elapsed().as_secs_f64()
        );
        stats
    }

    /// Latest metadata event for each author of the batch.
    async fn fetch_batch(&self, batch: &[PublicKey]) -> Vec<Event> {
        let wanted: HashSet<PublicKey> = batch.iter().copied().collect();
        let filter = Filter::new()
            .authors(batch.iter().copied())
            .kind(Kind::Metadata);

        let mut events = self.pool.subscribe_many(
            self.config.seed_relays.clone(),
            vec![filter],
            self.config.fetch_timeout,
        );
        let deadline = tokio::time::sleep(self.config.fetch_timeout);
        tokio::pin!(deadline);

        let mut latest: HashMap<PublicKey, Event> = HashMap::new();
        loop {
            let event = tokio::select! {
                _ = &mut deadline => break,
                next = events.next() => match next {
                    Some(event) => event,
                    None => break,
                },
            };
            if event.kind != Kind::Metadata || !wanted.contains(&event.pubkey) {
                continue;
            }
            match latest.get(&event.pubkey) {
                Some(current) if current.created_at >= event.created_at => {}
                _ => {
                    latest.insert(event.pubkey, event);
                }
            }
        }

        if latest.is_empty() {
            tracing::debug!("No profiles returned for a batch of {} authors", batch.len());
        }
        latest.into_values().collect()
    }
}
