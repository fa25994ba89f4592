//! Web-of-trust snapshot and the builder that recomputes it.
//!
//! # Model
//!
//! The trust network is derived from kind:3 contact lists. Owners sit at hop 0.
//! Follow lists are fetched level by level for `hops` levels; every account
//! reachable that way is a candidate, and each candidate's follower count is
//! the number of fetched lists that include it.
//!
//! ```text
//! hop 0: owners ─── follow lists fetched
//!          │
//! hop 1: follows ── follow lists fetched when hops >= 2
//!          │
//! hop 2: follows of follows
//! ```
//!
//! Members are the owners plus every candidate with at least `min_followers`.
//!
//! # Publication
//!
//! A finished network is installed through the single [`TrustWriter`] and
//! read through any number of [`TrustHandle`]s. Readers always see a complete
//! snapshot, either the previous one or the new one.

use crate::host::RemotePool;
use crate::{Error, Result};
use futures::StreamExt;
use nostr_sdk::{Event, Filter, Kind, PublicKey};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Immutable set of trusted authors.
#[derive(Debug, Clone, Default)]
pub struct TrustNetwork {
    members: HashSet<PublicKey>,
    follower_counts: HashMap<PublicKey, usize>,
}

impl TrustNetwork {
    /// A network containing only the owners.
    pub fn from_owners<'a, I>(owners: I) -> Self
    where
        I: IntoIterator<Item = &'a PublicKey>,
    {
        Self {
            members: owners.into_iter().copied().collect(),
            follower_counts: HashMap::new(),
        }
    }

    pub fn contains(&self, pubkey: &PublicKey) -> bool {
        self.members.contains(pubkey)
    }

    /// Number of fetched follow lists that include `pubkey`.
    pub fn follower_count(&self, pubkey: &PublicKey) -> usize {
        self.follower_counts.get(pubkey).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = &PublicKey> {
        self.members.iter()
    }
}

/// Create the write capability and a read handle for a trust network.
pub fn trust_channel(initial: TrustNetwork) -> (TrustWriter, TrustHandle) {
    metrics::gauge!("trust_network_size").set(initial.len() as f64);
    let slot = Arc::new(RwLock::new(Arc::new(initial)));
    (
        TrustWriter {
            slot: Arc::clone(&slot),
        },
        TrustHandle { slot },
    )
}

/// Read side of the installed trust network.
#[derive(Clone)]
pub struct TrustHandle {
    slot: Arc<RwLock<Arc<TrustNetwork>>>,
}

impl TrustHandle {
    /// The currently installed network.
    pub fn snapshot(&self) -> Arc<TrustNetwork> {
        Arc::clone(&self.slot.read())
    }

    pub fn contains(&self, pubkey: &PublicKey) -> bool {
        self.slot.read().contains(pubkey)
    }
}

/// The only capability that can replace the installed network.
pub struct TrustWriter {
    slot: Arc<RwLock<Arc<TrustNetwork>>>,
}

impl TrustWriter {
    /// Swap in a new network, returning the one it replaced.
    pub fn install(&self, network: TrustNetwork) -> Arc<TrustNetwork> {
        let size = network.len();
        let previous = std::mem::replace(&mut *self.slot.write(), Arc::new(network));
        metrics::gauge!("trust_network_size").set(size as f64);
        previous
    }

    /// A read handle onto the same slot.
    pub fn handle(&self) -> TrustHandle {
        TrustHandle {
            slot: Arc::clone(&self.slot),
        }
    }
}

/// Configuration for trust network rebuilds.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    /// Relays queried for contact lists.
    pub seed_relays: Vec<String>,

    /// Minimum follower count for a candidate to be trusted.
    pub min_followers: usize,

    /// How many levels of the follow graph to walk.
    pub hops: u8,

    /// Timeout for each contact list query.
    pub fetch_timeout: Duration,

    /// Maximum number of authors per contact list query.
    pub batch_size: usize,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            seed_relays: chronicle_core::DEFAULT_SEED_RELAYS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_followers: 3,
            hops: 2,
            fetch_timeout: Duration::from_secs(30),
            batch_size: 500,
        }
    }
}

/// Recomputes the trust network from remote contact lists.
pub struct TrustBuilder {
    pool: Arc<dyn RemotePool>,
    config: TrustConfig,
}

impl TrustBuilder {
    pub fn new(pool: Arc<dyn RemotePool>, config: TrustConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Build a fresh network for `owners`.
    ///
    /// Fails when no owner contact list can be found, so the caller keeps
    /// whatever network it already has.
    pub async fn rebuild(&self, owners: &[PublicKey]) -> Result<TrustNetwork> {
        let started = Instant::now();
        let mut visited: HashSet<PublicKey> = owners.iter().copied().collect();
        let mut level: Vec<PublicKey> = visited.iter().copied().collect();
        let mut follower_counts: HashMap<PublicKey, usize> = HashMap::new();
        let mut lists_read = 0usize;

        for hop in 0..self.config.hops {
            if level.is_empty() {
                break;
            }

            let follow_lists = self.fetch_follow_lists(&level).await;
            if hop == 0 && follow_lists.is_empty() {
                metrics::counter!("trust_rebuild_failures_total").increment(1);
                return Err(Error::Trust(format!(
                    "no contact list found for any of {} owners",
                    owners.len()
                )));
            }
            lists_read += follow_lists.len();

            let mut next = Vec::new();
            for follows in follow_lists.values() {
                for pubkey in follows {
                    *follower_counts.entry(*pubkey).or_insert(0) += 1;
                    if visited.insert(*pubkey) {
                        next.push(*pubkey);
                    }
                }
            }

            tracing::debug!(
                "Hop {}: read {} follow lists, {} new candidates",
                hop,
                follow_lists.len(),
                next.len()
            );
            level = next;
        }

        let min = self.config.min_followers;
        let mut members: HashSet<PublicKey> = follower_counts
            .iter()
            .filter(|(_, count)| **count >= min)
            .map(|(pubkey, _)| *pubkey)
            .collect();
        members.extend(owners.iter().copied());

        tracing::info!(
            "Trust network rebuilt: {} members out of {} candidates ({} follow lists)",
            members.len(),
            visited.len(),
            lists_read
        );
        metrics::counter!("trust_rebuilds_total").increment(1);
        metrics::histogram!("trust_rebuild_duration_seconds").record(started.elapsed().as_secs_f64());

        Ok(TrustNetwork {
            members,
            follower_counts,
        })
    }

    /// Latest follow list for each author that has one.
    async fn fetch_follow_lists(&self, authors: &[PublicKey]) -> HashMap<PublicKey, Vec<PublicKey>> {
        let mut latest: HashMap<PublicKey, Event> = HashMap::new();

        for batch in authors.chunks(self.config.batch_size.max(1)) {
            let wanted: HashSet<PublicKey> = batch.iter().copied().collect();
            let filter = Filter::new()
                .authors(batch.iter().copied())
                .kind(Kind::ContactList);

            let mut events = self.pool.subscribe_many(
                self.config.seed_relays.clone(),
                vec![filter],
                self.config.fetch_timeout,
            );

            let mut found = 0usize;
            while let Some(event) = events.next().await {
                if event.kind != Kind::ContactList || !wanted.contains(&event.pubkey) {
                    continue;
                }
                found += 1;
                match latest.get(&event.pubkey) {
                    Some(current) if current.created_at >= event.created_at => {}
                    _ => {
                        latest.insert(event.pubkey, event);
                    }
                }
            }

            if found == 0 {
                tracing::warn!(
                    "No contact lists returned for a batch of {} authors, skipping",
                    batch.len()
                );
            }
        }

        latest
            .into_iter()
            .map(|(author, event)| (author, chronicle_core::followed_pubkeys(&event)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockPool, contact_list};
    use nostr_sdk::Keys;

    fn builder(pool: Arc<MockPool>, min_followers: usize, hops: u8) -> TrustBuilder {
        TrustBuilder::new(
            pool,
            TrustConfig {
                seed_relays: vec!["wss://seed.example.com".to_string()],
                min_followers,
                hops,
                fetch_timeout: Duration::from_secs(1),
                batch_size: 2,
            },
        )
    }

    #[tokio::test]
    async fn test_single_hop_from_one_owner() {
        let a = Keys::generate();
        let b = Keys::generate().public_key();
        let c = Keys::generate().public_key();
        let pool = MockPool::new();
        pool.script(contact_list(&a, &[b, c], 100));

        let network = builder(pool, 1, 1).rebuild(&[a.public_key()]).await.unwrap();

        assert_eq!(network.len(), 3);
        assert!(network.contains(&a.public_key()));
        assert!(network.contains(&b));
        assert!(network.contains(&c));
        assert_eq!(network.follower_count(&b), 1);
    }

    #[tokio::test]
    async fn test_minimum_followers_filters_candidates() {
        let owner1 = Keys::generate();
        let owner2 = Keys::generate();
        let popular = Keys::generate().public_key();
        let fringe = Keys::generate().public_key();
        let pool = MockPool::new();
        pool.script(contact_list(&owner1, &[popular, fringe], 100));
        pool.script(contact_list(&owner2, &[popular], 100));

        let owners = [owner1.public_key(), owner2.public_key()];
        let network = builder(pool, 2, 1).rebuild(&owners).await.unwrap();

        assert!(network.contains(&popular));
        assert!(!network.contains(&fringe));
        assert_eq!(network.follower_count(&fringe), 1);
        // Owners stay members even with no followers
        assert!(network.contains(&owner2.public_key()));
    }

    #[tokio::test]
    async fn test_second_hop_and_latest_list_wins() {
        let owner = Keys::generate();
        let friend = Keys::generate();
        let stale = Keys::generate().public_key();
        let friend_of_friend = Keys::generate().public_key();
        let pool = MockPool::new();
        pool.script(contact_list(&owner, &[stale], 100));
        pool.script(contact_list(&owner, &[friend.public_key()], 200));
        pool.script(contact_list(&friend, &[friend_of_friend], 100));

        let one_hop = builder(Arc::clone(&pool), 1, 1)
            .rebuild(&[owner.public_key()])
            .await
            .unwrap();
        assert!(!one_hop.contains(&friend_of_friend));
        assert!(!one_hop.contains(&stale));

        let two_hops = builder(pool, 1, 2)
            .rebuild(&[owner.public_key()])
            .await
            .unwrap();
        assert!(two_hops.contains(&friend.public_key()));
        assert!(two_hops.contains(&friend_of_friend));
    }

    #[tokio::test]
    async fn test_no_owner_list_fails_and_writer_keeps_previous() {
        let owner = Keys::generate().public_key();
        let previous = TrustNetwork::from_owners([&owner]);
        let (writer, handle) = trust_channel(previous);

        let result = builder(MockPool::new(), 1, 2).rebuild(&[owner]).await;
        assert!(matches!(result, Err(Error::Trust(_))));
        assert_eq!(handle.snapshot().len(), 1);

        let mut grown = TrustNetwork::from_owners([&owner]);
        grown.members.insert(Keys::generate().public_key());
        let replaced = writer.install(grown);
        assert_eq!(replaced.len(), 1);
        assert_eq!(handle.snapshot().len(), 2);
        assert_eq!(writer.handle().snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_owner_batches_are_split() {
        let owners: Vec<Keys> = (0..5).map(|_| Keys::generate()).collect();
        let pool = MockPool::new();
        for owner in &owners {
            pool.script(contact_list(owner, &[], 100));
        }

        let pubkeys: Vec<PublicKey> = owners.iter().map(|k| k.public_key()).collect();
        builder(Arc::clone(&pool), 1, 1).rebuild(&pubkeys).await.unwrap();

        // batch_size 2 over 5 owners
        assert_eq!(pool.subscriptions().len(), 3);
    }
}
