//! Bulk import of owner history from the seed relays.
//!
//! Every event authored by an owner or mentioning one (`#p`) is streamed from
//! the seed relays for a bounded window and run through the acceptance policy
//! exactly like an inbound event, minus backfill and backup.

use crate::host::RemotePool;
use crate::policy::{AcceptancePolicy, Admission, Origin};
use chronicle_core::ARCHIVE_KINDS;
use futures::StreamExt;
use metrics::counter;
use nostr_sdk::{Filter, PublicKey};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tallies from one archival pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Accepted and newly stored.
    pub trusted: usize,
    /// Rejected by the acceptance policy.
    pub untrusted: usize,
    /// Accepted but already stored.
    pub duplicate: usize,
    /// Accepted but the store failed.
    pub failed: usize,
}

/// Streams owner history into the store through the acceptance policy.
pub struct Archiver {
    pool: Arc<dyn RemotePool>,
    policy: Arc<AcceptancePolicy>,
    owners: Vec<PublicKey>,
    seed_relays: Vec<String>,
}

impl Archiver {
    pub fn new(
        pool: Arc<dyn RemotePool>,
        policy: Arc<AcceptancePolicy>,
        owners: Vec<PublicKey>,
        seed_relays: Vec<String>,
    ) -> Self {
        Self {
            pool,
            policy,
            owners,
            seed_relays,
        }
    }

    fn filters(&self) -> Vec<Filter> {
        vec![
            Filter::new()
                .kinds(ARCHIVE_KINDS)
                .authors(self.owners.iter().copied()),
            Filter::new()
                .kinds(ARCHIVE_KINDS)
                .pubkeys(self.owners.iter().copied()),
        ]
    }

    /// Consume the remote stream until it ends or `budget` elapses.
    pub async fn run(&self, budget: Duration) -> ArchiveStats {
        tracing::info!("Archiving owner notes for up to {:?}", budget);
        let started = Instant::now();

        let mut events = self
            .pool
            .subscribe_many(self.seed_relays.clone(), self.filters(), budget);
        let deadline = tokio::time::sleep(budget);
        tokio::pin!(deadline);

        let mut stats = ArchiveStats::default();
        loop {
            let event = tokio::select! {
                _ = &mut deadline => break,
                next = events.next() => match next {
                    Some(event) => event,
                    None => break,
                },
            };

            match self.policy.admit(&event, Origin::Archive).await {
                Ok(Admission::Stored) => {
                    stats.trusted += 1;
                    counter!("archive_events_trusted_total").increment(1);
                }
                Ok(Admission::Duplicate) => {
                    stats.duplicate += 1;
                    counter!("archive_events_duplicate_total").increment(1);
                }
                Ok(Admission::Rejected) => {
                    stats.untrusted += 1;
                    counter!("archive_events_untrusted_total").increment(1);
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!("Failed to archive {}: {}", event.id, e);
                }
            }
        }

        tracing::info!(
            "Archived {} trusted notes, discarded {} untrusted, {} already stored ({:.1}s)",
            stats.trusted,
            stats.untrusted,
            stats.duplicate,
            started.elapsed().as_secs_f64()
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Broadcaster, EventStore, MemoryHost};
    use crate::policy::OwnerSet;
    use crate::registry::RootRegistry;
    use crate::testing::{MockPool, note};
    use crate::trust::{TrustNetwork, trust_channel};
    use nostr_sdk::{EventBuilder, Keys, Kind, Tag};
    use tempfile::TempDir;

    struct Setup {
        _tmp: TempDir,
        owner: Keys,
        pool: Arc<MockPool>,
        host: Arc<MemoryHost>,
        registry: Arc<RootRegistry>,
        archiver: Archiver,
    }

    fn setup() -> Setup {
        let tmp = TempDir::new().unwrap();
        let owner = Keys::generate();
        let pool = MockPool::new();
        let host = Arc::new(MemoryHost::new());
        let registry = Arc::new(RootRegistry::new(tmp.path().join("root_notes")));
        let (_writer, trust) = trust_channel(TrustNetwork::from_owners([&owner.public_key()]));

        let policy = Arc::new(AcceptancePolicy::new(
            Arc::new(OwnerSet::new([owner.public_key()])),
            trust,
            Arc::clone(&registry),
            Arc::clone(&host) as Arc<dyn EventStore>,
            Arc::clone(&host) as Arc<dyn Broadcaster>,
        ));
        let archiver = Archiver::new(
            Arc::clone(&pool) as Arc<dyn RemotePool>,
            policy,
            vec![owner.public_key()],
            vec!["wss://seed.example.com".to_string()],
        );

        Setup {
            _tmp: tmp,
            owner,
            pool,
            host,
            registry,
            archiver,
        }
    }

    #[tokio::test]
    async fn test_redelivered_events_stored_once() {
        let s = setup();
        let first = note(&s.owner, "first");
        let second = note(&s.owner, "second");
        for event in [&first, &second, &first, &second, &first] {
            s.pool.script(event.clone());
        }

        let stats = s.archiver.run(Duration::from_secs(5)).await;

        assert_eq!(stats.trusted, 2);
        assert_eq!(stats.duplicate, 3);
        assert_eq!(s.host.len().await.unwrap(), 2);
        assert_eq!(s.registry.size(), 2);
    }

    #[tokio::test]
    async fn test_mentions_of_owner_pass_through_policy() {
        let s = setup();
        let stranger = Keys::generate();
        let mention = EventBuilder::text_note("hey owner")
            .tag(Tag::public_key(s.owner.public_key()))
            .sign_with_keys(&stranger)
            .unwrap();
        let root = note(&s.owner, "root");
        let like = EventBuilder::new(Kind::Reaction, "+")
            .tags([Tag::event(root.id), Tag::public_key(s.owner.public_key())])
            .sign_with_keys(&stranger)
            .unwrap();
        let answer = EventBuilder::text_note("untrusted answer")
            .tags([Tag::event(root.id), Tag::public_key(s.owner.public_key())])
            .sign_with_keys(&stranger)
            .unwrap();
        for event in [&root, &mention, &like, &answer] {
            s.pool.script(event.clone());
        }

        let stats = s.archiver.run(Duration::from_secs(5)).await;

        // The reaction points at the stored root; the mention and reply are untrusted
        assert_eq!(stats.trusted, 2);
        assert_eq!(stats.untrusted, 2);
        assert!(s.host.contains(&like.id).await.unwrap());
        assert!(!s.host.contains(&mention.id).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_bounds_the_pass() {
        let s = setup();
        s.pool.script(note(&s.owner, "only"));
        s.pool.hold_open();

        let stats = s.archiver.run(Duration::from_secs(60)).await;
        assert_eq!(stats.trusted, 1);
    }

    #[tokio::test]
    async fn test_filters_cover_authored_and_mentions() {
        let s = setup();
        s.archiver.run(Duration::from_secs(1)).await;

        let (urls, filters) = &s.pool.subscriptions()[0];
        assert_eq!(urls, &vec!["wss://seed.example.com".to_string()]);
        assert_eq!(filters.len(), 2);
        assert!(filters[0].authors.is_some());
        assert!(!filters[1].generic_tags.is_empty());
    }
}
