//! Trust-gated acceptance of events.
//!
//! # Rules
//!
//! Evaluated in order, the first match accepts:
//!
//! 1. The author is an owner. When the event replies in a thread the registry
//!    does not know yet, a backfill of that thread is started.
//! 2. The event is a note, article, deletion, reaction or zap, its thread root
//!    is registered and the author is trusted.
//! 3. The event is a deletion, reaction, zap request or zap receipt and the
//!    event it points at is already stored.
//!
//! Everything else is rejected.
//!
//! # Side Effects
//!
//! [`AcceptancePolicy::admit`] runs the rules and, on acceptance, registers
//! new roots, stores the event, hands it to live subscribers and replicates
//! it to the backup relays.

use super::gate::EventRule;
use crate::Result;
use crate::host::{Broadcaster, EventStore, SaveStatus};
use crate::registry::RootRegistry;
use crate::sync::{BackupPropagator, ConversationFetcher};
use crate::tasks::TaskSupervisor;
use crate::trust::TrustHandle;
use chronicle_core::{ThreadReference, is_reference_kind, is_root_kind, thread_reference};
use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::counter;
use nostr_sdk::{Event, EventId, Filter, PublicKey};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Public keys that own the relay. Fixed after startup.
#[derive(Debug, Clone, Default)]
pub struct OwnerSet {
    keys: HashSet<PublicKey>,
}

impl OwnerSet {
    pub fn new<I: IntoIterator<Item = PublicKey>>(keys: I) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    pub fn contains(&self, pubkey: &PublicKey) -> bool {
        self.keys.contains(pubkey)
    }

    pub fn to_vec(&self) -> Vec<PublicKey> {
        self.keys.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Outcome of the acceptance rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

/// Outcome of admitting an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Accepted and newly stored.
    Stored,
    /// Accepted, but the store already had it. No broadcast or backup.
    Duplicate,
    Rejected,
}

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Published to this relay by a client.
    Client,
    /// Pulled in by an archival pass. Never triggers backfill or backup.
    Archive,
}

/// Accept/reject tallies.
///
/// `accepted` counts events that passed the rules and were newly stored.
/// Accepted events the store already had are counted as `duplicates` only.
#[derive(Debug, Default)]
pub struct Counters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    duplicates: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_accept(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        counter!("policy_events_accepted_total").increment(1);
    }

    fn record_reject(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        counter!("policy_events_rejected_total").increment(1);
    }

    fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
        counter!("policy_events_duplicate_total").increment(1);
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Accepted events the store already had.
    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }
}

/// Decides which events enter the store and applies the acceptance side effects.
pub struct AcceptancePolicy {
    owners: Arc<OwnerSet>,
    trust: TrustHandle,
    registry: Arc<RootRegistry>,
    store: Arc<dyn EventStore>,
    broadcaster: Arc<dyn Broadcaster>,
    backfill: Option<(Arc<ConversationFetcher>, Arc<TaskSupervisor>)>,
    backup: Option<Arc<BackupPropagator>>,
    counters: Arc<Counters>,
}

impl AcceptancePolicy {
    pub fn new(
        owners: Arc<OwnerSet>,
        trust: TrustHandle,
        registry: Arc<RootRegistry>,
        store: Arc<dyn EventStore>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            owners,
            trust,
            registry,
            store,
            broadcaster,
            backfill: None,
            backup: None,
            counters: Arc::new(Counters::new()),
        }
    }

    /// Backfill unknown threads owners reply in, as supervised tasks.
    pub fn with_backfill(
        mut self,
        fetcher: Arc<ConversationFetcher>,
        supervisor: Arc<TaskSupervisor>,
    ) -> Self {
        self.backfill = Some((fetcher, supervisor));
        self
    }

    /// Replicate accepted client events to backup relays.
    pub fn with_backup(mut self, backup: Arc<BackupPropagator>) -> Self {
        self.backup = Some(backup);
        self
    }

    /// Record tallies into a shared sink.
    pub fn with_counters(mut self, counters: Arc<Counters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    /// Run the acceptance rules without side effects other than backfill.
    pub async fn decide(&self, event: &Event, check_thread_archived: bool) -> Decision {
        let reference = thread_reference(event);

        if self.owners.contains(&event.pubkey) {
            if check_thread_archived
                && let Some(reference) = &reference
                && !self.registry.includes(&reference.root)
            {
                self.spawn_backfill(reference.clone());
            }
            return Decision::Accept;
        }

        // Non-owner top-level events are never accepted
        let Some(reference) = reference else {
            return Decision::Reject;
        };

        let thread_kind = is_root_kind(event.kind) || is_reference_kind(event.kind);
        if thread_kind
            && self.registry.includes(&reference.root)
            && self.trust.contains(&event.pubkey)
        {
            return Decision::Accept;
        }

        if is_reference_kind(event.kind) && self.is_stored(&reference.root).await {
            return Decision::Accept;
        }

        Decision::Reject
    }

    /// Decide on an event and, if accepted, register, store, broadcast and back it up.
    pub async fn admit(&self, event: &Event, origin: Origin) -> Result<Admission> {
        let check_thread_archived = origin == Origin::Client;
        if self.decide(event, check_thread_archived).await == Decision::Reject {
            self.counters.record_reject();
            return Ok(Admission::Rejected);
        }

        if is_root_kind(event.kind) {
            let root = thread_reference(event).map_or(event.id, |r| r.root);
            self.registry.add(root);
        }

        match self.store.save(event).await? {
            SaveStatus::Duplicate => {
                self.counters.record_duplicate();
                Ok(Admission::Duplicate)
            }
            SaveStatus::Stored => {
                self.counters.record_accept();
                self.broadcaster.notify(event);
                if origin == Origin::Client
                    && let Some(backup) = &self.backup
                {
                    backup.propagate(event);
                }
                Ok(Admission::Stored)
            }
        }
    }

    fn spawn_backfill(&self, reference: ThreadReference) {
        let Some((fetcher, supervisor)) = &self.backfill else {
            return;
        };

        let fetcher = Arc::clone(fetcher);
        supervisor.spawn_cancellable(async move {
            if let Err(e) = fetcher.fetch(&reference).await {
                tracing::warn!("Backfill of thread {} failed: {}", reference.root, e);
            }
        });
    }

    async fn is_stored(&self, id: &EventId) -> bool {
        match self.store.query(Filter::new().id(*id).limit(1)).await {
            Ok(found) => !found.is_empty(),
            Err(e) => {
                tracing::warn!("Store lookup for {} failed: {}", id, e);
                false
            }
        }
    }
}

impl EventRule for AcceptancePolicy {
    fn reject<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Option<String>> {
        async move {
            match self.admit(event, Origin::Client).await {
                Ok(Admission::Stored | Admission::Duplicate) => None,
                Ok(Admission::Rejected) => Some("blocked: event not allowed".to_string()),
                Err(e) => {
                    tracing::error!("Failed to admit {}: {}", event.id, e);
                    Some("error: could not store event".to_string())
                }
            }
        }
        .boxed()
    }
}
