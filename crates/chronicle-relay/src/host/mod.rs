//! Interfaces to the collaborators the engine runs inside of.
//!
//! The relay runtime owns storage, live subscriptions and the wire protocol.
//! The engine only sees it through these hooks:
//!
//! - [`EventStore`] - persist, query and delete events
//! - [`Broadcaster`] - fan accepted events out to live subscribers
//! - [`RemotePool`] - subscribe to and publish on remote relays
//!
//! Two implementations ship with the crate: [`MemoryHost`], an in-memory
//! store and broadcaster over nostr-sdk's memory database, and [`NostrPool`],
//! a remote pool backed by nostr-sdk.

mod memory;
mod pool;

pub use memory::MemoryHost;
pub use pool::NostrPool;

use crate::Result;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use nostr_sdk::{Event, EventId, Filter};
use std::time::Duration;

/// Outcome of persisting an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    /// The event was new and has been written.
    Stored,
    /// An event with the same id, or a newer version of a replaceable
    /// event, was already stored; nothing changed.
    Duplicate,
}

/// Storage hooks provided by the relay runtime.
///
/// `save` must be idempotent: saving an id twice reports
/// [`SaveStatus::Duplicate`] the second time and has no other effect.
pub trait EventStore: Send + Sync {
    /// Persist an event.
    fn save<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<SaveStatus>>;

    /// Return stored events matching the filter.
    fn query(&self, filter: Filter) -> BoxFuture<'_, Result<Vec<Event>>>;

    /// Remove an event by id. Returns whether something was removed.
    fn delete<'a>(&'a self, id: &'a EventId) -> BoxFuture<'a, Result<bool>>;
}

/// Live-subscriber fan-out provided by the relay runtime.
pub trait Broadcaster: Send + Sync {
    /// Deliver an accepted event to every matching live subscription.
    fn notify(&self, event: &Event);
}

/// Pool of remote relays used for profile lookups, backfill, archival and backups.
pub trait RemotePool: Send + Sync {
    /// Subscribe to `filters` on every relay in `urls`.
    ///
    /// The returned stream merges all relays, yields each event id at most
    /// once, and ends once `timeout` has elapsed or every relay is exhausted.
    /// Relays that cannot be reached are skipped.
    fn subscribe_many(
        &self,
        urls: Vec<String>,
        filters: Vec<Filter>,
        timeout: Duration,
    ) -> BoxStream<'static, Event>;

    /// Publish a signed event to a single relay.
    fn publish(&self, url: String, event: Event, timeout: Duration) -> BoxFuture<'static, Result<()>>;
}
