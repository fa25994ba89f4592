//! In-memory storage and broadcast hooks.
//!
//! Storage is nostr-sdk's [`MemoryDatabase`], so filter matching, replaceable
//! events and NIP-09 deletions behave like any nostr-sdk backed relay.
//!
//! Used by the `chronicle` daemon when no external store is attached, and by
//! the tests of every component that needs a host.

use super::{Broadcaster, EventStore, SaveStatus};
use crate::{Error, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use nostr_sdk::prelude::*;
use tokio::sync::broadcast;

/// Capacity of the live-subscriber channel.
const BROADCAST_CAPACITY: usize = 4096;

/// Event store and broadcaster kept entirely in memory.
pub struct MemoryHost {
    database: MemoryDatabase,
    live: broadcast::Sender<Event>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    /// Create an empty, unbounded host.
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(BROADCAST_CAPACITY);
        let database = MemoryDatabase::with_opts(MemoryDatabaseOptions {
            events: true,
            max_events: None,
        });
        Self { database, live }
    }

    /// Subscribe to events broadcast after acceptance.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.live.subscribe()
    }

    /// Number of stored events.
    pub async fn len(&self) -> Result<usize> {
        self.database.count(Filter::new()).await.map_err(store_error)
    }

    /// Whether the store holds no events.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Whether an event with this id is stored.
    pub async fn contains(&self, id: &EventId) -> Result<bool> {
        let status = self.database.check_id(id).await.map_err(store_error)?;
        Ok(status == DatabaseEventStatus::Saved)
    }
}

fn store_error(e: DatabaseError) -> Error {
    Error::Store(e.to_string())
}

/// Map the database outcome onto the host contract.
///
/// A stale replaceable event changes nothing, same as a duplicate.
fn save_status(status: SaveEventStatus) -> Result<SaveStatus> {
    match status {
        SaveEventStatus::Success => Ok(SaveStatus::Stored),
        SaveEventStatus::Rejected(RejectedReason::Duplicate | RejectedReason::Replaced) => {
            Ok(SaveStatus::Duplicate)
        }
        SaveEventStatus::Rejected(reason) => {
            Err(Error::Store(format!("event refused: {:?}", reason)))
        }
    }
}

impl EventStore for MemoryHost {
    fn save<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<SaveStatus>> {
        async move {
            let status = self.database.save_event(event).await.map_err(store_error)?;
            save_status(status)
        }
        .boxed()
    }

    fn query(&self, filter: Filter) -> BoxFuture<'_, Result<Vec<Event>>> {
        async move {
            // Newest first, like a relay answering a REQ
            let events = self.database.query(filter).await.map_err(store_error)?;
            Ok(events.to_vec())
        }
        .boxed()
    }

    fn delete<'a>(&'a self, id: &'a EventId) -> BoxFuture<'a, Result<bool>> {
        async move {
            if !self.contains(id).await? {
                return Ok(false);
            }
            self.database
                .delete(Filter::new().id(*id))
                .await
                .map_err(store_error)?;
            Ok(true)
        }
        .boxed()
    }
}

impl Broadcaster for MemoryHost {
    fn notify(&self, event: &Event) {
        // No live subscribers is not an error
        let _ = self.live.send(event.clone());
    }
}
