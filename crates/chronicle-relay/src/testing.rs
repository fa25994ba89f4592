//! Test doubles and event builders shared by the unit tests.

use crate::host::RemotePool;
use crate::{Error, Result};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use nostr_sdk::prelude::*;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Remote pool that replays scripted events and records publishes.
///
/// Events are replayed verbatim, duplicates included, so callers can be
/// tested against re-delivery.
#[derive(Default)]
pub struct MockPool {
    /// Scripted events, optionally pinned to a single relay url.
    events: Mutex<Vec<(Option<String>, Event)>>,
    /// Every `subscribe_many` call: relay urls and filters.
    subscriptions: Mutex<Vec<(Vec<String>, Vec<Filter>)>>,
    /// Successful publishes: destination url and event id.
    published: Mutex<Vec<(String, EventId)>>,
    failing: Mutex<HashSet<String>>,
    hold_open: Mutex<bool>,
}

impl MockPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve an event from every relay.
    pub fn script(&self, event: Event) {
        self.events.lock().push((None, event));
    }

    /// Serve an event only from `url`.
    pub fn script_on(&self, url: &str, event: Event) {
        self.events.lock().push((Some(url.to_string()), event));
    }

    /// Make publishes to `url` fail.
    pub fn fail_publishes_to(&self, url: &str) {
        self.failing.lock().insert(url.to_string());
    }

    /// Keep subscription streams open until their timeout instead of ending
    /// after the scripted events.
    pub fn hold_open(&self) {
        *self.hold_open.lock() = true;
    }

    pub fn subscriptions(&self) -> Vec<(Vec<String>, Vec<Filter>)> {
        self.subscriptions.lock().clone()
    }

    pub fn published(&self) -> Vec<(String, EventId)> {
        self.published.lock().clone()
    }
}

impl RemotePool for MockPool {
    fn subscribe_many(
        &self,
        urls: Vec<String>,
        filters: Vec<Filter>,
        timeout: Duration,
    ) -> BoxStream<'static, Event> {
        let matched: Vec<Event> = self
            .events
            .lock()
            .iter()
            .filter(|(pinned, _)| pinned.as_ref().is_none_or(|url| urls.contains(url)))
            .filter(|(_, event)| {
                filters
                    .iter()
                    .any(|f| f.match_event(event, MatchEventOptions::new()))
            })
            .map(|(_, event)| event.clone())
            .collect();
        self.subscriptions.lock().push((urls, filters));

        let replay = stream::iter(matched);
        if *self.hold_open.lock() {
            replay
                .chain(stream::pending())
                .take_until(tokio::time::sleep(timeout))
                .boxed()
        } else {
            replay.boxed()
        }
    }

    fn publish(&self, url: String, event: Event, _timeout: Duration) -> BoxFuture<'static, Result<()>> {
        let result = if self.failing.lock().contains(&url) {
            Err(Error::Publish {
                url,
                reason: "connection refused".to_string(),
            })
        } else {
            self.published.lock().push((url, event.id));
            Ok(())
        };
        async move { result }.boxed()
    }
}

pub fn note(keys: &Keys, content: &str) -> Event {
    EventBuilder::text_note(content).sign_with_keys(keys).unwrap()
}

/// A text note replying to `root` with a NIP-10 root marker.
pub fn reply(keys: &Keys, root: EventId, content: &str) -> Event {
    let root_tag = Tag::parse(["e", root.to_hex().as_str(), "", "root"]).unwrap();
    EventBuilder::text_note(content)
        .tag(root_tag)
        .sign_with_keys(keys)
        .unwrap()
}

pub fn reaction(keys: &Keys, target: EventId) -> Event {
    EventBuilder::new(Kind::Reaction, "+")
        .tag(Tag::event(target))
        .sign_with_keys(keys)
        .unwrap()
}

/// A kind:0 profile carrying only a name.
pub fn metadata(keys: &Keys, name: &str, created_at: u64) -> Event {
    EventBuilder::metadata(&Metadata::new().name(name))
        .custom_created_at(Timestamp::from(created_at))
        .sign_with_keys(keys)
        .unwrap()
}

pub fn contact_list(keys: &Keys, follows: &[PublicKey], created_at: u64) -> Event {
    EventBuilder::new(Kind::ContactList, "")
        .tags(follows.iter().map(|pk| Tag::public_key(*pk)))
        .custom_created_at(Timestamp::from(created_at))
        .sign_with_keys(keys)
        .unwrap()
}
