//! Reject chains for the relay's three policy injection points.
//!
//! The host consults a [`PolicyChain`] before it handles an inbound event, a
//! subscription filter or a new connection. Rules run in insertion order and
//! the first rejection wins. Rejection messages use the NIP-01 machine
//! readable prefixes (`blocked:`, `invalid:`, `error:`).

use futures::FutureExt;
use futures::future::BoxFuture;
use nostr_sdk::{Event, Filter};
use std::net::IpAddr;
use std::sync::Arc;

/// Decides whether an inbound event may enter the relay.
pub trait EventRule: Send + Sync {
    /// `Some(message)` rejects the event.
    fn reject<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Option<String>>;
}

/// Decides whether a subscription filter is served.
pub trait FilterRule: Send + Sync {
    fn reject(&self, filter: &Filter) -> Option<String>;
}

/// What the host knows about a connecting client.
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    pub remote_ip: Option<IpAddr>,
}

/// Decides whether a client may connect.
pub trait ConnectionRule: Send + Sync {
    fn reject(&self, connection: &ConnectionInfo) -> Option<String>;
}

/// Ordered rules for events, filters and connections.
#[derive(Default, Clone)]
pub struct PolicyChain {
    events: Vec<Arc<dyn EventRule>>,
    filters: Vec<Arc<dyn FilterRule>>,
    connections: Vec<Arc<dyn ConnectionRule>>,
}

impl PolicyChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain holding the built-in event and filter rules.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_event_rule(Arc::new(RejectBase64Media))
            .with_filter_rule(Arc::new(NoEmptyFilters))
            .with_filter_rule(Arc::new(NoComplexFilters))
    }

    pub fn with_event_rule(mut self, rule: Arc<dyn EventRule>) -> Self {
        self.events.push(rule);
        self
    }

    pub fn with_filter_rule(mut self, rule: Arc<dyn FilterRule>) -> Self {
        self.filters.push(rule);
        self
    }

    pub fn with_connection_rule(mut self, rule: Arc<dyn ConnectionRule>) -> Self {
        self.connections.push(rule);
        self
    }

    /// Run the event rules. `Some(message)` means the event is rejected.
    pub async fn reject_event(&self, event: &Event) -> Option<String> {
        for rule in &self.events {
            if let Some(message) = rule.reject(event).await {
                return Some(message);
            }
        }
        None
    }

    pub fn reject_filter(&self, filter: &Filter) -> Option<String> {
        self.filters.iter().find_map(|rule| rule.reject(filter))
    }

    pub fn reject_connection(&self, connection: &ConnectionInfo) -> Option<String> {
        self.connections
            .iter()
            .find_map(|rule| rule.reject(connection))
    }
}

/// Rejects events whose content embeds base64 images or videos.
pub struct RejectBase64Media;

impl EventRule for RejectBase64Media {
    fn reject<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Option<String>> {
        let verdict = chronicle_core::has_base64_media(&event.content)
            .then(|| "invalid: base64 media is not allowed".to_string());
        async move { verdict }.boxed()
    }
}

/// Rejects filters with no id, author, kind or tag condition.
pub struct NoEmptyFilters;

impl FilterRule for NoEmptyFilters {
    fn reject(&self, filter: &Filter) -> Option<String> {
        let conditions = filter.ids.as_ref().map_or(0, |s| s.len())
            + filter.authors.as_ref().map_or(0, |s| s.len())
            + filter.kinds.as_ref().map_or(0, |s| s.len())
            + filter.generic_tags.values().map(|v| v.len()).sum::<usize>();

        (conditions == 0).then(|| "blocked: empty filters are not served".to_string())
    }
}

/// Rejects filters combining many tag conditions with many kinds.
pub struct NoComplexFilters;

impl NoComplexFilters {
    const MAX_TAG_KEYS: usize = 2;
    const MAX_ITEMS: usize = 4;
}

impl FilterRule for NoComplexFilters {
    fn reject(&self, filter: &Filter) -> Option<String> {
        let tag_keys = filter.generic_tags.len();
        let items = tag_keys + filter.kinds.as_ref().map_or(0, |s| s.len());

        (tag_keys > Self::MAX_TAG_KEYS && items > Self::MAX_ITEMS)
            .then(|| "blocked: too many things to filter for".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::{Alphabet, EventBuilder, Keys, Kind, SingleLetterTag, Timestamp};

    struct DenyAll;

    impl ConnectionRule for DenyAll {
        fn reject(&self, _connection: &ConnectionInfo) -> Option<String> {
            Some("blocked: closed".to_string())
        }
    }

    fn text(content: &str) -> Event {
        EventBuilder::text_note(content)
            .sign_with_keys(&Keys::generate())
            .unwrap()
    }

    #[tokio::test]
    async fn test_base64_media_rejected() {
        let chain = PolicyChain::with_defaults();

        let inline = text("look data:image/png;base64,iVBORw0KGgo=");
        assert!(chain.reject_event(&inline).await.is_some());

        let linked = text("look https://example.com/cat.png");
        assert!(chain.reject_event(&linked).await.is_none());
    }

    #[test]
    fn test_empty_filter_rejected() {
        let chain = PolicyChain::with_defaults();

        assert!(chain.reject_filter(&Filter::new()).is_some());
        assert!(chain.reject_filter(&Filter::new().limit(10)).is_some());
        assert!(
            chain
                .reject_filter(&Filter::new().since(Timestamp::from(1)))
                .is_some()
        );
        assert!(chain.reject_filter(&Filter::new().kind(Kind::TextNote)).is_none());
    }

    #[test]
    fn test_complex_filter_rejected() {
        let chain = PolicyChain::with_defaults();
        let tagged = Filter::new()
            .custom_tag(SingleLetterTag::lowercase(Alphabet::E), "a")
            .custom_tag(SingleLetterTag::lowercase(Alphabet::P), "b")
            .custom_tag(SingleLetterTag::lowercase(Alphabet::T), "c");

        // Three tag keys alone stay under the item limit
        assert!(chain.reject_filter(&tagged).is_none());

        let complex = tagged.kinds([Kind::TextNote, Kind::Reaction]);
        assert!(chain.reject_filter(&complex).is_some());
    }

    #[test]
    fn test_connection_chain_is_empty_by_default() {
        let info = ConnectionInfo::default();
        assert!(PolicyChain::with_defaults().reject_connection(&info).is_none());

        let closed = PolicyChain::new().with_connection_rule(Arc::new(DenyAll));
        assert_eq!(
            closed.reject_connection(&info).as_deref(),
            Some("blocked: closed")
        );
    }
}
