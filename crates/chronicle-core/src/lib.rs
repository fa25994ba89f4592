//! Core types and shared utilities for the Chronicle relay engine.
//!
//! This crate provides:
//! - Event interpretation (kind classes, thread roots, follow lists) on top of the nostr crate
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
mod event;
pub mod metrics;

/// Seed relays used for profile lookups, conversation backfill and archival.
pub const DEFAULT_SEED_RELAYS: [&str; 14] = [
    "wss://nos.lol",
    "wss://nostr.mom",
    "wss://purplepag.es",
    "wss://purplerelay.com",
    "wss://relay.damus.io",
    "wss://relay.nostr.band",
    "wss://relay.snort.social",
    "wss://relayable.org",
    "wss://relay.primal.net",
    "wss://relay.nostr.bg",
    "wss://no.str.cr",
    "wss://nostr21.com",
    "wss://nostrue.com",
    "wss://relay.siamstr.com",
];

pub use error::{Error, Result};
pub use event::{
    ARCHIVE_KINDS, CONVERSATION_KINDS, REFERENCE_KINDS, ROOT_KINDS, ThreadReference,
    followed_pubkeys, has_base64_media, is_reference_kind, is_root_kind, parse_event_id,
    parse_public_key, thread_reference,
};
