//! Event helpers used by the acceptance policy and the sync tasks.
//!
//! This module interprets the parts of a Nostr event the relay cares about:
//! - Kind classification (thread roots, thread references, archival kinds)
//! - One-level thread root resolution from `e` tags (NIP-10)
//! - Follow lists from kind:3 contact lists (`p` tags)
//! - Inline base64 media detection

use crate::error::{Error, Result};
use nostr::{Event, EventId, Kind, PublicKey};

/// Kinds that open a thread and are tracked in the root registry.
pub const ROOT_KINDS: [Kind; 2] = [Kind::TextNote, Kind::LongFormTextNote];

/// Kinds that point at another event and may be accepted when the
/// referenced event is already stored.
pub const REFERENCE_KINDS: [Kind; 4] = [
    Kind::EventDeletion,
    Kind::Reaction,
    Kind::ZapRequest,
    Kind::ZapReceipt,
];

/// Kinds requested when backfilling a single conversation.
pub const CONVERSATION_KINDS: [Kind; 6] = [
    Kind::LongFormTextNote,
    Kind::EventDeletion,
    Kind::Reaction,
    Kind::ZapRequest,
    Kind::ZapReceipt,
    Kind::TextNote,
];

/// Kinds requested when archiving owner history.
pub const ARCHIVE_KINDS: [Kind; 8] = [
    Kind::LongFormTextNote,
    Kind::EventDeletion,
    Kind::EncryptedDirectMessage,
    Kind::Reaction,
    Kind::Repost,
    Kind::ZapRequest,
    Kind::ZapReceipt,
    Kind::TextNote,
];

/// Returns true for text notes and long-form articles.
pub fn is_root_kind(kind: Kind) -> bool {
    ROOT_KINDS.contains(&kind)
}

/// Returns true for deletions, reactions, zap requests and zap receipts.
pub fn is_reference_kind(kind: Kind) -> bool {
    REFERENCE_KINDS.contains(&kind)
}

/// The root of the thread an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadReference {
    /// Id of the thread's root event.
    pub root: EventId,
    /// Relay where the root was seen, when the tag carries a usable hint.
    pub relay_hint: Option<String>,
}

/// Resolve the thread root referenced by an event.
///
/// Resolution is one-level, it never walks the reply chain:
/// - a single `e` tag marked `root` wins
/// - several `root` markers naming different ids are treated as no root
/// - otherwise the first well-formed `e` tag is used (positional scheme)
///
/// Returns `None` for top-level events.
pub fn thread_reference(event: &Event) -> Option<ThreadReference> {
    let mut marked: Option<ThreadReference> = None;
    let mut positional: Option<ThreadReference> = None;

    for tag in event.tags.iter() {
        let Some(reference) = parse_e_tag(tag.as_slice()) else {
            continue;
        };

        let is_root_marker = tag.as_slice().get(3).map(String::as_str) == Some("root");
        if is_root_marker {
            match &marked {
                Some(existing) if existing.root != reference.root => return None,
                Some(_) => {}
                None => marked = Some(reference),
            }
        } else if positional.is_none() {
            positional = Some(reference);
        }
    }

    marked.or(positional)
}

fn parse_e_tag(values: &[String]) -> Option<ThreadReference> {
    if values.first().map(String::as_str) != Some("e") {
        return None;
    }
    let root = EventId::from_hex(values.get(1)?).ok()?;
    let relay_hint = values
        .get(2)
        .filter(|hint| hint.starts_with("wss://") || hint.starts_with("ws://"))
        .cloned();
    Some(ThreadReference { root, relay_hint })
}

/// Public keys followed by the author of a contact list.
///
/// Reads every well-formed `p` tag, keeping the first occurrence of each key.
pub fn followed_pubkeys(contact_list: &Event) -> Vec<PublicKey> {
    let mut follows: Vec<PublicKey> = Vec::new();
    for tag in contact_list.tags.iter() {
        let values = tag.as_slice();
        if values.first().map(String::as_str) != Some("p") {
            continue;
        }
        if let Some(pk) = values.get(1).and_then(|v| PublicKey::from_hex(v).ok())
            && !follows.contains(&pk)
        {
            follows.push(pk);
        }
    }
    follows
}

/// Parse a 64-character hex event id.
pub fn parse_event_id(value: &str) -> Result<EventId> {
    EventId::from_hex(value.trim()).map_err(|e| Error::InvalidField {
        field: "event_id",
        reason: e.to_string(),
    })
}

/// Parse a 64-character hex public key.
pub fn parse_public_key(value: &str) -> Result<PublicKey> {
    PublicKey::from_hex(value.trim()).map_err(|e| Error::InvalidField {
        field: "pubkey",
        reason: e.to_string(),
    })
}

/// Detects inline `data:` URIs carrying images or videos.
///
/// Any `data:image/` or `data:video/` prefix counts, whatever the encoding.
pub fn has_base64_media(content: &str) -> bool {
    content.contains("data:image/") || content.contains("data:video/")
}
