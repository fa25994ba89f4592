//! Chronicle relay engine.
//!
//! This crate decides which events a personal Nostr relay keeps, tracks the
//! threads it archives and pulls history from remote relays.
//!
//! # Modules
//!
//! - [`policy`] - Acceptance rules and the host's reject chains
//! - [`registry`] - Persistent set of archived thread roots
//! - [`trust`] - Web-of-trust snapshot and its builder
//! - [`sync`] - Conversation backfill, archival, profile refresh and backup replication
//! - [`scheduler`] - Periodic profile and trust refreshes and archival passes
//! - [`host`] - Hooks into the relay runtime and the remote relay pool
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Inbound Event  │  (client publish or archival pass)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐      ┌──────────────────┐
//! │AcceptancePolicy │◀─────│   TrustNetwork   │◀── RefreshScheduler
//! └────────┬────────┘      └──────────────────┘
//!          │               ┌──────────────────┐
//!          │◀──────────────│   RootRegistry   │
//!          │ accept        └──────────────────┘
//!          ▼
//! ┌─────────────────┐
//! │   EventStore    │──▶ live subscribers ──▶ backup relays
//! └─────────────────┘
//! ```
//!
//! Owners always publish. Everyone else may only join threads the relay
//! already archives, and only if they are in the owners' web of trust.

pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod policy;
pub mod registry;
pub mod scheduler;
pub mod sync;
pub mod tasks;
pub mod trust;

#[cfg(test)]
mod testing;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

pub use config::Config;
pub use engine::Engine;

pub use host::{Broadcaster, EventStore, MemoryHost, NostrPool, RemotePool, SaveStatus};

pub use policy::{
    AcceptancePolicy, Admission, ConnectionInfo, ConnectionRule, Counters, Decision, EventRule,
    FilterRule, Origin, OwnerSet, PolicyChain,
};

pub use registry::RootRegistry;
pub use scheduler::{RefreshScheduler, SchedulerConfig, SchedulerState};
pub use sync::{
    ArchiveStats, Archiver, BackupPropagator, ConversationFetcher, FetchConfig, FetchStats,
    ProfileConfig, ProfileRefresher, ProfileStats,
};
pub use tasks::TaskSupervisor;
pub use trust::{TrustBuilder, TrustConfig, TrustHandle, TrustNetwork, TrustWriter, trust_channel};
