//! Traffic between the relay and remote relays.
//!
//! ```text
//!                    seed relays
//!        ┌───────────────┴───────────────┐
//!        │ owner history                 │ missing thread
//!        ▼                               ▼
//! ┌──────────────┐               ┌─────────────────────┐
//! │   Archiver   │               │ ConversationFetcher │
//! └──────┬───────┘               └──────────┬──────────┘
//!        │ AcceptancePolicy                 │ stored directly
//!        ▼                                  ▼
//!   ┌─────────────────────────────────────────────┐
//!   │                 EventStore                  │
//!   └─────────────────────────────────────────────┘
//!
//! accepted client events ──▶ BackupPropagator ──▶ backup relays
//!
//! trust network members ──▶ ProfileRefresher ──▶ kind:0 into EventStore
//! ```

mod archive;
mod backup;
mod fetch;
mod profiles;

pub use archive::{ArchiveStats, Archiver};
pub use backup::{BackupPropagator, DEFAULT_PUBLISH_TIMEOUT};
pub use fetch::{ConversationFetcher, FetchConfig, FetchStats};
pub use profiles::{ProfileConfig, ProfileRefresher, ProfileStats};
