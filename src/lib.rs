//! A NIP-05 identity directory.
//!
//! Usernames are bound to nostr public keys, and each identity carries
//! profile metadata (name, picture, banner, about, follower counts) that is
//! cached locally and refreshed from relays when it expires.

#![allow(clippy::uninlined_format_args)]

#[macro_use]
extern crate lazy_static;

mod directory;
pub use directory::Directory;

mod error;
pub use error::{Error, ErrorKind};

mod event;
pub use event::{verify_login, Event, EventKind};

mod filter;
pub use filter::Filter;

mod keys;
pub use keys::PublicKey;

mod messages;
pub use messages::{ClientMessage, RelayMessage};

mod metadata;
pub use metadata::{select_canonical, MetadataContent, ProfileMetadata};

mod minion;
pub use minion::{Minion, MinionExitReason, Subscription, ToPoolMessage};

mod misc;
pub use misc::{Freshness, Unixtime};

mod nip05;
pub use nip05::{parse_nip05, Nip05Document};

mod pool;
pub use pool::{EventFetcher, PoolQuery, PoolTermination, RelayFetcher, RelayPool};

mod profile;
pub use profile::Profile;

mod relay_url;
pub use relay_url::{parse_relay_hints, RelayUrl};

mod settings;
pub use settings::Settings;

mod social;
pub use social::{count_followers, count_following, count_social_graph, SocialCounts};

mod storage;
pub use storage::{IdentityRecord, IdentityStore, MemoryStore, SqliteStore};

mod sync;
pub use sync::{SyncEngine, SyncResult};

#[cfg(test)]
pub(crate) mod testing;

/// Sent as the websocket `User-Agent` when enabled in settings
pub static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
