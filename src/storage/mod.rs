mod memory;
pub use memory::MemoryStore;

mod sqlite;
pub use sqlite::SqliteStore;

use crate::error::Error;
use crate::keys::PublicKey;
use crate::metadata::ProfileMetadata;
use crate::misc::Unixtime;
use crate::relay_url::RelayUrl;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A registered identity: a username bound to a public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub username: String,
    pub pubkey: PublicKey,
    pub lightning_address: Option<String>,
    pub relays: Vec<RelayUrl>,
    pub metadata: ProfileMetadata,
    pub created_at: Unixtime,
}

impl IdentityRecord {
    pub fn new(username: &str, pubkey: PublicKey) -> IdentityRecord {
        IdentityRecord {
            username: username.to_owned(),
            pubkey,
            lightning_address: None,
            relays: vec![],
            metadata: ProfileMetadata::default(),
            created_at: Unixtime::now(),
        }
    }

    /// Case-insensitive substring match on username or hex public key
    pub fn matches_search(&self, search: &str) -> bool {
        let search = search.trim().to_lowercase();
        search.is_empty()
            || self.username.to_lowercase().contains(&search)
            || self.pubkey.as_hex_string().contains(&search)
    }
}

/// The operations the sync core needs from the persistent identity store.
///
/// `update_metadata` touches metadata fields only. Username, lightning address
/// and relay hints belong to the account management path.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn read_by_pubkey(&self, pubkey: PublicKey) -> Result<Option<IdentityRecord>, Error>;

    async fn read_by_username(&self, username: &str) -> Result<Option<IdentityRecord>, Error>;

    async fn update_metadata(
        &self,
        pubkey: PublicKey,
        metadata: &ProfileMetadata,
    ) -> Result<(), Error>;

    /// Newest registrations first, optionally filtered with
    /// [`IdentityRecord::matches_search`]
    async fn list_by_recency(&self, search: Option<&str>) -> Result<Vec<IdentityRecord>, Error>;

    async fn count(&self) -> Result<usize, Error> {
        Ok(self.list_by_recency(None).await?.len())
    }
}
