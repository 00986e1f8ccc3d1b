use crate::error::Error;
use crate::event::{self, Event};
use crate::keys::PublicKey;
use crate::nip05::{Nip05Document, ROOT_NAME};
use crate::pool::{EventFetcher, RelayFetcher};
use crate::settings::Settings;
use crate::storage::{IdentityRecord, IdentityStore};
use crate::sync::{SyncEngine, SyncResult};
use std::sync::Arc;

/// What the UI and session layer talk to
#[derive(Clone)]
pub struct Directory {
    store: Arc<dyn IdentityStore>,
    engine: SyncEngine,
}

impl Directory {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        fetcher: Arc<dyn EventFetcher>,
        settings: &Settings,
    ) -> Directory {
        let engine = SyncEngine::new(store.clone(), fetcher, settings);
        Directory { store, engine }
    }

    /// A directory that fetches from live relays
    pub fn with_relays(store: Arc<dyn IdentityStore>, settings: &Settings) -> Directory {
        Directory::new(store, Arc::new(RelayFetcher::new(settings)), settings)
    }

    pub fn normalize_key(input: &str) -> Result<PublicKey, Error> {
        PublicKey::normalize(input)
    }

    pub fn verify_login(signed_event: &Event, claimed: &PublicKey) -> bool {
        event::verify_login(signed_event, claimed)
    }

    /// Sync the identity registered under `pubkey`. `None` if there is none.
    pub async fn sync(&self, pubkey: PublicKey) -> Result<Option<SyncResult>, Error> {
        match self.store.read_by_pubkey(pubkey).await? {
            Some(record) => Ok(Some(self.engine.sync(&record).await)),
            None => Ok(None),
        }
    }

    /// Sync the identity registered under `username`, returning the record
    /// with its synced metadata
    pub async fn sync_username(
        &self,
        username: &str,
    ) -> Result<Option<(IdentityRecord, SyncResult)>, Error> {
        match self.store.read_by_username(username).await? {
            Some(record) => Ok(Some(self.sync_record(record).await)),
            None => Ok(None),
        }
    }

    /// Establish a session: the event must be signed by the claimed key and
    /// the key must be registered. Returns `None` otherwise.
    pub async fn login(
        &self,
        signed_event: &Event,
        claimed: &str,
    ) -> Result<Option<(IdentityRecord, SyncResult)>, Error> {
        let claimed = PublicKey::normalize(claimed)?;
        if !Directory::verify_login(signed_event, &claimed) {
            tracing::info!("{}: login refused, signature does not match", claimed);
            return Ok(None);
        }
        match self.store.read_by_pubkey(claimed).await? {
            Some(record) => Ok(Some(self.sync_record(record).await)),
            None => {
                tracing::info!("{}: login refused, not registered", claimed);
                Ok(None)
            }
        }
    }

    /// Registered identities, newest first. The search may also be a public
    /// key in either form.
    pub async fn members(&self, search: Option<&str>) -> Result<Vec<IdentityRecord>, Error> {
        let search = search.map(|s| match PublicKey::normalize(s) {
            Ok(pk) => pk.as_hex_string(),
            Err(_) => s.trim().to_owned(),
        });
        self.store.list_by_recency(search.as_deref()).await
    }

    pub async fn member_count(&self) -> Result<usize, Error> {
        self.store.count().await
    }

    /// The well-known document for `name`. `None` if nobody has that name.
    pub async fn well_known(&self, name: &str) -> Result<Option<Nip05Document>, Error> {
        if name == ROOT_NAME {
            return Ok(Some(Nip05Document::root()));
        }
        Ok(self
            .store
            .read_by_username(name)
            .await?
            .map(|record| Nip05Document::for_identity(&record)))
    }

    /// Sync every registered identity, one after another
    pub async fn sync_all(&self) -> Result<Vec<(IdentityRecord, SyncResult)>, Error> {
        let mut output = Vec::new();
        for record in self.store.list_by_recency(None).await? {
            output.push(self.sync_record(record).await);
        }
        Ok(output)
    }

    async fn sync_record(&self, mut record: IdentityRecord) -> (IdentityRecord, SyncResult) {
        let result = self.engine.sync(&record).await;
        record.metadata = result.metadata().clone();
        (record, result)
    }
}
