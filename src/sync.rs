use crate::event::{Event, EventKind};
use crate::filter::Filter;
use crate::keys::PublicKey;
use crate::metadata::{select_canonical, MetadataContent, ProfileMetadata};
use crate::misc::{Freshness, Unixtime};
use crate::pool::EventFetcher;
use crate::relay_url::RelayUrl;
use crate::settings::Settings;
use crate::social;
use crate::storage::{IdentityRecord, IdentityStore};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::time::Instant;

/// The outcome of a sync. Failure to reach relays is not an error, it is
/// `Unavailable` with whatever cached fields remain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResult {
    /// Cached metadata was within its TTL
    Cached(ProfileMetadata),
    /// Fetched from relays and persisted
    Refreshed(ProfileMetadata),
    /// Nothing usable arrived before the deadline
    Unavailable(ProfileMetadata),
}

impl SyncResult {
    pub fn metadata(&self) -> &ProfileMetadata {
        match self {
            SyncResult::Cached(m) | SyncResult::Refreshed(m) | SyncResult::Unavailable(m) => m,
        }
    }

    pub fn into_metadata(self) -> ProfileMetadata {
        match self {
            SyncResult::Cached(m) | SyncResult::Refreshed(m) | SyncResult::Unavailable(m) => m,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, SyncResult::Unavailable(_))
    }
}

type SharedSync = Shared<BoxFuture<'static, SyncResult>>;

/// Keeps identity metadata in sync with relays, at most one fetch per key
/// at a time.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn IdentityStore>,
    fetcher: Arc<dyn EventFetcher>,
    settings: Settings,
    in_flight: Arc<DashMap<PublicKey, SharedSync>>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        fetcher: Arc<dyn EventFetcher>,
        settings: &Settings,
    ) -> SyncEngine {
        SyncEngine {
            store,
            fetcher,
            settings: settings.clone(),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Return fresh metadata for `identity`, refreshing it from relays if the
    /// cached copy has expired. Concurrent calls for one key share one fetch.
    pub async fn sync(&self, identity: &IdentityRecord) -> SyncResult {
        let now = Unixtime::now();
        if identity.metadata.freshness(now, self.settings.metadata_ttl()) == Freshness::Fresh {
            tracing::trace!("{}: metadata is fresh", identity.pubkey);
            return SyncResult::Cached(identity.metadata.clone());
        }

        let refresh = match self.in_flight.entry(identity.pubkey) {
            Entry::Occupied(entry) => {
                tracing::debug!("{}: joining sync already in flight", identity.pubkey);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let refresh = self.spawn_refresh(identity.clone());
                entry.insert(refresh.clone());
                refresh
            }
        };

        let result = refresh.clone().await;

        // Normally the refresh task has removed itself already
        self.in_flight
            .remove_if(&identity.pubkey, |_, f| f.ptr_eq(&refresh));

        result
    }

    // The refresh runs as its own task, so it reaches its deadline and
    // releases its relay connections even if every caller goes away.
    fn spawn_refresh(&self, identity: IdentityRecord) -> SharedSync {
        let pubkey = identity.pubkey;
        let fallback = identity.metadata.clone();
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let in_flight = engine.in_flight.clone();
            let result = engine.refresh(identity).await;
            // Only a vacant key gets a new entry, so this one is ours
            in_flight.remove(&pubkey);
            result
        });
        handle
            .map(move |joined| match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("{}: sync task failed: {}", pubkey, e);
                    SyncResult::Unavailable(fallback)
                }
            })
            .boxed()
            .shared()
    }

    async fn refresh(self, identity: IdentityRecord) -> SyncResult {
        let pubkey = identity.pubkey;
        let deadline = Instant::now() + self.settings.fetch_timeout();

        // Another sync may have finished since the caller read its record
        let mut metadata = match self.store.read_by_pubkey(pubkey).await {
            Ok(Some(record)) => record.metadata,
            Ok(None) => identity.metadata.clone(),
            Err(e) => {
                tracing::error!("{}: reading identity: {}", pubkey, e);
                identity.metadata.clone()
            }
        };

        match metadata.freshness(Unixtime::now(), self.settings.metadata_ttl()) {
            Freshness::Fresh => return SyncResult::Cached(metadata),
            Freshness::Stale => {
                tracing::debug!("{}: metadata expired, clearing", pubkey);
                metadata.clear_expired();
                self.persist(pubkey, &metadata).await;
            }
            Freshness::NeverSought => {}
        }

        let relays = self.relays_for(&identity);
        let events = self
            .fetcher
            .fetch(
                Filter::metadata_of(pubkey),
                relays.clone(),
                deadline.saturating_duration_since(Instant::now()),
            )
            .await;

        let content = match reconcile(pubkey, &events) {
            Some(content) => content,
            None => {
                tracing::info!(
                    "{}: no profile found on {} relays, metadata unavailable",
                    pubkey,
                    relays.len()
                );
                metadata.updated_at = None;
                self.persist(pubkey, &metadata).await;
                return SyncResult::Unavailable(metadata);
            }
        };

        metadata.apply_content(content);

        if self.settings.count_social_graph && !metadata.has_counters() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::debug!("{}: no time left to count the social graph", pubkey);
            } else {
                let counts =
                    social::count_social_graph(self.fetcher.as_ref(), pubkey, relays, remaining)
                        .await;
                metadata.followers = counts.followers;
                metadata.following = counts.following;
            }
        }

        metadata.updated_at = Some(Unixtime::now());
        self.persist(pubkey, &metadata).await;
        tracing::info!("{}: metadata refreshed", pubkey);
        SyncResult::Refreshed(metadata)
    }

    // The bootstrap relays, then the identity's own hints
    fn relays_for(&self, identity: &IdentityRecord) -> Vec<RelayUrl> {
        let mut relays = self.settings.bootstrap_relays.clone();
        for relay in &identity.relays {
            if !relays.contains(relay) {
                relays.push(relay.clone());
            }
        }
        relays
    }

    async fn persist(&self, pubkey: PublicKey, metadata: &ProfileMetadata) {
        if let Err(e) = self.store.update_metadata(pubkey, metadata).await {
            tracing::error!("{}: saving metadata: {}", pubkey, e);
        }
    }
}

/// The payload of the newest verified, parseable profile event of `pubkey`
fn reconcile(pubkey: PublicKey, events: &[Event]) -> Option<MetadataContent> {
    let mut candidates: Vec<&Event> = events
        .iter()
        .filter(|e| e.kind == EventKind::Metadata && e.pubkey == pubkey && e.verify())
        .collect();

    while let Some(event) = select_canonical(candidates.iter().copied()) {
        match MetadataContent::parse(&event.content) {
            Ok(content) => return Some(content),
            Err(e) => {
                tracing::warn!("{}: discarding profile event {}: {}", pubkey, event.id, e);
                let id = event.id.clone();
                candidates.retain(|c| c.id != id);
            }
        }
    }

    None
}
