use super::{IdentityRecord, IdentityStore};
use crate::error::{Error, ErrorKind};
use crate::keys::PublicKey;
use crate::metadata::ProfileMetadata;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// An identity store that lives in memory only
#[derive(Debug, Default)]
pub struct MemoryStore {
    // The sequence number orders records registered in the same second
    records: DashMap<PublicKey, (u64, IdentityRecord)>,
    sequence: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn insert(&self, record: IdentityRecord) -> Result<(), Error> {
        if self
            .records
            .iter()
            .any(|r| r.value().1.username == record.username && r.key() != &record.pubkey)
        {
            return Err(ErrorKind::UsernameTaken(record.username).into());
        }
        match self.records.entry(record.pubkey) {
            Entry::Occupied(_) => Err(ErrorKind::PublicKeyTaken.into()),
            Entry::Vacant(entry) => {
                let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
                entry.insert((seq, record));
                Ok(())
            }
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn read_by_pubkey(&self, pubkey: PublicKey) -> Result<Option<IdentityRecord>, Error> {
        Ok(self.records.get(&pubkey).map(|r| r.value().1.clone()))
    }

    async fn read_by_username(&self, username: &str) -> Result<Option<IdentityRecord>, Error> {
        Ok(self
            .records
            .iter()
            .find(|r| r.value().1.username == username)
            .map(|r| r.value().1.clone()))
    }

    async fn update_metadata(
        &self,
        pubkey: PublicKey,
        metadata: &ProfileMetadata,
    ) -> Result<(), Error> {
        match self.records.get_mut(&pubkey) {
            Some(mut r) => {
                r.value_mut().1.metadata = metadata.clone();
                Ok(())
            }
            None => Err(ErrorKind::IdentityNotFound(pubkey.as_hex_string()).into()),
        }
    }

    async fn list_by_recency(&self, search: Option<&str>) -> Result<Vec<IdentityRecord>, Error> {
        let mut entries: Vec<(u64, IdentityRecord)> = self
            .records
            .iter()
            .filter(|r| match search {
                Some(s) => r.value().1.matches_search(s),
                None => true,
            })
            .map(|r| r.value().clone())
            .collect();
        entries.sort_by(|a, b| (b.1.created_at, b.0).cmp(&(a.1.created_at, a.0)));
        Ok(entries.into_iter().map(|(_, record)| record).collect())
    }

    async fn count(&self) -> Result<usize, Error> {
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::misc::Unixtime;
    use crate::testing::TestKeys;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        let alice = TestKeys::new(1).public_key();
        let bob = TestKeys::new(2).public_key();

        let mut record = IdentityRecord::new("alice", alice);
        record.created_at = Unixtime(100);
        store.insert(record).unwrap();
        let mut record = IdentityRecord::new("bob", bob);
        record.created_at = Unixtime(200);
        store.insert(record).unwrap();

        assert!(matches!(
            store.insert(IdentityRecord::new("alice", TestKeys::new(3).public_key())),
            Err(Error {
                kind: ErrorKind::UsernameTaken(_),
                ..
            })
        ));
        assert!(matches!(
            store.insert(IdentityRecord::new("carol", alice)),
            Err(Error {
                kind: ErrorKind::PublicKeyTaken,
                ..
            })
        ));

        let listed = store.list_by_recency(None).await.unwrap();
        let names: Vec<&str> = listed.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "alice"]);
        assert_eq!(store.list_by_recency(Some("ALI")).await.unwrap().len(), 1);
        assert_eq!(store.count().await.unwrap(), 2);

        let metadata = ProfileMetadata {
            display_name: Some("Alice".to_owned()),
            followers: 3,
            ..Default::default()
        };
        store.update_metadata(alice, &metadata).await.unwrap();
        let record = store.read_by_username("alice").await.unwrap().unwrap();
        assert_eq!(record.metadata, metadata);
        assert_eq!(record.username, "alice");

        assert!(store
            .update_metadata(TestKeys::new(4).public_key(), &metadata)
            .await
            .is_err());
    }
}
