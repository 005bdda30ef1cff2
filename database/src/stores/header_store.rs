use crate::cache::LruCache;
use crate::db::{CF_HEADERS, CF_INVALID};
use crate::{Database, DbResult};
use consensus_core::api::HeaderGraphStore;
use consensus_core::errors::ConsensusResult;
use consensus_core::observers::ObserverSet;
use consensus_core::{ChainedHeader, Hash};
use std::sync::Arc;
use tracing::warn;

/// Header graph persisted in RocksDB with a write-through cache in front.
pub struct HeaderStore {
    db: Arc<Database>,
    cache: LruCache<Hash, ChainedHeader>,
    observers: ObserverSet<ChainedHeader>,
}

impl HeaderStore {
    pub fn new(db: Arc<Database>, cache_size: usize) -> Self {
        Self { db, cache: LruCache::new(cache_size), observers: ObserverSet::new() }
    }

    /// Stores `header`; returns false when it was already present.
    pub fn put_header(&self, header: &ChainedHeader) -> DbResult<bool> {
        if self.has_header(&header.hash)? {
            return Ok(false);
        }
        let serialized = bincode::serialize(header)?;
        self.db.put(CF_HEADERS, header.hash.as_bytes(), &serialized)?;
        self.cache.insert(header.hash, header.clone());
        Ok(true)
    }

    pub fn get_header(&self, hash: &Hash) -> DbResult<Option<ChainedHeader>> {
        if let Some(header) = self.cache.get(hash) {
            return Ok(Some(header));
        }
        let Some(data) = self.db.get(CF_HEADERS, hash.as_bytes())? else {
            return Ok(None);
        };
        let header: ChainedHeader = bincode::deserialize(&data)?;
        self.cache.insert(*hash, header.clone());
        Ok(Some(header))
    }

    pub fn has_header(&self, hash: &Hash) -> DbResult<bool> {
        if self.cache.get(hash).is_some() {
            return Ok(true);
        }
        self.db.exists(CF_HEADERS, hash.as_bytes())
    }

    pub fn all_headers(&self) -> DbResult<Vec<ChainedHeader>> {
        self.db
            .entries(CF_HEADERS)?
            .into_iter()
            .map(|(_, value)| -> DbResult<ChainedHeader> { Ok(bincode::deserialize(&value)?) })
            .collect()
    }

    pub fn count(&self) -> DbResult<usize> {
        Ok(self.db.entries(CF_HEADERS)?.len())
    }

    pub fn set_invalid(&self, hash: &Hash) -> DbResult<()> {
        self.db.put(CF_INVALID, hash.as_bytes(), &[])
    }

    pub fn is_invalid(&self, hash: &Hash) -> DbResult<bool> {
        self.db.exists(CF_INVALID, hash.as_bytes())
    }
}

impl HeaderGraphStore for HeaderStore {
    fn get(&self, hash: &Hash) -> ConsensusResult<Option<ChainedHeader>> {
        Ok(self.get_header(hash)?)
    }

    fn put(&self, header: ChainedHeader) -> ConsensusResult<bool> {
        let added = self.put_header(&header)?;
        if added {
            self.observers.notify(&header);
        }
        Ok(added)
    }

    fn headers(&self) -> ConsensusResult<Vec<ChainedHeader>> {
        Ok(self.all_headers()?)
    }

    fn is_marked_invalid(&self, hash: &Hash) -> bool {
        self.is_invalid(hash).unwrap_or_else(|err| {
            warn!("Failed to read invalid mark for {}: {}", hash, err);
            false
        })
    }

    fn mark_invalid(&self, hash: &Hash) -> ConsensusResult<()> {
        Ok(self.set_invalid(hash)?)
    }

    fn observers(&self) -> &ObserverSet<ChainedHeader> {
        &self.observers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consensus_core::U256;
    use tempfile::TempDir;

    fn create_test_header(id: u64, height: u32) -> ChainedHeader {
        ChainedHeader::new(Hash::from_u64_word(id), Hash::from_u64_word(id - 1), height, U256::from(3u64), 0x207fffff, 600)
    }

    #[test]
    fn test_headers_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let header = create_test_header(2, 1);
        {
            let store = HeaderStore::new(Arc::new(Database::open(tmp.path()).unwrap()), 16);
            assert!(store.put(header.clone()).unwrap());
            assert!(!store.put(header.clone()).unwrap());
            store.mark_invalid(&header.hash).unwrap();
        }

        let store = HeaderStore::new(Arc::new(Database::open(tmp.path()).unwrap()), 16);
        assert_eq!(store.get(&header.hash).unwrap(), Some(header.clone()));
        assert_eq!(store.headers().unwrap(), vec![header.clone()]);
        assert!(store.is_marked_invalid(&header.hash));
        assert!(!store.is_marked_invalid(&Hash::from_u64_word(9)));
    }

    #[test]
    fn test_observers_see_new_headers_only() {
        let tmp = TempDir::new().unwrap();
        let store = HeaderStore::new(Arc::new(Database::open(tmp.path()).unwrap()), 16);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _handle = store.observers().register(move |header: &ChainedHeader| sink.lock().push(header.hash));

        store.put(create_test_header(2, 1)).unwrap();
        store.put(create_test_header(2, 1)).unwrap();
        store.put(create_test_header(3, 2)).unwrap();
        assert_eq!(*seen.lock(), vec![Hash::from_u64_word(2), Hash::from_u64_word(3)]);
        assert_eq!(store.count().unwrap(), 2);
    }
}
