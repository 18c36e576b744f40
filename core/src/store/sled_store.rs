use super::{ComicStore, FlushStats};
use crate::{cmp_ids, ComicRecord, StoreError};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Transactional, Tree};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

const COMICS_TREE: &str = "comics";
const WORDS_TREE: &str = "words";

/// Embedded key-value backend. `comics` maps id -> bincode record, `words` holds one
/// empty-valued `word\0id` key per keyword so lookups are prefix scans.
pub struct SledStore {
    db: sled::Db,
    comics: Tree,
    words: Tree,
    new: AtomicUsize,
}

fn word_key(word: &str, id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(word.len() + id.len() + 1);
    key.extend_from_slice(word.as_bytes());
    key.push(0);
    key.extend_from_slice(id.as_bytes());
    key
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        let comics = db.open_tree(COMICS_TREE)?;
        let words = db.open_tree(WORDS_TREE)?;
        tracing::info!(path = %path.as_ref().display(), records = comics.len(), "opened sled store");
        Ok(Self { db, comics, words, new: AtomicUsize::new(0) })
    }

    fn decode(bytes: &[u8]) -> Result<ComicRecord, StoreError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl ComicStore for SledStore {
    fn add_one(&self, record: ComicRecord) -> Result<(), StoreError> {
        let value = bincode::serialize(&record)?;
        let inserted = (&self.comics, &self.words).transaction(|(comics, words)| {
            let prev = comics.insert(record.id.as_bytes(), value.as_slice())?;
            if let Some(prev) = &prev {
                let old: ComicRecord = bincode::deserialize(prev)
                    .map_err(|e| ConflictableTransactionError::Abort(e.to_string()))?;
                for word in old.keywords.difference(&record.keywords) {
                    words.remove(word_key(word, &old.id))?;
                }
            }
            for word in &record.keywords {
                words.insert(word_key(word, &record.id), &[] as &[u8])?;
            }
            Ok(prev.is_none())
        });
        match inserted {
            Ok(true) => {
                self.new.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(TransactionError::Abort(msg)) => Err(StoreError::Transaction(msg)),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    fn get_by_id(&self, id: &str) -> Result<ComicRecord, StoreError> {
        match self.comics.get(id.as_bytes())? {
            Some(bytes) => Self::decode(&bytes),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    fn contains(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.comics.contains_key(id.as_bytes())?)
    }

    fn get_by_word(&self, word: &str, limit: usize) -> Result<Vec<ComicRecord>, StoreError> {
        let prefix = word_key(word, "");
        let mut ids = Vec::new();
        for key in self.words.scan_prefix(&prefix).keys() {
            let key = key?;
            ids.push(String::from_utf8_lossy(&key[prefix.len()..]).into_owned());
        }
        ids.sort_by(|a, b| cmp_ids(a, b));
        ids.truncate(limit);
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_by_id(&id) {
                Ok(rec) => out.push(rec),
                // Word keys and records are written together; a miss means a concurrent replace.
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    fn records(&self) -> Result<Vec<ComicRecord>, StoreError> {
        let mut out = Vec::with_capacity(self.comics.len());
        for entry in self.comics.iter() {
            let (_, value) = entry?;
            out.push(Self::decode(&value)?);
        }
        out.sort_by(|a, b| cmp_ids(&a.id, &b.id));
        Ok(out)
    }

    fn flush(&self) -> Result<FlushStats, StoreError> {
        self.db.flush()?;
        let stats = FlushStats { total: self.comics.len(), new: self.new.swap(0, Ordering::AcqRel) };
        tracing::debug!(total = stats.total, new = stats.new, "flushed sled store");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rec(id: &str, words: &[&str]) -> ComicRecord {
        ComicRecord { id: id.into(), url: format!("https://img/{id}.png"), keywords: words.iter().map(|w| w.to_string()).collect() }
    }

    #[test]
    fn word_prefix_does_not_leak_into_longer_words() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        store.add_one(rec("1", &["cat"])).unwrap();
        store.add_one(rec("2", &["catapult"])).unwrap();
        let hits = store.get_by_word("cat", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");
    }

    #[test]
    fn replace_removes_stale_words() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        store.add_one(rec("7", &["old", "kept"])).unwrap();
        store.add_one(rec("7", &["kept", "fresh"])).unwrap();
        assert!(store.get_by_word("old", 10).unwrap().is_empty());
        assert_eq!(store.get_by_word("kept", 10).unwrap().len(), 1);
        assert_eq!(store.get_by_word("fresh", 10).unwrap().len(), 1);
        assert_eq!(store.flush().unwrap(), FlushStats { total: 1, new: 1 });
        assert_eq!(store.flush().unwrap(), FlushStats { total: 1, new: 0 });
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            store.add_one(rec("10", &["a"])).unwrap();
            store.add_one(rec("2", &["b"])).unwrap();
            store.flush().unwrap();
        }
        let store = SledStore::open(dir.path()).unwrap();
        let ids: Vec<_> = store.records().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["2", "10"]);
        assert!(store.contains("10").unwrap());
        assert!(!store.contains("11").unwrap());
    }
}
