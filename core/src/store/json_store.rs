use super::{ComicStore, FlushStats};
use crate::index::WordIndex;
use crate::persist::{load_index, load_records, save_index, save_records, RecordMap, StorePaths};
use crate::{cmp_ids, ComicRecord, StoreError};
use parking_lot::RwLock;

struct State {
    records: RecordMap,
    index: Option<WordIndex>,
    new: usize,
}

/// Whole store kept in memory and written out as one JSON document on flush.
pub struct JsonStore {
    paths: StorePaths,
    state: RwLock<State>,
}

impl JsonStore {
    pub fn open(paths: StorePaths) -> Result<Self, StoreError> {
        let records = load_records(&paths.db)?;
        let index = match &paths.index {
            Some(path) => {
                // The records file is authoritative; the index file only mirrors it.
                let rebuilt = WordIndex::build(records.values());
                match load_index(path) {
                    Ok(saved) if saved == rebuilt => {}
                    Ok(_) => tracing::warn!(path = %path.display(), "word index out of date, rebuilt from records"),
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "word index unreadable, rebuilt from records"),
                }
                Some(rebuilt)
            }
            None => None,
        };
        tracing::info!(path = %paths.db.display(), records = records.len(), indexed = index.is_some(), "opened json store");
        Ok(Self { paths, state: RwLock::new(State { records, index, new: 0 }) })
    }

    pub fn len(&self) -> usize { self.state.read().records.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

fn sorted(mut records: Vec<ComicRecord>) -> Vec<ComicRecord> {
    records.sort_by(|a, b| cmp_ids(&a.id, &b.id));
    records
}

impl ComicStore for JsonStore {
    fn add_one(&self, record: ComicRecord) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let State { records, index, new } = &mut *state;
        if let Some(index) = index.as_mut() {
            if let Some(old) = records.get(&record.id) {
                index.remove(old);
            }
            index.insert(&record);
        }
        if records.insert(record.id.clone(), record).is_none() {
            *new += 1;
        }
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<ComicRecord, StoreError> {
        self.state.read().records.get(id).cloned().ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn get_by_word(&self, word: &str, limit: usize) -> Result<Vec<ComicRecord>, StoreError> {
        let state = self.state.read();
        match &state.index {
            Some(index) => Ok(index
                .lookup(word, limit)
                .iter()
                .filter_map(|id| state.records.get(id).cloned())
                .collect()),
            None => {
                let hits = state.records.values().filter(|r| r.keywords.contains(word)).cloned().collect();
                let mut hits = sorted(hits);
                hits.truncate(limit);
                Ok(hits)
            }
        }
    }

    fn records(&self) -> Result<Vec<ComicRecord>, StoreError> {
        Ok(sorted(self.state.read().records.values().cloned().collect()))
    }

    fn flush(&self) -> Result<FlushStats, StoreError> {
        // Write lock: nothing may land between serializing and resetting the counter.
        let mut state = self.state.write();
        save_records(&self.paths.db, &state.records)?;
        if let (Some(path), Some(index)) = (&self.paths.index, &state.index) {
            save_index(path, index)?;
        }
        let stats = FlushStats { total: state.records.len(), new: state.new };
        state.new = 0;
        tracing::debug!(total = stats.total, new = stats.new, "flushed json store");
        Ok(stats)
    }
}
