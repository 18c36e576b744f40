//! Storage contract for comic records and its two backends.
//!
//! The fetch pipeline and search only ever see [`ComicStore`]; which backend sits behind it is
//! decided once at start-up by [`open_store`].

use crate::{ComicRecord, StoreError};
use std::path::PathBuf;
use std::sync::Arc;

mod json_store;
mod sled_store;

pub use json_store::JsonStore;
pub use sled_store::SledStore;

/// Counts produced by [`ComicStore::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub total: usize,
    /// Records added since the previous flush. Reset by every flush.
    pub new: usize,
}

/// Every method must be safe to call from many tasks at once; implementations serialize
/// writes against reads internally.
pub trait ComicStore: Send + Sync {
    /// Insert or replace a record. Only ids not yet present count toward `new`.
    fn add_one(&self, record: ComicRecord) -> Result<(), StoreError>;

    /// `StoreError::NotFound` when the id is unknown.
    fn get_by_id(&self, id: &str) -> Result<ComicRecord, StoreError>;

    fn contains(&self, id: &str) -> Result<bool, StoreError> {
        match self.get_by_id(id) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Records whose keywords contain `word`, in numeric id order, at most `limit`.
    fn get_by_word(&self, word: &str, limit: usize) -> Result<Vec<ComicRecord>, StoreError>;

    /// Every record, in numeric id order.
    fn records(&self) -> Result<Vec<ComicRecord>, StoreError>;

    /// Make all writes durable and report counts.
    fn flush(&self) -> Result<FlushStats, StoreError>;
}

#[derive(Debug, Clone)]
pub enum StoreConfig {
    Json { path: PathBuf, index_path: Option<PathBuf> },
    Sled { path: PathBuf },
}

pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn ComicStore>, StoreError> {
    let store: Arc<dyn ComicStore> = match config {
        StoreConfig::Json { path, index_path } => {
            let mut paths = crate::persist::StorePaths::new(path);
            if let Some(index) = index_path {
                paths = paths.with_index(index);
            }
            Arc::new(JsonStore::open(paths)?)
        }
        StoreConfig::Sled { path } => Arc::new(SledStore::open(path)?),
    };
    Ok(store)
}
