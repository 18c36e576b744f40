use crate::{cmp_ids, ComicRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Inverted word index: stemmed keyword -> ids of the comics carrying it.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordIndex {
    postings: HashMap<String, BTreeSet<String>>,
}

impl WordIndex {
    pub fn new() -> Self { Self::default() }

    pub fn build<'a>(records: impl IntoIterator<Item = &'a ComicRecord>) -> Self {
        let mut index = Self::new();
        for rec in records {
            index.insert(rec);
        }
        index
    }

    pub fn insert(&mut self, rec: &ComicRecord) {
        for word in &rec.keywords {
            self.postings.entry(word.clone()).or_default().insert(rec.id.clone());
        }
    }

    pub fn remove(&mut self, rec: &ComicRecord) {
        for word in &rec.keywords {
            if let Some(ids) = self.postings.get_mut(word) {
                ids.remove(&rec.id);
                if ids.is_empty() {
                    self.postings.remove(word);
                }
            }
        }
    }

    /// Ids carrying `word`, in numeric order, at most `limit` of them.
    pub fn lookup(&self, word: &str, limit: usize) -> Vec<String> {
        let Some(ids) = self.postings.get(word) else { return Vec::new() };
        let mut ids: Vec<String> = ids.iter().cloned().collect();
        ids.sort_by(|a, b| cmp_ids(a, b));
        ids.truncate(limit);
        ids
    }

    pub fn num_words(&self) -> usize { self.postings.len() }
}
