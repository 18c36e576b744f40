use crate::tokenizer::keywords;
use crate::NormalizeError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Sequence number probed against the remote catalog. Always >= 1.
pub type CandidateId = u64;

/// Raw payload of one catalog entry as served by `{base}/{id}/info.0.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteComic {
    pub num: CandidateId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub safe_title: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub img: String,
}

impl RemoteComic {
    /// Text fields that feed keyword extraction, joined by spaces.
    pub fn searchable_text(&self) -> String {
        let title = if self.title.is_empty() { &self.safe_title } else { &self.title };
        [title.as_str(), self.alt.as_str(), self.transcript.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Normalized, stored form of a fetched comic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComicRecord {
    pub id: String,
    pub url: String,
    pub keywords: BTreeSet<String>,
}

impl ComicRecord {
    pub fn from_remote(comic: &RemoteComic) -> Result<Self, NormalizeError> {
        Ok(Self {
            id: comic.num.to_string(),
            url: comic.img.clone(),
            keywords: keywords(&comic.searchable_text())?,
        })
    }
}

/// Counts reported once per fetch run, after the store is flushed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSummary {
    pub new: usize,
    pub total: usize,
}

/// Numeric ordering for canonical decimal ids ("9" < "10").
pub fn cmp_ids(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
