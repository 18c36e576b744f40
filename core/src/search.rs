use crate::tokenizer::keywords;
use crate::{cmp_ids, ComicRecord, ComicStore, SearchError};
use std::collections::HashMap;

/// Results returned when the caller does not ask for a specific count.
pub const DEFAULT_RESULT_LEN: usize = 10;

/// Candidates pulled from the store per query keyword before ranking.
pub const CANDIDATES_PER_WORD: usize = 500;

/// Rank ids by the number of lists they appear in; ties go to the lower id.
pub fn top_ids<I, L>(lists: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = L>,
    L: IntoIterator<Item = String>,
{
    let mut hits: HashMap<String, usize> = HashMap::new();
    for list in lists {
        for id in list {
            *hits.entry(id).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = hits.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| cmp_ids(&a.0, &b.0)));
    ranked.into_iter().take(limit).map(|(id, _)| id).collect()
}

/// Comics best matching a free-text phrase.
pub fn find_comics(store: &dyn ComicStore, phrase: &str, limit: usize) -> Result<Vec<ComicRecord>, SearchError> {
    let words = keywords(phrase)?;
    let mut lists = Vec::with_capacity(words.len());
    for word in &words {
        match store.get_by_word(word, CANDIDATES_PER_WORD) {
            Ok(records) => lists.push(records.into_iter().map(|r| r.id).collect::<Vec<_>>()),
            Err(e) => tracing::warn!(word = %word, error = %e, "word lookup failed"),
        }
    }
    let ids = top_ids(lists, limit);
    if ids.is_empty() {
        return Err(SearchError::NoMatches);
    }
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        out.push(store.get_by_id(&id)?);
    }
    Ok(out)
}
