use comics_core::{ComicRecord, ComicStore, RemoteComic};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkStats {
    pub stored: usize,
    pub skipped: usize,
}

/// Normalize and store every comic until all senders are gone. A comic that fails to normalize
/// or store is logged and skipped; the sink itself never fails.
pub async fn persist(store: Arc<dyn ComicStore>, mut comics: mpsc::Receiver<RemoteComic>) -> SinkStats {
    let mut stats = SinkStats::default();
    while let Some(comic) = comics.recv().await {
        let record = match ComicRecord::from_remote(&comic) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(id = comic.num, error = %e, "normalize failed, skipping comic");
                stats.skipped += 1;
                continue;
            }
        };
        let id = comic.num;
        match store.add_one(record) {
            Ok(()) => {
                tracing::debug!(id, "stored comic");
                stats.stored += 1;
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "store write failed, skipping comic");
                stats.skipped += 1;
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use comics_core::persist::StorePaths;
    use comics_core::store::JsonStore;
    use comics_core::tokenizer::MAX_TEXT_BYTES;

    #[tokio::test]
    async fn bad_comic_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ComicStore> = Arc::new(JsonStore::open(StorePaths::new(dir.path().join("db.json"))).unwrap());
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(persist(Arc::clone(&store), rx));

        tx.send(RemoteComic { num: 1, alt: "fine".into(), img: "1.png".into(), ..Default::default() }).await.unwrap();
        tx.send(RemoteComic { num: 2, transcript: "x".repeat(MAX_TEXT_BYTES + 1), ..Default::default() }).await.unwrap();
        tx.send(RemoteComic { num: 3, alt: "also fine".into(), img: "3.png".into(), ..Default::default() }).await.unwrap();
        drop(tx);

        assert_eq!(task.await.unwrap(), SinkStats { stored: 2, skipped: 1 });
        assert!(store.contains("1").unwrap());
        assert!(!store.contains("2").unwrap());
        assert_eq!(store.get_by_id("3").unwrap().url, "3.png");
    }
}
