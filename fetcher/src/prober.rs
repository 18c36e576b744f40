use comics_core::{CandidateId, ComicStore, StoreError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Candidate ids checked against the store per blocking lookup.
const LOOKUP_BATCH: u64 = 256;

/// Ids in `[from, from + LOOKUP_BATCH)` the store does not hold, ascending. Store reads may hit
/// the disk, so they run on the blocking pool.
async fn unknown_ids(store: &Arc<dyn ComicStore>, from: CandidateId) -> Result<Vec<CandidateId>, StoreError> {
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || {
        let mut unknown = Vec::new();
        for id in from..from + LOOKUP_BATCH {
            if !store.contains(&id.to_string())? {
                unknown.push(id);
            }
        }
        Ok(unknown)
    })
    .await
    .map_err(|e| StoreError::Task(e.to_string()))?
}

/// Emit ids 1, 2, 3, ... that `store` does not hold yet, until `stop` fires or every receiver
/// is gone. Never ends on its own. Dropping `ids` on return closes the channel exactly once.
pub async fn probe(
    store: Arc<dyn ComicStore>,
    ids: mpsc::Sender<CandidateId>,
    stop: CancellationToken,
) -> Result<u64, StoreError> {
    let mut emitted = 0u64;
    let mut skipped = 0u64;
    let mut from: CandidateId = 1;
    'probe: loop {
        let batch = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            batch = unknown_ids(&store, from) => batch?,
        };
        skipped += LOOKUP_BATCH - batch.len() as u64;
        from += LOOKUP_BATCH;
        for id in batch {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break 'probe,
                sent = ids.send(id) => {
                    if sent.is_err() {
                        break 'probe;
                    }
                    emitted += 1;
                }
            }
        }
    }
    tracing::debug!(emitted, skipped, "prober finished");
    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use comics_core::persist::StorePaths;
    use comics_core::store::JsonStore;
    use comics_core::ComicRecord;

    fn store_with(ids: &[u64]) -> (tempfile::TempDir, Arc<dyn ComicStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(StorePaths::new(dir.path().join("db.json"))).unwrap();
        for id in ids {
            store.add_one(ComicRecord { id: id.to_string(), url: String::new(), keywords: Default::default() }).unwrap();
        }
        (dir, Arc::new(store))
    }

    #[tokio::test]
    async fn skips_known_ids_in_ascending_order() {
        let (_dir, store) = store_with(&[1, 2, 4]);
        let (tx, mut rx) = mpsc::channel(1);
        let stop = CancellationToken::new();
        let task = tokio::spawn(probe(store, tx, stop.clone()));

        let mut got = Vec::new();
        for _ in 0..4 {
            got.push(rx.recv().await.unwrap());
        }
        assert_eq!(got, vec![3, 5, 6, 7]);

        stop.cancel();
        let emitted = task.await.unwrap().unwrap();
        assert!(emitted >= 4);
        // channel is closed once the prober returns, after whatever was buffered
        while rx.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn stops_without_a_consumer() {
        let (_dir, store) = store_with(&[]);
        let (tx, rx) = mpsc::channel(2);
        let stop = CancellationToken::new();
        let task = tokio::spawn(probe(store, tx, stop.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        stop.cancel();
        let emitted = tokio::time::timeout(std::time::Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();
        assert_eq!(emitted, 2);
        drop(rx);
    }

    #[tokio::test]
    async fn ends_when_receiver_is_dropped() {
        let (_dir, store) = store_with(&[]);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let emitted = probe(store, tx, CancellationToken::new()).await.unwrap();
        assert_eq!(emitted, 0);
    }

    #[tokio::test]
    async fn crosses_lookup_batches() {
        let known: Vec<u64> = (1..=LOOKUP_BATCH + 10).filter(|id| id % 100 != 0).collect();
        let (_dir, store) = store_with(&known);
        let (tx, mut rx) = mpsc::channel(4);
        let stop = CancellationToken::new();
        let task = tokio::spawn(probe(store, tx, stop.clone()));

        let mut got = Vec::new();
        for _ in 0..4 {
            got.push(rx.recv().await.unwrap());
        }
        assert_eq!(got, vec![100, 200, LOOKUP_BATCH + 11, LOOKUP_BATCH + 12]);
        stop.cancel();
        task.await.unwrap().unwrap();
    }
}
