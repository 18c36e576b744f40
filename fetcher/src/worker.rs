use crate::aggregator::ErrorReporter;
use crate::client::{ComicSource, FetchOutcome};
use crate::saturation::{SaturationDetector, Signal};
use comics_core::{CandidateId, RemoteComic};
use std::ops::AddAssign;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Candidate intake shared by every worker.
pub type SharedIds = Arc<Mutex<mpsc::Receiver<CandidateId>>>;

/// What one worker needs. Cloned once per worker.
#[derive(Clone)]
pub struct WorkerContext {
    pub source: Arc<dyn ComicSource>,
    pub ids: SharedIds,
    pub comics: mpsc::Sender<RemoteComic>,
    pub detector: Arc<SaturationDetector>,
    pub errors: ErrorReporter,
    /// Run scope: stops intake of new candidates (saturation or shutdown).
    pub stop: CancellationToken,
    /// Caller scope: also abandons in-flight fetches and hand-offs.
    pub shutdown: CancellationToken,
}

/// Per-worker counts, summed by the orchestrator after join.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTally {
    pub probed: usize,
    pub found: usize,
    pub not_found: usize,
    pub transient: usize,
    pub dropped_errors: usize,
}

impl AddAssign for WorkerTally {
    fn add_assign(&mut self, rhs: Self) {
        self.probed += rhs.probed;
        self.found += rhs.found;
        self.not_found += rhs.not_found;
        self.transient += rhs.transient;
        self.dropped_errors += rhs.dropped_errors;
    }
}

async fn next_id(ids: &SharedIds) -> Option<CandidateId> {
    ids.lock().await.recv().await
}

pub async fn run_worker(worker: usize, ctx: WorkerContext) -> WorkerTally {
    let mut tally = WorkerTally::default();
    loop {
        let id = tokio::select! {
            biased;
            _ = ctx.stop.cancelled() => break,
            next = next_id(&ctx.ids) => match next {
                Some(id) => id,
                None => break,
            },
        };
        tally.probed += 1;

        let outcome = tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => break,
            outcome = ctx.source.fetch(id) => outcome,
        };

        match outcome {
            FetchOutcome::Found(comic) => {
                tracing::debug!(worker, id, "found");
                tally.found += 1;
                ctx.detector.discount();
                tokio::select! {
                    biased;
                    _ = ctx.shutdown.cancelled() => break,
                    sent = ctx.comics.send(comic) => {
                        if sent.is_err() {
                            tracing::warn!(worker, id, "sink closed, worker exiting");
                            break;
                        }
                    }
                }
            }
            FetchOutcome::NotFound => {
                tracing::debug!(worker, id, "not found");
                tally.not_found += 1;
                if ctx.detector.not_found() == Signal::Saturated {
                    break;
                }
            }
            FetchOutcome::Transient(err) => {
                tally.transient += 1;
                if !ctx.errors.report(err) {
                    tally.dropped_errors += 1;
                }
            }
        }
    }
    tracing::debug!(worker, probed = tally.probed, "worker finished");
    tally
}
