//! One fetch run: probe -> fetch workers -> persist, with saturation-based termination.

use crate::aggregator::{self, error_channel, AggregatedError, MIN_ERROR_CAPACITY};
use crate::client::ComicSource;
use crate::prober::probe;
use crate::saturation::{SaturationDetector, DEFAULT_THRESHOLD};
use crate::sink::{self, SinkStats};
use crate::worker::{run_worker, WorkerContext, WorkerTally};
use comics_core::{ComicStore, FetchSummary, FlushStats, StoreError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_PARALLELISM: usize = 16;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Number of concurrent fetch workers; also the size of every stage channel.
    pub parallelism: usize,
    /// Outstanding not-found signals that end a run.
    pub saturation_threshold: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self { parallelism: DEFAULT_PARALLELISM, saturation_threshold: DEFAULT_THRESHOLD }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub probed: usize,
    pub found: usize,
    pub not_found: usize,
    pub transient: usize,
    pub dropped_errors: usize,
    pub stored: usize,
    pub skipped: usize,
    pub saturated: bool,
}

/// Outcome of a finished run. `diagnostics` carries transient failures; their presence does
/// not make the run a failure.
#[derive(Debug)]
pub struct FetchReport {
    pub summary: FetchSummary,
    pub diagnostics: Option<AggregatedError>,
    pub stats: RunStats,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("probe candidates: {0}")]
    Probe(#[source] StoreError),
    #[error("flush store: {0}")]
    Flush(#[source] StoreError),
    #[error("run interrupted before finishing ({} new, {} total)", summary.new, summary.total)]
    Interrupted { summary: FetchSummary },
    #[error("{stage} task failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: JoinError,
    },
}

/// Wires prober, workers, error collection and the sink into one run.
pub struct Pipeline {
    source: Arc<dyn ComicSource>,
    store: Arc<dyn ComicStore>,
    settings: PipelineSettings,
    running: Mutex<()>,
}

impl Pipeline {
    pub fn new(source: Arc<dyn ComicSource>, store: Arc<dyn ComicStore>, settings: PipelineSettings) -> Self {
        Self { source, store, settings, running: Mutex::new(()) }
    }

    pub fn store(&self) -> &Arc<dyn ComicStore> { &self.store }

    pub fn settings(&self) -> &PipelineSettings { &self.settings }

    /// Run until saturation, then flush. Runs on the same pipeline are serialized.
    ///
    /// Cancelling `shutdown` stops every stage promptly; the store is still flushed so work done
    /// so far is kept, and the run reports [`PipelineError::Interrupted`].
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<FetchReport, PipelineError> {
        let _running = self.running.lock().await;
        let started = Instant::now();
        let parallel = self.settings.parallelism.max(1);
        let stop = shutdown.child_token();
        let _stop_on_exit = stop.clone().drop_guard();
        let detector = Arc::new(SaturationDetector::new(self.settings.saturation_threshold, stop.clone()));
        tracing::info!(parallel, threshold = self.settings.saturation_threshold, "fetch run started");

        let (id_tx, id_rx) = mpsc::channel(parallel);
        let (comic_tx, comic_rx) = mpsc::channel(parallel);
        let (reporter, error_rx) = error_channel(parallel.max(MIN_ERROR_CAPACITY));

        let prober = tokio::spawn(probe(Arc::clone(&self.store), id_tx, stop.clone()));
        let collector = tokio::spawn(aggregator::collect(error_rx));
        let sink = tokio::spawn(sink::persist(Arc::clone(&self.store), comic_rx));

        let ctx = WorkerContext {
            source: Arc::clone(&self.source),
            ids: Arc::new(Mutex::new(id_rx)),
            comics: comic_tx,
            detector: Arc::clone(&detector),
            errors: reporter,
            stop: stop.clone(),
            shutdown: shutdown.clone(),
        };
        let mut workers = JoinSet::new();
        for n in 0..parallel {
            workers.spawn(run_worker(n, ctx.clone()));
        }
        // Only workers may hold the channel ends now, so stages close as workers finish.
        drop(ctx);

        let mut tally = WorkerTally::default();
        let mut fatal: Option<PipelineError> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(t) => tally += t,
                Err(e) => tracing::error!(error = %e, "fetch worker task failed"),
            }
        }
        // No worker left to drain candidates; release the prober if it is still going.
        stop.cancel();

        match prober.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, "prober could not read the store");
                fatal = Some(PipelineError::Probe(e));
            }
            Err(e) => fatal = Some(PipelineError::Stage { stage: "prober", source: e }),
        }
        let sink_stats = match sink.await {
            Ok(s) => s,
            Err(e) => {
                fatal.get_or_insert(PipelineError::Stage { stage: "sink", source: e });
                SinkStats::default()
            }
        };
        let diagnostics = match collector.await {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(error = %e, "error collector task failed");
                None
            }
        };

        let flushed = self.flush().await?;
        let summary = FetchSummary { new: flushed.new, total: flushed.total };
        let stats = RunStats {
            probed: tally.probed,
            found: tally.found,
            not_found: tally.not_found,
            transient: tally.transient,
            dropped_errors: tally.dropped_errors,
            stored: sink_stats.stored,
            skipped: sink_stats.skipped,
            saturated: detector.is_saturated(),
        };
        tracing::info!(
            new = summary.new,
            total = summary.total,
            probed = stats.probed,
            transient = stats.transient,
            saturated = stats.saturated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetch run finished"
        );

        if let Some(err) = fatal {
            return Err(err);
        }
        if shutdown.is_cancelled() {
            return Err(PipelineError::Interrupted { summary });
        }
        Ok(FetchReport { summary, diagnostics, stats })
    }

    async fn flush(&self) -> Result<FlushStats, PipelineError> {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.flush()).await {
            Ok(res) => res.map_err(|e| {
                tracing::error!(error = %e, "store flush failed");
                PipelineError::Flush(e)
            }),
            Err(e) => Err(PipelineError::Stage { stage: "flush", source: e }),
        }
    }
}
