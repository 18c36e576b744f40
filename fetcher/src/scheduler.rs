//! Re-runs the pipeline in the background, one run at a time.

use crate::pipeline::Pipeline;
use std::sync::Arc;
use std::time::Duration;
use time::{OffsetDateTime, Time};
use tokio_util::sync::CancellationToken;

const DAY: time::Duration = time::Duration::DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Fixed delay between the end of one run and the start of the next.
    Every(Duration),
    /// Once a day at this UTC wall-clock time.
    DailyAt(Time),
}

/// Next occurrence of `at` strictly after `now`: today if still ahead, else tomorrow.
pub fn next_daily(now: OffsetDateTime, at: Time) -> OffsetDateTime {
    let today = now.replace_time(at);
    if today > now { today } else { today + DAY }
}

impl Schedule {
    /// When the next run is due, given the previously planned slot (if any).
    fn plan(&self, now: OffsetDateTime, last: Option<OffsetDateTime>) -> OffsetDateTime {
        match *self {
            Schedule::Every(every) => now + every,
            Schedule::DailyAt(at) => match last {
                // Keep the daily rhythm even if a run overran.
                Some(prev) if prev + DAY > now => prev + DAY,
                _ => next_daily(now, at),
            },
        }
    }
}

pub struct Refresher {
    pipeline: Arc<Pipeline>,
    schedule: Schedule,
}

impl Refresher {
    pub fn new(pipeline: Arc<Pipeline>, schedule: Schedule) -> Self {
        Self { pipeline, schedule }
    }

    /// Loop until `shutdown` fires. Does not run at start-up; the first run waits for the schedule.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(schedule = ?self.schedule, "background refresh started");
        let mut last = None;
        loop {
            let now = OffsetDateTime::now_utc();
            let due = self.schedule.plan(now, last);
            last = Some(due);
            let wait: Duration = (due - now).try_into().unwrap_or(Duration::ZERO);
            tracing::debug!(next_run = %due, "next background refresh scheduled");

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            match self.pipeline.run(&shutdown).await {
                Ok(report) => {
                    tracing::info!(new = report.summary.new, total = report.summary.total, "background refresh done");
                    if let Some(diag) = &report.diagnostics {
                        tracing::warn!(failed = diag.len(), "background refresh had transient errors");
                    }
                }
                Err(e) => tracing::error!(error = %e, "background refresh failed"),
            }
        }
        tracing::info!("background refresh stopped");
    }
}
