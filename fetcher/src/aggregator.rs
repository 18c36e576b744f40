use crate::client::TransientError;
use std::fmt;
use tokio::sync::mpsc;

/// Floor for the transient-error channel, whatever the parallelism.
pub const MIN_ERROR_CAPACITY: usize = 10;

/// All transient failures of one run, joined into a single diagnostic.
#[derive(Debug)]
pub struct AggregatedError {
    errors: Vec<TransientError>,
}

impl AggregatedError {
    pub fn errors(&self) -> &[TransientError] { &self.errors }

    pub fn len(&self) -> usize { self.errors.len() }

    pub fn is_empty(&self) -> bool { self.errors.is_empty() }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ { self.errors.iter().map(|e| e.id) }
}

impl fmt::Display for AggregatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} transient fetch error(s)", self.errors.len())?;
        for e in &self.errors {
            write!(f, "\n{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregatedError {}

/// Producer half handed to workers. Never blocks; drops errors when the buffer is full.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: mpsc::Sender<TransientError>,
}

impl ErrorReporter {
    /// Returns false when the error was dropped.
    pub fn report(&self, err: TransientError) -> bool {
        match self.tx.try_send(err) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(err)) => {
                tracing::debug!(id = err.id, "error buffer full, dropping diagnostic");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

pub fn error_channel(capacity: usize) -> (ErrorReporter, mpsc::Receiver<TransientError>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ErrorReporter { tx }, rx)
}

/// Drain until every reporter is dropped. `None` when nothing failed.
pub async fn collect(mut rx: mpsc::Receiver<TransientError>) -> Option<AggregatedError> {
    let mut errors = Vec::new();
    while let Some(err) = rx.recv().await {
        tracing::warn!(id = err.id, error = %err.cause, "transient fetch error");
        errors.push(err);
    }
    errors.sort_by_key(|e| e.id);
    if errors.is_empty() { None } else { Some(AggregatedError { errors }) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FetchFailure;

    fn err(id: u64) -> TransientError {
        TransientError { id, cause: FetchFailure::Status(503) }
    }

    #[tokio::test]
    async fn joins_all_errors_with_ids() {
        let (reporter, rx) = error_channel(4);
        let task = tokio::spawn(collect(rx));
        for id in [9, 3, 5] {
            assert!(reporter.report(err(id)));
        }
        drop(reporter);
        let agg = task.await.unwrap().unwrap();
        assert_eq!(agg.ids().collect::<Vec<_>>(), vec![3, 5, 9]);
        let text = agg.to_string();
        assert!(text.contains("id 3: unexpected response status 503"));
        assert!(text.contains("id 9:"));
    }

    #[tokio::test]
    async fn full_buffer_drops_instead_of_blocking() {
        let (reporter, rx) = error_channel(1);
        assert!(reporter.report(err(1)));
        assert!(!reporter.report(err(2)));
        drop(reporter);
        let agg = collect(rx).await.unwrap();
        assert_eq!(agg.len(), 1);
    }

    #[tokio::test]
    async fn nothing_reported_is_none() {
        let (reporter, rx) = error_channel(1);
        drop(reporter);
        assert!(collect(rx).await.is_none());
    }
}
