pub mod aggregator;
pub mod client;
pub mod config;
pub mod pipeline;
pub mod prober;
pub mod saturation;
pub mod scheduler;
pub mod sink;
pub mod worker;

pub use aggregator::AggregatedError;
pub use client::{ComicSource, FetchFailure, FetchOutcome, TransientError, XkcdClient};
pub use pipeline::{FetchReport, Pipeline, PipelineError, PipelineSettings, RunStats};
pub use scheduler::{Refresher, Schedule};
