//! Command-line and environment configuration shared by the binaries.

use crate::client::XkcdClient;
use crate::pipeline::{Pipeline, PipelineSettings, DEFAULT_PARALLELISM};
use crate::saturation::DEFAULT_THRESHOLD;
use crate::scheduler::Schedule;
use anyhow::{anyhow, Result};
use clap::{Args, ValueEnum};
use comics_core::{open_store, ComicStore, StoreConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::macros::format_description;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Json,
    Sled,
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Storage backend
    #[arg(long = "store", env = "COMICS_STORE", value_enum, default_value_t = StoreKind::Json)]
    pub kind: StoreKind,
    /// JSON database file, or sled directory
    #[arg(long, env = "COMICS_DB_PATH", default_value = "./data/database.json")]
    pub db_path: PathBuf,
    /// Persisted word index for the JSON store; searches scan all records without it
    #[arg(long, env = "COMICS_INDEX_PATH")]
    pub index_path: Option<PathBuf>,
}

impl StoreArgs {
    pub fn store_config(&self) -> StoreConfig {
        match self.kind {
            StoreKind::Json => StoreConfig::Json { path: self.db_path.clone(), index_path: self.index_path.clone() },
            StoreKind::Sled => StoreConfig::Sled { path: self.db_path.clone() },
        }
    }

    pub fn open(&self) -> Result<Arc<dyn ComicStore>> {
        Ok(open_store(&self.store_config())?)
    }
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Base URL of the remote catalog
    #[arg(long, env = "COMICS_SOURCE_URL", default_value = "https://xkcd.com")]
    pub source_url: String,
    /// Number of concurrent fetch workers
    #[arg(long, env = "COMICS_PARALLEL", default_value_t = DEFAULT_PARALLELISM)]
    pub parallel: usize,
    /// Per-request timeout seconds
    #[arg(long, env = "COMICS_TIMEOUT_SECS", default_value_t = 5)]
    pub timeout_secs: u64,
    /// Outstanding not-found responses that end a run
    #[arg(long, env = "COMICS_SATURATION", default_value_t = DEFAULT_THRESHOLD)]
    pub saturation: usize,
}

impl SourceArgs {
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings { parallelism: self.parallel.max(1), saturation_threshold: self.saturation.max(1) }
    }

    pub fn pipeline(&self, store: Arc<dyn ComicStore>) -> Result<Pipeline> {
        let client = XkcdClient::new(&self.source_url, Duration::from_secs(self.timeout_secs.max(1)))?;
        Ok(Pipeline::new(Arc::new(client), store, self.settings()))
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ScheduleArgs {
    /// Refresh every N seconds
    #[arg(long, env = "COMICS_REFRESH_EVERY", conflicts_with = "refresh_at")]
    pub refresh_every: Option<u64>,
    /// Refresh daily at HH:MM (UTC)
    #[arg(long, env = "COMICS_REFRESH_AT")]
    pub refresh_at: Option<String>,
}

impl ScheduleArgs {
    /// `None` when no background refresh was asked for.
    pub fn schedule(&self) -> Result<Option<Schedule>> {
        if let Some(secs) = self.refresh_every {
            if secs == 0 {
                return Err(anyhow!("--refresh-every must be positive"));
            }
            return Ok(Some(Schedule::Every(Duration::from_secs(secs))));
        }
        match &self.refresh_at {
            Some(s) => Ok(Some(Schedule::DailyAt(parse_time_of_day(s)?))),
            None => Ok(None),
        }
    }
}

pub fn parse_time_of_day(s: &str) -> Result<time::Time> {
    let fmt = format_description!("[hour]:[minute]");
    time::Time::parse(s.trim(), &fmt).map_err(|e| anyhow!("invalid time of day {s:?} (want HH:MM): {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::time;

    #[test]
    fn time_of_day_parses_hh_mm() {
        assert_eq!(parse_time_of_day("04:05").unwrap(), time!(04:05));
        assert_eq!(parse_time_of_day(" 23:59 ").unwrap(), time!(23:59));
        assert!(parse_time_of_day("25:00").is_err());
        assert!(parse_time_of_day("noon").is_err());
    }

    #[test]
    fn schedule_prefers_interval_and_rejects_zero() {
        let every = ScheduleArgs { refresh_every: Some(30), refresh_at: None };
        assert_eq!(every.schedule().unwrap(), Some(Schedule::Every(Duration::from_secs(30))));
        let zero = ScheduleArgs { refresh_every: Some(0), refresh_at: None };
        assert!(zero.schedule().is_err());
        assert_eq!(ScheduleArgs::default().schedule().unwrap(), None);
    }
}
