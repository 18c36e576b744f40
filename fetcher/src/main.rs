use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use comics_core::search::{find_comics, DEFAULT_RESULT_LEN};
use fetcher::config::{ScheduleArgs, SourceArgs, StoreArgs};
use fetcher::{PipelineError, Refresher};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "fetcher")]
#[command(about = "Ingest comics from the remote catalog into a searchable store")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch every comic the store does not have yet, then print {"new","total"}
    Update {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Print image URLs of the comics best matching a phrase
    Search {
        phrase: String,
        /// Maximum number of results
        #[arg(long, default_value_t = DEFAULT_RESULT_LEN)]
        limit: usize,
    },
    /// Keep the store fresh on a schedule until interrupted
    Watch {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        schedule: ScheduleArgs,
    },
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let t = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
        }
        t.cancel();
    });
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let store = cli.store.open()?;

    match cli.command {
        Commands::Update { source } => {
            let pipeline = source.pipeline(store)?;
            let shutdown = shutdown_on_ctrl_c();
            match pipeline.run(&shutdown).await {
                Ok(report) => {
                    if let Some(diag) = &report.diagnostics {
                        tracing::warn!("{diag}");
                    }
                    println!("{}", serde_json::to_string(&report.summary)?);
                    Ok(())
                }
                Err(PipelineError::Interrupted { summary }) => {
                    println!("{}", serde_json::to_string(&summary)?);
                    Err(anyhow!("update interrupted"))
                }
                Err(e) => Err(e.into()),
            }
        }
        Commands::Search { phrase, limit } => {
            let hits = tokio::task::spawn_blocking(move || find_comics(store.as_ref(), &phrase, limit)).await??;
            for rec in hits {
                println!("{}\t{}", rec.id, rec.url);
            }
            Ok(())
        }
        Commands::Watch { source, schedule } => {
            let schedule = schedule.schedule()?.ok_or_else(|| anyhow!("watch needs --refresh-every or --refresh-at"))?;
            let pipeline = Arc::new(source.pipeline(store)?);
            let shutdown = shutdown_on_ctrl_c();
            Refresher::new(pipeline, schedule).run(shutdown).await;
            Ok(())
        }
    }
}
