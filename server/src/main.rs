use anyhow::Result;
use clap::Parser;
use fetcher::config::{ScheduleArgs, SourceArgs, StoreArgs};
use fetcher::Refresher;
use server::{build_app, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Host to bind
    #[arg(long, env = "COMICS_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, env = "COMICS_PORT", default_value_t = 8080)]
    port: u16,
    #[command(flatten)]
    store: StoreArgs,
    #[command(flatten)]
    source: SourceArgs,
    #[command(flatten)]
    schedule: ScheduleArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let store = args.store.open()?;
    let pipeline = Arc::new(args.source.pipeline(store)?);
    let shutdown = CancellationToken::new();

    let admin_token = std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty());
    if admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set, POST /update is disabled");
    }

    let refresher = match args.schedule.schedule()? {
        Some(schedule) => Some(tokio::spawn(Refresher::new(Arc::clone(&pipeline), schedule).run(shutdown.clone()))),
        None => None,
    };

    let app = build_app(AppState { pipeline, admin_token, shutdown: shutdown.clone() });
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
            }
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = refresher {
        handle.await?;
    }
    Ok(())
}
