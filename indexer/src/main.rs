use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comics_core::{ComicRecord, ComicStore, RemoteComic};
use fetcher::config::{StoreArgs, StoreKind};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Offline maintenance of the comics store", long_about = None)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load raw catalog entries from JSON/JSONL files or a directory of them
    Import {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
    },
    /// Copy every record of the configured store into another backend
    Migrate {
        #[arg(long, value_enum)]
        to_store: StoreKind,
        #[arg(long)]
        to_path: PathBuf,
    },
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ImportStats {
    files: usize,
    stored: usize,
    skipped: usize,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let store = cli.store.open()?;

    match cli.command {
        Commands::Import { input } => {
            let stats = import(store.as_ref(), &input)?;
            let flushed = store.flush()?;
            tracing::info!(files = stats.files, skipped = stats.skipped, new = flushed.new, total = flushed.total, "import complete");
            Ok(())
        }
        Commands::Migrate { to_store, to_path } => {
            let target = StoreArgs { kind: to_store, db_path: to_path, index_path: None }.open()?;
            let copied = migrate(store.as_ref(), target.as_ref())?;
            tracing::info!(copied, "migration complete");
            Ok(())
        }
    }
}

fn input_files(input: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

fn import(store: &dyn ComicStore, input: &Path) -> Result<ImportStats> {
    let mut stats = ImportStats::default();
    for file in input_files(input) {
        let comics = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file)?
        } else {
            read_json(&file)?
        };
        stats.files += 1;
        for comic in comics {
            match ComicRecord::from_remote(&comic) {
                Ok(rec) => {
                    store.add_one(rec)?;
                    stats.stored += 1;
                }
                Err(e) => {
                    tracing::warn!(id = comic.num, file = %file.display(), error = %e, "skipping entry");
                    stats.skipped += 1;
                }
            }
        }
    }
    Ok(stats)
}

fn read_jsonl(file: &Path) -> Result<Vec<RemoteComic>> {
    let reader = BufReader::new(File::open(file).with_context(|| format!("open {}", file.display()))?);
    let mut out = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        out.push(serde_json::from_str(&line).with_context(|| format!("{}:{}", file.display(), n + 1))?);
    }
    Ok(out)
}

fn read_json(file: &Path) -> Result<Vec<RemoteComic>> {
    let reader = BufReader::new(File::open(file).with_context(|| format!("open {}", file.display()))?);
    let json: serde_json::Value = serde_json::from_reader(reader).with_context(|| format!("parse {}", file.display()))?;
    Ok(match json {
        serde_json::Value::Array(arr) => arr.into_iter().map(serde_json::from_value).collect::<Result<_, _>>()?,
        serde_json::Value::Object(_) => vec![serde_json::from_value(json)?],
        _ => Vec::new(),
    })
}

fn migrate(from: &dyn ComicStore, to: &dyn ComicStore) -> Result<usize> {
    let records = from.records()?;
    let n = records.len();
    for rec in records {
        to.add_one(rec)?;
    }
    to.flush()?;
    Ok(n)
}
