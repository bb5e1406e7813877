use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use barathon_lib::{init_tracing, run, RunOptions};
use clap::Parser;
use tracing::{info, warn};

/// Fills missing venue coordinates from the geocoder and writes the map data.
#[derive(Debug, Parser)]
#[command(name = "barathon", version, about)]
struct Cli {
    /// Venue sheet exported as CSV.
    #[arg(long, value_name = "path")]
    input: PathBuf,
    /// Where to write the enriched JSON. Defaults to stdout.
    #[arg(long, value_name = "path")]
    output: Option<PathBuf>,
    /// Directory holding the geocode cache.
    #[arg(long, value_name = "dir", env = "BARATHON_DATA_DIR", default_value = ".barathon")]
    data_dir: PathBuf,
    /// JSON page overrides (geocode, geocodeLimitPerLoad, city, ...).
    #[arg(long = "config", value_name = "path")]
    overrides: Option<PathBuf>,
    /// Enable geocoding for this run.
    #[arg(long)]
    geocode: bool,
    /// Maximum number of venues to geocode in this run.
    #[arg(long, value_name = "n")]
    limit: Option<usize>,
    /// Seed the cache from a signature → coordinate JSON snapshot.
    #[arg(long, value_name = "path")]
    import_cache: Option<PathBuf>,
    /// Dump the cache as a JSON snapshot after the run.
    #[arg(long, value_name = "path")]
    export_cache: Option<PathBuf>,
}

impl Cli {
    fn into_parts(self) -> (RunOptions, Option<PathBuf>) {
        let options = RunOptions {
            input: self.input,
            data_dir: self.data_dir,
            overrides: self.overrides,
            geocode: self.geocode,
            limit: self.limit,
            import_cache: self.import_cache,
            export_cache: self.export_cache,
        };
        (options, self.output)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let (options, output) = Cli::parse().into_parts();

    let cancel_flag = Arc::new(AtomicBool::new(false));
    let on_interrupt = cancel_flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing the current venue");
            on_interrupt.store(true, Ordering::SeqCst);
        }
    });

    let report = run(&options, cancel_flag)
        .await
        .with_context(|| format!("enrichment of {} failed", options.input.display()))?;

    match &output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &report)?;
            writer.flush()?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &report)?;
            writeln!(stdout)?;
        }
    }

    info!(
        venues = report.records.len(),
        on_map = report.progress.total,
        visited = report.progress.visited,
        percent = report.progress.percent,
        geocoded = report.stats.geocoded,
        cache_hits = report.stats.cache_hits,
        deferred = report.stats.deferred,
        "map data ready"
    );
    Ok(())
}
