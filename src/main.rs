use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use hex_mosaic::config::Configuration;
use hex_mosaic::geometry::SurfaceSize;
use hex_mosaic::snapshot::{self, SnapshotOptions};
use hex_mosaic::tasks::{self, loader::SourceFetcher};

#[derive(Debug, Parser)]
#[command(
    name = "hex-mosaic",
    version,
    about = "scrolling hexagonal image mosaic"
)]
struct Args {
    /// Path to YAML config; built-in defaults when omitted
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,
    /// Hexagon size multiplier (0.5 - 3.0)
    #[arg(long, value_name = "SCALE")]
    outer_scale: Option<f64>,
    /// Image inset inside each hexagon (0.5 - 1.0)
    #[arg(long, value_name = "SCALE")]
    inner_scale: Option<f64>,
    /// Scroll speed in rows per second (0.1 - 2.0)
    #[arg(long, value_name = "ROWS_PER_SEC")]
    speed: Option<f64>,
    /// Base time between image changes per cell (1000 - 10000)
    #[arg(long, value_name = "MILLIS")]
    interval_ms: Option<u64>,
    /// Identifier template containing {cell} and {slot}
    #[arg(long, value_name = "TEMPLATE")]
    asset_source: Option<String>,
    /// Deterministic RNG seed for transition jitter
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
    /// Render a single frame to this PNG instead of opening a window
    #[arg(long, value_name = "PNG")]
    snapshot: Option<PathBuf>,
    /// Clock time of the snapshot frame
    #[arg(long, value_name = "MILLIS", default_value_t = 0.0, requires = "snapshot")]
    at_ms: f64,
    /// Snapshot surface size
    #[arg(long, value_name = "WxH", default_value = "1600x900", value_parser = parse_size, requires = "snapshot")]
    size: SurfaceSize,
    /// How long the snapshot waits for assets
    #[arg(long, value_name = "MILLIS", default_value_t = 10_000, requires = "snapshot")]
    wait_ms: u64,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn parse_size(raw: &str) -> Result<SurfaceSize, String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {raw:?}"))?;
    let width: u32 = w.trim().parse().map_err(|err| format!("bad width: {err}"))?;
    let height: u32 = h.trim().parse().map_err(|err| format!("bad height: {err}"))?;
    if width == 0 || height == 0 {
        return Err("size must be non-zero".into());
    }
    Ok(SurfaceSize::new(width, height))
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("hex_mosaic={level},info"))),
        )
        .with_target(false)
        .compact()
        .init();
}

impl Args {
    fn apply_overrides(&self, cfg: &mut Configuration) {
        if let Some(v) = self.outer_scale {
            cfg.outer_scale = v;
        }
        if let Some(v) = self.inner_scale {
            cfg.inner_scale = v;
        }
        if let Some(v) = self.speed {
            cfg.speed = v;
        }
        if let Some(v) = self.interval_ms {
            cfg.interval_ms = v;
        }
        if let Some(v) = &self.asset_source {
            cfg.asset_source = v.clone();
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut cfg = match &args.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    args.apply_overrides(&mut cfg);
    let cfg = cfg.validated().context("invalid configuration values")?;
    tracing::info!("Effective configuration:\n{:#?}", cfg);

    if let Some(out) = &args.snapshot {
        let opts = SnapshotOptions {
            size: args.size,
            at_ms: args.at_ms,
            wait: Duration::from_millis(args.wait_ms),
        };
        let canvas = snapshot::render(cfg, opts, Arc::new(SourceFetcher::new())).await?;
        snapshot::save_png(&canvas, out)?;
        tracing::info!("snapshot written to {}", out.display());
        return Ok(());
    }

    let (to_loader_tx, to_loader_rx) = mpsc::unbounded_channel(); // Viewer -> Loader
    let (loaded_tx, loaded_rx) = mpsc::channel(256); // Loader -> Viewer

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();
    tasks.spawn({
        let cancel = cancel.clone();
        let max_in_flight = cfg.loader_max_concurrent_fetches;
        async move {
            tasks::loader::run(
                to_loader_rx,
                loaded_tx,
                cancel,
                max_in_flight,
                Arc::new(SourceFetcher::new()),
            )
            .await
            .context("loader task failed")
        }
    });

    // Blocks until the window closes or cancellation fires.
    if let Err(e) = tasks::viewer::run_windowed(cfg, to_loader_tx, loaded_rx, cancel.clone())
        .context("viewer failed")
    {
        tracing::error!("{e:?}");
    }
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    Ok(())
}
