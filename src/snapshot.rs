//! Headless single-frame rendering against a synthetic clock.
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tiny_skia::Pixmap;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{ManualClock, ManualFrames};
use crate::config::Configuration;
use crate::driver::Driver;
use crate::geometry::SurfaceSize;
use crate::tasks::loader::{self, Fetch};

#[derive(Debug, Clone, Copy)]
pub struct SnapshotOptions {
    pub size: SurfaceSize,
    /// Clock time of the rendered frame, in ms after grid construction.
    pub at_ms: f64,
    /// Upper bound on how long to wait for assets before rendering.
    pub wait: Duration,
}

/// Build the grid, give the loader up to `opts.wait` to resolve assets, then
/// render one frame at `opts.at_ms`. Slots still unresolved draw as empty.
pub async fn render<F: Fetch>(
    cfg: Configuration,
    opts: SnapshotOptions,
    fetcher: Arc<F>,
) -> Result<Pixmap> {
    let clock = ManualClock::new(0.0);
    let mut driver = Driver::new(cfg, clock.clone(), ManualFrames::default())?;
    let requests = driver.init(opts.size);
    let expected = requests.len();

    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (done_tx, mut done_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let loader = tokio::spawn(loader::run(
        req_rx,
        done_tx,
        cancel.clone(),
        driver.config().loader_max_concurrent_fetches,
        fetcher,
    ));
    for request in requests {
        // The loader only exits once this sender is dropped.
        let _ = req_tx.send(request);
    }
    drop(req_tx);

    let deadline = Instant::now() + opts.wait;
    let mut received = 0;
    while received < expected {
        match timeout_at(deadline, done_rx.recv()).await {
            Ok(Some(loaded)) => {
                driver.apply(loaded);
                received += 1;
            }
            Ok(None) => break,
            Err(_) => {
                debug!(received, expected, "asset wait timed out");
                break;
            }
        }
    }
    cancel.cancel();
    match loader.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("loader task error: {err:?}"),
        Err(err) => warn!("loader join error: {err}"),
    }
    info!(received, expected, "assets resolved for snapshot");

    let mut canvas = Pixmap::new(opts.size.width.max(1), opts.size.height.max(1))
        .context("failed to allocate snapshot canvas")?;
    clock.set(opts.at_ms);
    driver.frame(&mut canvas);
    driver.teardown();
    Ok(canvas)
}

/// Encode an opaque frame as PNG.
pub fn save_png(canvas: &Pixmap, path: &Path) -> Result<()> {
    let img = image::RgbaImage::from_raw(canvas.width(), canvas.height(), canvas.data().to_vec())
        .context("canvas buffer does not match its dimensions")?;
    img.save(path)
        .with_context(|| format!("failed to write snapshot to {}", path.display()))
}
