use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tiny_skia::{IntSize, Pixmap};
use tokio::select;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{Sender, UnboundedReceiver};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::asset::{AssetId, ImageHandle};
use crate::error::AssetError;
use crate::events::{AssetLoaded, AssetRequest, SlotAddress};

/// Turns an identifier into raw encoded bytes.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self, id: &AssetId) -> impl Future<Output = Result<Vec<u8>, AssetError>> + Send;
}

/// Fetches `http(s)://` identifiers over the network and everything else
/// (`file://` or a bare path) from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct SourceFetcher {
    client: reqwest::Client,
}

impl SourceFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Fetch for SourceFetcher {
    async fn fetch(&self, id: &AssetId) -> Result<Vec<u8>, AssetError> {
        let raw = id.as_str();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            let response = self.client.get(raw).send().await?.error_for_status()?;
            return Ok(response.bytes().await?.to_vec());
        }
        let path = raw.strip_prefix("file://").unwrap_or(raw);
        Ok(tokio::fs::read(Path::new(path)).await?)
    }
}

// Decodes encoded bytes into a premultiplied pixmap.
fn decode_pixmap(bytes: &[u8]) -> Result<Pixmap, AssetError> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    let size = IntSize::from_wh(width, height).ok_or(AssetError::Empty { width, height })?;

    let mut data = rgba.into_raw();
    for px in data.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a < 255 {
            for c in &mut px[..3] {
                *c = ((u16::from(*c) * a + 127) / 255) as u8;
            }
        }
    }
    Pixmap::from_vec(data, size).ok_or(AssetError::Empty { width, height })
}

async fn load_asset<F: Fetch>(fetcher: &F, id: &AssetId) -> Result<ImageHandle, AssetError> {
    let bytes = fetcher.fetch(id).await?;
    let pixmap = tokio::task::spawn_blocking(move || decode_pixmap(&bytes))
        .await
        .map_err(|err| AssetError::Join(err.to_string()))??;
    Ok(Arc::new(pixmap))
}

enum CacheEntry {
    /// Fetch queued or running; deliver to these slots when it lands.
    Pending(Vec<SlotAddress>),
    Ready(ImageHandle),
    /// Single attempt failed; the slots stay empty.
    Failed,
}

/// Deduplicating asset loader:
/// - A cached identifier is answered immediately.
/// - An identifier already in flight gains another waiter instead of a fetch.
/// - Failures are logged and remembered; no completion is ever sent for them.
///
/// The cache lives as long as the task, so grid rebuilds that re-request the
/// same identifiers are served without refetching. Exits on cancellation, when
/// the completion channel closes, or once requests close and nothing is in
/// flight.
pub async fn run<F: Fetch>(
    mut requests: UnboundedReceiver<AssetRequest>,
    completions: Sender<AssetLoaded>,
    cancel: CancellationToken,
    max_in_flight: usize,
    fetcher: Arc<F>,
) -> Result<()> {
    let max_in_flight = max_in_flight.max(1);
    let mut cache: HashMap<AssetId, CacheEntry> = HashMap::new();
    let mut queued: VecDeque<AssetId> = VecDeque::new();
    let mut tasks: JoinSet<(AssetId, Result<ImageHandle, AssetError>)> = JoinSet::new();
    let mut requests_closed = false;

    loop {
        if requests_closed && tasks.is_empty() && queued.is_empty() {
            break;
        }

        let ready = select! {
            _ = cancel.cancelled() => break,

            maybe_request = requests.recv(), if !requests_closed => match maybe_request {
                Some(AssetRequest { id, target }) => enqueue(&mut cache, &mut queued, id, target),
                None => {
                    requests_closed = true;
                    Vec::new()
                }
            },

            Some(join_res) = tasks.join_next() => match join_res {
                Ok((id, result)) => settle(&mut cache, id, result),
                Err(err) => {
                    warn!("asset task failed to join: {err}");
                    Vec::new()
                }
            },
        };

        if deliver(&completions, ready).await.is_err() {
            debug!("completion channel closed; stopping loader");
            break;
        }

        while tasks.len() < max_in_flight {
            let Some(id) = queued.pop_front() else {
                break;
            };
            let fetcher = Arc::clone(&fetcher);
            tasks.spawn(async move {
                let result = load_asset(fetcher.as_ref(), &id).await;
                (id, result)
            });
        }
    }

    tasks.abort_all();
    Ok(())
}

fn enqueue(
    cache: &mut HashMap<AssetId, CacheEntry>,
    queued: &mut VecDeque<AssetId>,
    id: AssetId,
    target: SlotAddress,
) -> Vec<AssetLoaded> {
    match cache.get_mut(&id) {
        Some(CacheEntry::Ready(image)) => {
            trace!(%id, "asset cache hit");
            vec![AssetLoaded {
                target,
                image: image.clone(),
            }]
        }
        Some(CacheEntry::Pending(waiters)) => {
            waiters.push(target);
            Vec::new()
        }
        Some(CacheEntry::Failed) => {
            trace!(%id, "asset previously failed");
            Vec::new()
        }
        None => {
            cache.insert(id.clone(), CacheEntry::Pending(vec![target]));
            queued.push_back(id);
            Vec::new()
        }
    }
}

fn settle(
    cache: &mut HashMap<AssetId, CacheEntry>,
    id: AssetId,
    result: Result<ImageHandle, AssetError>,
) -> Vec<AssetLoaded> {
    let waiters = match cache.remove(&id) {
        Some(CacheEntry::Pending(waiters)) => waiters,
        _ => Vec::new(),
    };
    match result {
        Ok(image) => {
            debug!(%id, waiters = waiters.len(), "asset loaded");
            cache.insert(id, CacheEntry::Ready(image.clone()));
            waiters
                .into_iter()
                .map(|target| AssetLoaded {
                    target,
                    image: image.clone(),
                })
                .collect()
        }
        Err(err) => {
            debug!(%id, error = %err, "asset unavailable");
            cache.insert(id, CacheEntry::Failed);
            Vec::new()
        }
    }
}

async fn deliver(
    completions: &Sender<AssetLoaded>,
    ready: Vec<AssetLoaded>,
) -> Result<(), SendError<AssetLoaded>> {
    for loaded in ready {
        completions.send(loaded).await?;
    }
    Ok(())
}
