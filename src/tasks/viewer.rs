use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::{Context, Result};
use softbuffer::{Context as SoftContext, Surface};
use tiny_skia::Pixmap;
use tokio::sync::mpsc::{Receiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

use crate::clock::{FrameRequest, FrameScheduler, MonotonicClock};
use crate::config::Configuration;
use crate::driver::Driver;
use crate::events::{AssetLoaded, AssetRequest};
use crate::geometry::SurfaceSize;

#[derive(Debug)]
enum ViewerEvent {
    Cancelled,
}

type WindowHandle = Arc<Window>;
type RequestSender = UnboundedSender<AssetRequest>;
type CompletionReceiver = Receiver<AssetLoaded>;

/// Frame scheduler backed by winit redraw requests. A cancelled request
/// leaves the redraw in flight but the viewer skips the frame.
struct WindowFrames {
    window: WindowHandle,
    next_id: u64,
}

impl FrameScheduler for WindowFrames {
    fn request_frame(&mut self) -> FrameRequest {
        self.next_id += 1;
        self.window.request_redraw();
        FrameRequest(self.next_id)
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        trace!(id = request.0, "frame request cancelled");
    }
}

struct Presenter {
    _context: SoftContext<WindowHandle>,
    surface: Surface<WindowHandle, WindowHandle>,
    canvas: Pixmap,
}

impl Presenter {
    fn new(window: WindowHandle) -> Result<Self> {
        let context = SoftContext::new(window.clone())
            .map_err(|err| anyhow::anyhow!("failed to create softbuffer context: {err}"))?;
        let surface = Surface::new(&context, window.clone())
            .map_err(|err| anyhow::anyhow!("failed to create softbuffer surface: {err}"))?;
        let size = surface_size(window.inner_size());
        let mut presenter = Self {
            _context: context,
            surface,
            canvas: Pixmap::new(size.width, size.height).context("failed to allocate canvas")?,
        };
        presenter.resize(size)?;
        Ok(presenter)
    }

    fn resize(&mut self, size: SurfaceSize) -> Result<()> {
        let (Some(width), Some(height)) = (NonZeroU32::new(size.width), NonZeroU32::new(size.height))
        else {
            return Ok(());
        };
        self.surface
            .resize(width, height)
            .map_err(|err| anyhow::anyhow!("failed to resize softbuffer surface: {err}"))?;
        if (self.canvas.width(), self.canvas.height()) != (size.width, size.height) {
            self.canvas =
                Pixmap::new(size.width, size.height).context("failed to allocate canvas")?;
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        let mut buffer = self
            .surface
            .buffer_mut()
            .map_err(|err| anyhow::anyhow!("failed to map softbuffer: {err}"))?;
        for (dst, px) in buffer.iter_mut().zip(self.canvas.pixels()) {
            // Frames are painted over an opaque background, so premultiplied
            // channels are the final color.
            *dst = (u32::from(px.red()) << 16) | (u32::from(px.green()) << 8) | u32::from(px.blue());
        }
        buffer
            .present()
            .map_err(|err| anyhow::anyhow!("failed to present frame: {err}"))
    }
}

fn surface_size(size: PhysicalSize<u32>) -> SurfaceSize {
    SurfaceSize::new(size.width.max(1), size.height.max(1))
}

struct ViewerApp {
    cfg: Configuration,
    cancel: CancellationToken,
    window: Option<WindowHandle>,
    presenter: Option<Presenter>,
    driver: Option<Driver<MonotonicClock, WindowFrames>>,
    clock: MonotonicClock,
    to_loader: RequestSender,
    from_loader: CompletionReceiver,
}

impl ViewerApp {
    fn new(
        cfg: Configuration,
        cancel: CancellationToken,
        to_loader: RequestSender,
        from_loader: CompletionReceiver,
    ) -> Self {
        Self {
            cfg,
            cancel,
            window: None,
            presenter: None,
            driver: None,
            clock: MonotonicClock::new(),
            to_loader,
            from_loader,
        }
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_some() {
            return Ok(());
        }

        let attrs = WindowAttributes::default().with_title(self.cfg.window_title.clone());
        let window = WindowHandle::new(
            event_loop
                .create_window(attrs)
                .context("failed to create viewer window")?,
        );
        let presenter = Presenter::new(window.clone())?;
        let frames = WindowFrames {
            window: window.clone(),
            next_id: 0,
        };
        let mut driver = Driver::new(self.cfg.clone(), self.clock.clone(), frames)?;
        let size = surface_size(window.inner_size());
        info!(width = size.width, height = size.height, "viewer surface configured");
        let requests = driver.init(size);
        self.submit(requests);

        self.window = Some(window);
        self.presenter = Some(presenter);
        self.driver = Some(driver);
        Ok(())
    }

    fn submit(&self, requests: Vec<AssetRequest>) {
        let count = requests.len();
        for request in requests {
            if self.to_loader.send(request).is_err() {
                warn!("loader is gone; asset requests dropped");
                return;
            }
        }
        debug!(count, "asset requests submitted");
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        let size = surface_size(new_size);
        if let Some(presenter) = self.presenter.as_mut()
            && let Err(err) = presenter.resize(size)
        {
            error!(error = ?err, "failed to resize viewer surface");
            return;
        }
        let requests = match self.driver.as_mut() {
            Some(driver) => driver.resize(size),
            None => return,
        };
        debug!(width = size.width, height = size.height, "viewer surface resized");
        self.submit(requests);
    }

    fn draw(&mut self) {
        let (Some(driver), Some(presenter)) = (self.driver.as_mut(), self.presenter.as_mut()) else {
            return;
        };
        if driver.pending_frame().is_none() {
            return;
        }

        while let Ok(loaded) = self.from_loader.try_recv() {
            driver.apply(loaded);
        }

        if let Some(stats) = driver.frame(&mut presenter.canvas) {
            trace!(
                scroll = stats.scroll_offset,
                transitions = stats.transitions,
                layers = stats.layers,
                "frame"
            );
        }
        if let Err(err) = presenter.present() {
            warn!(error = ?err, "frame dropped");
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(driver) = self.driver.as_mut() {
            driver.teardown();
        }
        self.cancel.cancel();
        event_loop.exit();
    }
}

impl ApplicationHandler<ViewerEvent> for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            self.shutdown(event_loop);
            return;
        }
        if let Err(err) = self.ensure_window(event_loop) {
            error!(error = ?err, "failed to initialize viewer");
            self.shutdown(event_loop);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("viewer window close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(new_size) => self.handle_resize(new_size),
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = window.inner_size();
                self.handle_resize(size);
            }
            WindowEvent::RedrawRequested => self.draw(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        let pending = self
            .driver
            .as_ref()
            .is_some_and(|driver| driver.pending_frame().is_some());
        if pending && let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Cancelled => {
                info!("viewer received cancellation event");
                self.shutdown(event_loop);
            }
        }
    }
}

/// Run the mosaic in a window on the current thread until it closes or
/// `cancel` fires. Must be called from within a tokio runtime.
pub fn run_windowed(
    cfg: Configuration,
    to_loader: RequestSender,
    from_loader: CompletionReceiver,
    cancel: CancellationToken,
) -> Result<()> {
    let event_loop = EventLoop::<ViewerEvent>::with_user_event()
        .build()
        .context("failed to build viewer event loop")?;
    let proxy = event_loop.create_proxy();

    let cancel_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(ViewerEvent::Cancelled);
        })
    };

    let mut app = ViewerApp::new(cfg, cancel, to_loader, from_loader);
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();

    run_result.context("viewer event loop failed")
}
