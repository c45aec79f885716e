//! Animation driver: owns the session and runs update + draw once per frame.
use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tiny_skia::{Color, Pixmap};
use tracing::{debug, info, trace, warn};

use crate::asset::AssetSource;
use crate::clock::{Clock, FrameRequest, FrameScheduler};
use crate::compositor::{CellStyle, draw_cell};
use crate::config::Configuration;
use crate::events::{AssetLoaded, AssetRequest};
use crate::geometry::{Geometry, SurfaceSize};
use crate::grid::Grid;
use crate::scheduler;

/// Everything derived from one (surface, configuration) pair.
#[derive(Debug)]
pub struct Session {
    pub surface: SurfaceSize,
    pub geometry: Geometry,
    pub grid: Grid,
    /// Clock time (ms) the scroll animation is measured from.
    pub started_at: f64,
}

#[derive(Debug)]
enum DriverState {
    Uninitialized,
    Running(Session),
    TornDown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub scroll_offset: f64,
    pub transitions: usize,
    pub layers: usize,
}

pub struct Driver<C, F> {
    cfg: Configuration,
    source: AssetSource,
    clock: C,
    frames: F,
    rng: StdRng,
    generation: u64,
    pending_frame: Option<FrameRequest>,
    state: DriverState,
}

impl<C: Clock, F: FrameScheduler> Driver<C, F> {
    pub fn new(cfg: Configuration, clock: C, frames: F) -> Result<Self> {
        let cfg = cfg.validated()?;
        let source = AssetSource::new(&cfg.asset_source)?;
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            cfg,
            source,
            clock,
            frames,
            rng,
            generation: 0,
            pending_frame: None,
            state: DriverState::Uninitialized,
        })
    }

    /// Build the first session and start the frame loop. Returns the asset
    /// requests for every slot of the new grid.
    pub fn init(&mut self, surface: SurfaceSize) -> Vec<AssetRequest> {
        match self.state {
            DriverState::Uninitialized => self.rebuild(surface),
            DriverState::Running(_) => {
                debug!("init on a running driver; rebuilding");
                self.rebuild(surface)
            }
            DriverState::TornDown => {
                warn!("init after teardown ignored");
                Vec::new()
            }
        }
    }

    /// Discard the current grid and rebuild it for `surface`.
    pub fn resize(&mut self, surface: SurfaceSize) -> Vec<AssetRequest> {
        match self.state {
            DriverState::Running(ref session) if session.surface == surface => {
                trace!(?surface, "resize to current size ignored");
                Vec::new()
            }
            DriverState::Running(_) => self.rebuild(surface),
            DriverState::Uninitialized => self.init(surface),
            DriverState::TornDown => Vec::new(),
        }
    }

    fn rebuild(&mut self, surface: SurfaceSize) -> Vec<AssetRequest> {
        if let Some(request) = self.pending_frame.take() {
            self.frames.cancel_frame(request);
        }

        self.generation += 1;
        let now = self.clock.now_ms();
        let geometry = Geometry::compute(surface, self.cfg.outer_scale, self.cfg.visible_rows);
        let grid = Grid::build(
            &geometry,
            self.cfg.ring_size,
            self.cfg.interval_ms as f64,
            self.generation,
            now,
            &mut self.rng,
        );
        let requests = grid.asset_requests(&self.source);
        info!(
            generation = self.generation,
            width = surface.width,
            height = surface.height,
            hex_size = geometry.hex_size,
            columns = geometry.columns,
            rows = geometry.rows,
            "grid rebuilt"
        );

        self.state = DriverState::Running(Session {
            surface,
            geometry,
            grid,
            started_at: now,
        });
        self.pending_frame = Some(self.frames.request_frame());
        requests
    }

    /// Advance every cell's transition timer and paint the frame into
    /// `target`, then request the next frame. Does nothing unless running.
    pub fn frame(&mut self, target: &mut Pixmap) -> Option<FrameStats> {
        let DriverState::Running(session) = &mut self.state else {
            return None;
        };
        self.pending_frame = None;

        let now = self.clock.now_ms();
        let geometry = session.geometry;
        let elapsed_secs = (now - session.started_at).max(0.0) / 1_000.0;
        let scroll_offset = geometry.scroll_offset(self.cfg.speed, elapsed_secs);

        let [r, g, b] = self.cfg.background;
        target.fill(Color::from_rgba8(r, g, b, 255));

        let transitions = scheduler::update_grid(&mut session.grid, now, &mut self.rng);

        let style = CellStyle {
            hex_size: geometry.hex_size as f32,
            inner_scale: self.cfg.inner_scale as f32,
            transition_ms: self.cfg.transition_ms as f64,
        };
        let height = f64::from(target.height());
        let mut layers = 0;
        for cell in session.grid.cells() {
            let y = geometry.wrap_y(cell.base_y, scroll_offset);
            if y + geometry.hex_size < 0.0 || y - geometry.hex_size > height {
                continue;
            }
            layers += draw_cell(target, cell, (cell.base_x as f32, y as f32), &style, now);
        }

        self.pending_frame = Some(self.frames.request_frame());
        Some(FrameStats {
            scroll_offset,
            transitions,
            layers,
        })
    }

    /// Deliver a loaded image. Stale generations and deliveries after teardown
    /// are dropped.
    pub fn apply(&mut self, loaded: AssetLoaded) -> bool {
        let DriverState::Running(session) = &mut self.state else {
            return false;
        };
        let stored = session.grid.store_image(loaded.target, loaded.image);
        if !stored {
            trace!(slot = ?loaded.target, "dropped stale asset delivery");
        }
        stored
    }

    /// Stop the frame loop. No further state changes happen afterwards.
    pub fn teardown(&mut self) {
        if let Some(request) = self.pending_frame.take() {
            self.frames.cancel_frame(request);
        }
        if !matches!(self.state, DriverState::TornDown) {
            debug!(generation = self.generation, "driver torn down");
        }
        self.state = DriverState::TornDown;
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            DriverState::Running(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_torn_down(&self) -> bool {
        matches!(self.state, DriverState::TornDown)
    }

    pub fn pending_frame(&self) -> Option<FrameRequest> {
        self.pending_frame
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &Configuration {
        &self.cfg
    }

    pub fn frames(&self) -> &F {
        &self.frames
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::{ManualClock, ManualFrames};
    use crate::events::SlotAddress;

    fn driver(clock: &ManualClock) -> Driver<ManualClock, ManualFrames> {
        let cfg = Configuration {
            seed: Some(7),
            asset_source: "mem://{cell}/{slot}".to_string(),
            ..Configuration::default()
        };
        Driver::new(cfg, clock.clone(), ManualFrames::default()).unwrap()
    }

    fn red() -> crate::asset::ImageHandle {
        let mut pixmap = Pixmap::new(2, 2).unwrap();
        pixmap.fill(Color::from_rgba8(255, 0, 0, 255));
        Arc::new(pixmap)
    }

    #[test]
    fn frame_before_init_does_nothing() {
        let clock = ManualClock::new(0.0);
        let mut driver = driver(&clock);
        let mut target = Pixmap::new(10, 10).unwrap();
        assert!(driver.frame(&mut target).is_none());
        assert_eq!(driver.frames().requested, 0);
    }

    #[test]
    fn init_requests_every_slot_and_a_frame() {
        let clock = ManualClock::new(0.0);
        let mut driver = driver(&clock);
        let requests = driver.init(SurfaceSize::new(320, 240));
        let session = driver.session().unwrap();
        assert_eq!(requests.len(), session.geometry.cell_count() * 5);
        assert!(requests.iter().all(|r| r.target.generation == 1));
        assert!(driver.pending_frame().is_some());
    }

    #[test]
    fn frame_re_arms_the_next_frame() {
        let clock = ManualClock::new(0.0);
        let mut driver = driver(&clock);
        driver.init(SurfaceSize::new(64, 48));
        let mut target = Pixmap::new(64, 48).unwrap();
        clock.advance(16.0);
        driver.frame(&mut target).unwrap();
        assert_eq!(driver.frames().requested, 2);
        assert!(driver.pending_frame().is_some());
    }

    #[test]
    fn resize_cancels_pending_frame_and_invalidates_old_slots() {
        let clock = ManualClock::new(0.0);
        let mut driver = driver(&clock);
        let old = driver.init(SurfaceSize::new(320, 240));
        let stale = old[0].target;

        let fresh = driver.resize(SurfaceSize::new(640, 480));
        assert_eq!(driver.frames().cancelled, 1);
        assert_eq!(driver.generation(), 2);
        assert!(fresh.iter().all(|r| r.target.generation == 2));

        assert!(!driver.apply(AssetLoaded {
            target: stale,
            image: red(),
        }));
        assert!(driver.apply(AssetLoaded {
            target: fresh[0].target,
            image: red(),
        }));
    }

    #[test]
    fn resize_to_same_size_is_ignored() {
        let clock = ManualClock::new(0.0);
        let mut driver = driver(&clock);
        driver.init(SurfaceSize::new(320, 240));
        assert!(driver.resize(SurfaceSize::new(320, 240)).is_empty());
        assert_eq!(driver.generation(), 1);
    }

    #[test]
    fn teardown_stops_all_mutation() {
        let clock = ManualClock::new(0.0);
        let mut driver = driver(&clock);
        let requests = driver.init(SurfaceSize::new(64, 48));
        driver.teardown();
        assert!(driver.is_torn_down());
        assert_eq!(driver.pending_frame(), None);
        assert_eq!(driver.frames().cancelled, 1);

        assert!(!driver.apply(AssetLoaded {
            target: requests[0].target,
            image: red(),
        }));
        let mut target = Pixmap::new(64, 48).unwrap();
        assert!(driver.frame(&mut target).is_none());
        assert!(driver.init(SurfaceSize::new(64, 48)).is_empty());
        assert!(driver.resize(SurfaceSize::new(10, 10)).is_empty());
    }

    #[test]
    fn loaded_cells_paint_the_surface() {
        let clock = ManualClock::new(0.0);
        let mut driver = driver(&clock);
        let requests = driver.init(SurfaceSize::new(200, 150));
        for request in &requests {
            driver.apply(AssetLoaded {
                target: request.target,
                image: red(),
            });
        }
        // Cells that transition at this instant still show the retiring image
        // at full opacity.
        clock.set(2_000.0);
        let mut target = Pixmap::new(200, 150).unwrap();
        let stats = driver.frame(&mut target).unwrap();
        assert!(stats.layers > 0);
        let painted = target
            .pixels()
            .iter()
            .filter(|px| px.red() > 200 && px.green() < 50)
            .count();
        assert!(painted > 200 * 150 / 2, "only {painted} pixels painted");
    }

    #[test]
    fn apply_ignores_unknown_slots() {
        let clock = ManualClock::new(0.0);
        let mut driver = driver(&clock);
        driver.init(SurfaceSize::new(64, 48));
        assert!(!driver.apply(AssetLoaded {
            target: SlotAddress {
                generation: 1,
                cell: 0,
                slot: 99,
            },
            image: red(),
        }));
    }
}
