use rand::Rng;
use tracing::trace;

use crate::asset::{AssetSource, ImageHandle};
use crate::events::{AssetRequest, SlotAddress};
use crate::geometry::Geometry;

/// One entry in a cell's ring of images.
#[derive(Debug, Clone)]
pub struct ImageSlot {
    /// Resolved image; `None` until the loader delivers it (possibly never).
    pub image: Option<ImageHandle>,
    /// When this slot last became the incoming image (ms).
    pub fade_in_start: f64,
    /// When this slot last retired; `None` until its first retirement.
    pub fade_out_start: Option<f64>,
}

impl ImageSlot {
    fn new(now: f64) -> Self {
        Self {
            image: None,
            fade_in_start: now,
            fade_out_start: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cell {
    /// Global index used to derive asset identifiers.
    pub index: usize,
    pub column: usize,
    pub row: usize,
    /// Unscrolled center.
    pub base_x: f64,
    pub base_y: f64,
    pub slots: Vec<ImageSlot>,
    pub current: usize,
    /// Absolute time (ms) of the next image change.
    pub next_change_at: f64,
    pub base_interval: f64,
}

impl Cell {
    pub fn new<R: Rng + ?Sized>(
        index: usize,
        (column, row): (usize, usize),
        (base_x, base_y): (f64, f64),
        ring_size: usize,
        base_interval: f64,
        now: f64,
        rng: &mut R,
    ) -> Self {
        let ring_size = ring_size.max(1);
        Self {
            index,
            column,
            row,
            base_x,
            base_y,
            slots: (0..ring_size).map(|_| ImageSlot::new(now)).collect(),
            current: 0,
            next_change_at: now + jitter(rng, base_interval),
            base_interval,
        }
    }

    pub fn ring_size(&self) -> usize {
        self.slots.len()
    }

    pub fn current_slot(&self) -> &ImageSlot {
        &self.slots[self.current]
    }

    /// Index of the most recently retired slot; `None` for a single-slot ring.
    pub fn previous_index(&self) -> Option<usize> {
        let n = self.ring_size();
        (n >= 2).then(|| (self.current + n - 1) % n)
    }

    pub fn previous_slot(&self) -> Option<&ImageSlot> {
        self.previous_index().map(|idx| &self.slots[idx])
    }
}

/// Uniform sample in `[0, span)`, or 0 for an empty span.
pub fn jitter<R: Rng + ?Sized>(rng: &mut R, span: f64) -> f64 {
    if span.is_finite() && span > 0.0 {
        rng.random_range(0.0..span)
    } else {
        0.0
    }
}

/// All cells of one grid build.
#[derive(Debug, Clone)]
pub struct Grid {
    generation: u64,
    cells: Vec<Cell>,
}

impl Grid {
    /// Build one cell per grid position, column-major, with global index
    /// `column * rows + row`.
    pub fn build<R: Rng + ?Sized>(
        geometry: &Geometry,
        ring_size: usize,
        base_interval: f64,
        generation: u64,
        now: f64,
        rng: &mut R,
    ) -> Self {
        let mut cells = Vec::with_capacity(geometry.cell_count());
        for column in 0..geometry.columns {
            for row in 0..geometry.rows {
                let index = column * geometry.rows + row;
                cells.push(Cell::new(
                    index,
                    (column, row),
                    geometry.cell_origin(column, row),
                    ring_size,
                    base_interval,
                    now,
                    rng,
                ));
            }
        }
        trace!(generation, cells = cells.len(), "grid built");
        Self { generation, cells }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// One request per slot of every cell.
    pub fn asset_requests(&self, source: &AssetSource) -> Vec<AssetRequest> {
        self.cells
            .iter()
            .flat_map(|cell| {
                (0..cell.ring_size()).map(move |slot| AssetRequest {
                    id: source.identifier(cell.index, slot),
                    target: SlotAddress {
                        generation: self.generation,
                        cell: cell.index,
                        slot,
                    },
                })
            })
            .collect()
    }

    /// Store `image` into the addressed slot. Returns false (and leaves the
    /// grid untouched) when the address belongs to another build or is out of
    /// bounds.
    pub fn store_image(&mut self, target: SlotAddress, image: ImageHandle) -> bool {
        if target.generation != self.generation {
            return false;
        }
        let Some(cell) = self.cells.get_mut(target.cell) else {
            return false;
        };
        let Some(slot) = cell.slots.get_mut(target.slot) else {
            return false;
        };
        slot.image = Some(image);
        true
    }
}
