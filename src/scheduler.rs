//! Per-cell transition timing.
//!
//! Each cell runs its own two-phase cycle: it shows `current` until
//! `next_change_at`, then retires that slot, promotes the next one, and re-arms
//! with a jittered deadline in `[base, 2 * base)`. Cells never coordinate.
use rand::Rng;

use crate::grid::{Cell, Grid, jitter};

/// Advance `cell` if its deadline has passed. Returns whether a transition fired.
///
/// Calls before the deadline leave the cell untouched. Single-slot rings never
/// transition.
pub fn update_cell<R: Rng + ?Sized>(cell: &mut Cell, now: f64, rng: &mut R) -> bool {
    let n = cell.ring_size();
    if n < 2 || now < cell.next_change_at {
        return false;
    }

    cell.slots[cell.current].fade_out_start = Some(now);
    cell.current = (cell.current + 1) % n;
    cell.slots[cell.current].fade_in_start = now;
    cell.next_change_at = now + cell.base_interval + jitter(rng, cell.base_interval);
    true
}

/// Update every cell in order; returns how many transitioned.
pub fn update_grid<R: Rng + ?Sized>(grid: &mut Grid, now: f64, rng: &mut R) -> usize {
    grid.cells_mut()
        .iter_mut()
        .map(|cell| update_cell(cell, now, rng))
        .filter(|fired| *fired)
        .count()
}
