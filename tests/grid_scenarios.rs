use std::collections::HashSet;
use std::sync::Arc;

use hex_mosaic::asset::AssetSource;
use hex_mosaic::clock::{ManualClock, ManualFrames};
use hex_mosaic::config::Configuration;
use hex_mosaic::driver::Driver;
use hex_mosaic::events::AssetLoaded;
use hex_mosaic::geometry::{Geometry, SurfaceSize, hexagon_contains};
use hex_mosaic::grid::Grid;
use hex_mosaic::scheduler::{update_cell, update_grid};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tiny_skia::{Color, Pixmap};

fn covered(geometry: &Geometry, centers: &[(f64, f64)], px: f64, py: f64) -> bool {
    let r = geometry.hex_size;
    centers.iter().any(|&(cx, cy)| {
        (px - cx).abs() <= r && (py - cy).abs() <= r && hexagon_contains(cx, cy, r, px, py)
    })
}

#[test]
fn viewport_stays_covered_while_scrolling() {
    let surface = SurfaceSize::new(1600, 900);
    for &scale in &[0.5, 1.0, 2.2, 3.0] {
        let geometry = Geometry::compute(surface, scale, 5);
        let mut rng = StdRng::seed_from_u64(5);
        let grid = Grid::build(&geometry, 2, 5_000.0, 1, 0.0, &mut rng);

        for step in 0..8 {
            let offset = geometry.total_height * f64::from(step) / 8.0 + 0.37;
            let centers: Vec<(f64, f64)> = grid
                .cells()
                .iter()
                .map(|cell| (cell.base_x, geometry.wrap_y(cell.base_y, offset)))
                .collect();

            let mut y = 0.5;
            while y < 900.0 {
                let mut x = 0.5;
                while x < 1600.0 {
                    assert!(
                        covered(&geometry, &centers, x, y),
                        "gap at ({x}, {y}) for scale {scale}, offset {offset}"
                    );
                    x += 13.0;
                }
                y += 11.0;
            }
        }
    }
}

#[test]
fn reference_layout_scrolls_one_full_cycle() {
    let geometry = Geometry::compute(SurfaceSize::new(1600, 900), 1.0, 5);
    assert!((geometry.dy - 180.0).abs() < 1e-9);
    assert_eq!(geometry.rows, 15);
    assert!((geometry.total_height - 2700.0).abs() < 1e-9);

    // Half a row per second: ten seconds moves five rows.
    assert!((geometry.scroll_offset(0.5, 10.0) - 900.0).abs() < 1e-6);

    // 360 s covers exactly twelve full cycles.
    let wrapped = geometry.scroll_offset(0.5, 360.0);
    let t = geometry.total_height;
    assert!(wrapped.min(t - wrapped) < 1e-6, "offset {wrapped}");
}

#[test]
fn every_cell_returns_to_its_start_after_one_period() {
    for &(w, h, scale, speed) in &[
        (1600, 900, 1.0, 0.5),
        (1280, 720, 1.3, 1.0),
        (800, 1200, 0.5, 0.1),
        (333, 222, 3.0, 2.0),
    ] {
        let geometry = Geometry::compute(SurfaceSize::new(w, h), scale, 5);
        let mut rng = StdRng::seed_from_u64(13);
        let grid = Grid::build(&geometry, 1, 5_000.0, 1, 0.0, &mut rng);
        let period = geometry.total_height / (geometry.dy * speed);

        let start = geometry.scroll_offset(speed, 0.0);
        let end = geometry.scroll_offset(speed, period);
        for cell in grid.cells() {
            let y0 = geometry.wrap_y(cell.base_y, start);
            let y1 = geometry.wrap_y(cell.base_y, end);
            // Float noise may land the offset just below a full period; the
            // cell then sits one band length lower.
            let drift = (y1 - y0).abs();
            let drift = drift.min((drift - geometry.total_height).abs());
            assert!(drift < 1e-6, "cell {} moved {drift} at {w}x{h}", cell.index);
        }
    }
}

#[test]
fn wrapped_positions_stay_within_the_band() {
    let geometry = Geometry::compute(SurfaceSize::new(1280, 720), 1.3, 5);
    let mut rng = StdRng::seed_from_u64(9);
    let grid = Grid::build(&geometry, 3, 4_000.0, 1, 0.0, &mut rng);
    let top = geometry.start_y;
    let bottom = geometry.start_y + geometry.total_height;
    for elapsed in [0.0, 1.5, 7.25, 33.0, 999.0] {
        let offset = geometry.scroll_offset(1.0, elapsed);
        assert!((0.0..geometry.total_height).contains(&offset));
        for cell in grid.cells() {
            let y = geometry.wrap_y(cell.base_y, offset);
            assert!(y > top - 1e-6 && y <= bottom + 1e-6, "y {y} outside band");
        }
    }
}

#[test]
fn cells_cycle_through_their_rings_independently() {
    let geometry = Geometry::compute(SurfaceSize::new(800, 600), 1.0, 5);
    let mut rng = StdRng::seed_from_u64(21);
    let mut grid = Grid::build(&geometry, 5, 1_000.0, 1, 0.0, &mut rng);

    let deadlines: Vec<f64> = grid.cells().iter().map(|c| c.next_change_at).collect();
    assert!(deadlines.iter().all(|d| (0.0..1_000.0).contains(d)));
    let distinct: HashSet<u64> = deadlines.iter().map(|d| d.to_bits()).collect();
    assert!(distinct.len() > 1, "jitter should desynchronize cells");

    // Just past the latest initial deadline every cell has fired exactly once.
    let latest = deadlines.iter().cloned().fold(0.0, f64::max);
    assert_eq!(update_grid(&mut grid, latest, &mut rng), grid.cells().len());
    assert!(grid.cells().iter().all(|c| c.current == 1));
    // Nothing is due again until at least one base interval later.
    assert_eq!(update_grid(&mut grid, latest + 999.0, &mut rng), 0);
}

#[test]
fn one_cell_returns_to_its_first_slot_after_a_full_ring() {
    let geometry = Geometry::compute(SurfaceSize::new(400, 300), 1.0, 5);
    let mut rng = StdRng::seed_from_u64(3);
    let mut grid = Grid::build(&geometry, 4, 2_000.0, 1, 0.0, &mut rng);
    let cell = &mut grid.cells_mut()[0];

    let mut seen = vec![cell.current];
    for _ in 0..4 {
        let now = cell.next_change_at;
        assert!(update_cell(cell, now, &mut rng));
        assert!(cell.next_change_at >= now + 2_000.0);
        assert!(cell.next_change_at < now + 4_000.0);
        let retired = cell.previous_slot().unwrap();
        assert_eq!(retired.fade_out_start, Some(now));
        assert_eq!(cell.current_slot().fade_in_start, now);
        seen.push(cell.current);
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 0]);
}

#[test]
fn identifiers_are_unique_per_cell_and_slot() {
    let geometry = Geometry::compute(SurfaceSize::new(1024, 768), 1.0, 5);
    let mut rng = StdRng::seed_from_u64(1);
    let grid = Grid::build(&geometry, 5, 5_000.0, 1, 0.0, &mut rng);
    let source = AssetSource::new("mem://{cell}/{slot}").unwrap();
    let requests = grid.asset_requests(&source);
    assert_eq!(requests.len(), geometry.cell_count() * 5);
    let ids: HashSet<_> = requests.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids.len(), requests.len());
}

fn share(canvas: &Pixmap, pick: impl Fn(u8, u8, u8) -> bool) -> f64 {
    let hits = canvas
        .pixels()
        .iter()
        .filter(|px| pick(px.red(), px.green(), px.blue()))
        .count();
    hits as f64 / canvas.pixels().len() as f64
}

#[test]
fn driver_swaps_images_when_cells_transition() {
    let clock = ManualClock::new(0.0);
    let cfg = Configuration {
        seed: Some(2),
        ring_size: 2,
        interval_ms: 10_000,
        transition_ms: 1,
        inner_scale: 1.0,
        asset_source: "mem://{cell}/{slot}".to_string(),
        ..Configuration::default()
    };
    let mut driver = Driver::new(cfg, clock.clone(), ManualFrames::default()).unwrap();
    let requests = driver.init(SurfaceSize::new(160, 120));

    let mut red = Pixmap::new(4, 4).unwrap();
    red.fill(Color::from_rgba8(255, 0, 0, 255));
    let mut blue = Pixmap::new(4, 4).unwrap();
    blue.fill(Color::from_rgba8(0, 0, 255, 255));
    let (red, blue) = (Arc::new(red), Arc::new(blue));
    for request in &requests {
        let image = if request.target.slot == 0 { &red } else { &blue };
        assert!(driver.apply(AssetLoaded {
            target: request.target,
            image: image.clone(),
        }));
    }

    let mut canvas = Pixmap::new(160, 120).unwrap();

    // The first slot has finished fading in; deadlines are still ahead.
    clock.set(5.0);
    driver.frame(&mut canvas).unwrap();
    let reds = share(&canvas, |r, _, b| r > 150 && b < 100);
    assert!(reds > 0.7, "red share {reds}");

    // Every initial deadline lies inside the first interval.
    clock.set(10_000.0);
    let stats = driver.frame(&mut canvas).unwrap();
    assert!(stats.transitions > 0);

    clock.set(10_002.0);
    let stats = driver.frame(&mut canvas).unwrap();
    assert_eq!(stats.transitions, 0);
    let blues = share(&canvas, |r, _, b| b > 150 && r < 100);
    assert!(blues > 0.7, "blue share {blues}");
}
