use std::ops::RangeInclusive;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use tracing::warn;

use crate::asset::AssetSource;

/// Hexagon size multiplier relative to the visible-row baseline.
pub const OUTER_SCALE_RANGE: RangeInclusive<f64> = 0.5..=3.0;
/// Shrink applied to each hexagon (and its image) about the cell center.
pub const INNER_SCALE_RANGE: RangeInclusive<f64> = 0.5..=1.0;
/// Scroll rate in rows per second.
pub const SPEED_RANGE: RangeInclusive<f64> = 0.1..=2.0;
/// Base time between image changes, in milliseconds.
pub const INTERVAL_MS_RANGE: RangeInclusive<u64> = 1_000..=10_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Hex size multiplier (0.5 - 3.0).
    pub outer_scale: f64,
    /// Post-clip shrink factor (0.5 - 1.0).
    pub inner_scale: f64,
    /// Vertical scroll rate in rows per second (0.1 - 2.0).
    pub speed: f64,
    /// Base time between image changes in a cell, in ms (1000 - 10000).
    pub interval_ms: u64,
    /// Duration of the zoom+fade crossfade, in ms.
    pub transition_ms: u64,
    /// Number of image slots cycled by each cell.
    pub ring_size: usize,
    /// Rows of hexagons that fit the surface height at outer-scale 1.0.
    pub visible_rows: u32,
    /// Source locator template; `{cell}` and `{slot}` are substituted.
    pub asset_source: String,
    /// Clear color painted behind the cells.
    pub background: [u8; 3],
    /// Maximum number of concurrent fetches in the loader.
    pub loader_max_concurrent_fetches: usize,
    /// Optional deterministic seed for the per-cell jitter.
    pub seed: Option<u64>,
    /// Title of the viewer window.
    pub window_title: String,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Clamp the animation parameters into their documented ranges and reject
    /// settings that cannot be repaired.
    pub fn validated(mut self) -> Result<Self> {
        self.outer_scale = clamp_param("outer-scale", self.outer_scale, OUTER_SCALE_RANGE);
        self.inner_scale = clamp_param("inner-scale", self.inner_scale, INNER_SCALE_RANGE);
        self.speed = clamp_param("speed", self.speed, SPEED_RANGE);

        let interval = self
            .interval_ms
            .clamp(*INTERVAL_MS_RANGE.start(), *INTERVAL_MS_RANGE.end());
        if interval != self.interval_ms {
            warn!(
                requested = self.interval_ms,
                clamped = interval,
                "interval-ms out of range"
            );
            self.interval_ms = interval;
        }

        self.transition_ms = self.transition_ms.max(1);
        self.ring_size = self.ring_size.max(1);
        self.visible_rows = self.visible_rows.max(1);

        ensure!(
            self.loader_max_concurrent_fetches > 0,
            "loader-max-concurrent-fetches must be greater than zero"
        );
        AssetSource::new(&self.asset_source).context("invalid asset-source")?;
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            outer_scale: 1.0,
            inner_scale: 0.95,
            speed: 0.5,
            interval_ms: 5_000,
            transition_ms: 2_000,
            ring_size: 5,
            visible_rows: 5,
            asset_source: "https://picsum.photos/seed/hex-{cell}-{slot}/512/512".to_string(),
            background: [0, 0, 0],
            loader_max_concurrent_fetches: 8,
            seed: None,
            window_title: "hex-mosaic".to_string(),
        }
    }
}

/// Clamp `value` into `range`; non-finite input falls back to the lower bound.
pub fn clamp_param(name: &str, value: f64, range: RangeInclusive<f64>) -> f64 {
    let (lo, hi) = (*range.start(), *range.end());
    let clamped = if value.is_finite() { value.clamp(lo, hi) } else { lo };
    if clamped != value {
        warn!(param = name, requested = value, clamped, "parameter out of range");
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_parameters() {
        let cfg = Configuration {
            outer_scale: 9.0,
            inner_scale: 0.0,
            speed: f64::NAN,
            interval_ms: 50,
            ..Configuration::default()
        }
        .validated()
        .unwrap();
        assert_eq!(cfg.outer_scale, 3.0);
        assert_eq!(cfg.inner_scale, 0.5);
        assert_eq!(cfg.speed, 0.1);
        assert_eq!(cfg.interval_ms, 1_000);
    }

    #[test]
    fn keeps_in_range_parameters() {
        let cfg = Configuration::default().validated().unwrap();
        assert_eq!(cfg.outer_scale, 1.0);
        assert_eq!(cfg.inner_scale, 0.95);
        assert_eq!(cfg.speed, 0.5);
        assert_eq!(cfg.interval_ms, 5_000);
    }

    #[test]
    fn rejects_zero_fetch_concurrency() {
        let cfg = Configuration {
            loader_max_concurrent_fetches: 0,
            ..Configuration::default()
        };
        assert!(cfg.validated().is_err());
    }

    #[test]
    fn repairs_degenerate_counts() {
        let cfg = Configuration {
            ring_size: 0,
            visible_rows: 0,
            transition_ms: 0,
            ..Configuration::default()
        }
        .validated()
        .unwrap();
        assert_eq!(cfg.ring_size, 1);
        assert_eq!(cfg.visible_rows, 1);
        assert_eq!(cfg.transition_ms, 1);
    }
}
