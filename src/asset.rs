//! Per-slot source identifiers and the shared image handle type.
use std::fmt;
use std::sync::Arc;

use anyhow::{Result, ensure};

const CELL_PLACEHOLDER: &str = "{cell}";
const SLOT_PLACEHOLDER: &str = "{slot}";

/// Decoded, premultiplied image ready for compositing.
pub type ImageHandle = Arc<tiny_skia::Pixmap>;

/// Source locator for one (cell, slot) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(String);

impl AssetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Template that maps a global cell index and slot index to an [`AssetId`].
///
/// The template must mention both `{cell}` and `{slot}`; every occurrence is
/// replaced, so `https://host/{cell}/{slot}.jpg` yields `https://host/7/2.jpg`
/// for cell 7, slot 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSource {
    template: String,
}

impl AssetSource {
    pub fn new(template: &str) -> Result<Self> {
        ensure!(
            template.contains(CELL_PLACEHOLDER),
            "asset source template '{template}' is missing {CELL_PLACEHOLDER}"
        );
        ensure!(
            template.contains(SLOT_PLACEHOLDER),
            "asset source template '{template}' is missing {SLOT_PLACEHOLDER}"
        );
        Ok(Self {
            template: template.to_string(),
        })
    }

    pub fn identifier(&self, cell: usize, slot: usize) -> AssetId {
        AssetId(
            self.template
                .replace(CELL_PLACEHOLDER, &cell.to_string())
                .replace(SLOT_PLACEHOLDER, &slot.to_string()),
        )
    }
}
