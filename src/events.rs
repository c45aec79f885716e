use crate::asset::{AssetId, ImageHandle};

/// Identifies one image slot within one grid build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotAddress {
    pub generation: u64,
    pub cell: usize,
    pub slot: usize,
}

/// Driver -> Loader: fetch `id` and deliver it to `target`.
#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub id: AssetId,
    pub target: SlotAddress,
}

/// Loader -> Driver: `image` is ready for `target`.
#[derive(Debug, Clone)]
pub struct AssetLoaded {
    pub target: SlotAddress,
    pub image: ImageHandle,
}
