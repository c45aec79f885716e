use thiserror::Error;

/// Failure to turn an asset identifier into a drawable image.
///
/// These never leave the loader: a failed slot simply stays empty.
#[derive(Debug, Error)]
pub enum AssetError {
    /// Remote fetch failed or returned a non-success status.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Local file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Bytes were fetched but could not be decoded.
    #[error(transparent)]
    Decode(#[from] image::ImageError),

    /// Decoded image has a zero dimension.
    #[error("decoded image is empty ({width}x{height})")]
    Empty { width: u32, height: u32 },

    /// The blocking decode task panicked or was cancelled.
    #[error("decode task failed: {0}")]
    Join(String),
}
