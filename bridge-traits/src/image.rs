//! Artwork Loading
//!
//! Resolves [`ImageRef`]s into decoded artwork for the notification surface.
//! Loading is best effort: the core falls back to no artwork on any error.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{error::Result, media::ImageRef};

/// Encoded artwork plus its pixel dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    pub mime_type: Option<String>,
}

/// Host image loader.
///
/// # Platform Support
///
/// - **Android**: Glide / BitmapFactory
/// - **Apple**: UIImage / NSImage
/// - **Desktop**: `bridge-desktop::HttpImageLoader`
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn get_bitmap(&self, image: &ImageRef) -> Result<Artwork>;
}
