//! Artwork Loader using Reqwest, Tokio FS and the `image` crate

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    media::{ImageRef, ImageType},
    Artwork, ImageLoader,
};
use bytes::Bytes;
use image::ImageReader;
use reqwest::Client;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;
const BASE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// [`ImageLoader`] for desktop hosts.
///
/// - network images are fetched with `reqwest`, retrying 5xx and 429 answers
///   with exponential backoff
/// - file images are read with `tokio::fs`
/// - asset images resolve under an asset root; assets of a dependency live
///   under `packages/<package>/`
///
/// Every image is probed with the `image` crate so the surface receives its
/// dimensions and MIME type.
pub struct HttpImageLoader {
    client: Client,
    asset_root: PathBuf,
}

impl HttpImageLoader {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("media-session-core/0.1.0")
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "Falling back to the default HTTP client");
                Client::new()
            });

        Self {
            client,
            asset_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            asset_root: PathBuf::from("."),
        }
    }

    /// Directory bundled assets are resolved against.
    pub fn with_asset_root(mut self, asset_root: impl Into<PathBuf>) -> Self {
        self.asset_root = asset_root.into();
        self
    }

    fn asset_path(&self, image: &ImageRef) -> PathBuf {
        match &image.package {
            Some(package) => self
                .asset_root
                .join("packages")
                .join(package)
                .join(&image.path),
            None => self.asset_root.join(&image.path),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < MAX_ATTEMPTS {
            debug!(attempt = attempt + 1, url, "Fetching artwork");

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() || status.as_u16() == 429 {
                        warn!(status = status.as_u16(), attempt = attempt + 1, "Artwork request failed with retryable status");
                        last_error = Some(BridgeError::OperationFailed(format!("HTTP {status}")));
                    } else if !status.is_success() {
                        return Err(BridgeError::OperationFailed(format!("HTTP {status}")));
                    } else {
                        return response
                            .bytes()
                            .await
                            .map_err(|e| BridgeError::OperationFailed(e.to_string()));
                    }
                }
                Err(e) if e.is_timeout() => {
                    last_error = Some(BridgeError::OperationFailed(
                        "Request timed out".to_string(),
                    ));
                }
                Err(e) if e.is_connect() => {
                    last_error = Some(BridgeError::OperationFailed(format!(
                        "Connection failed: {e}"
                    )));
                }
                Err(e) => return Err(BridgeError::OperationFailed(e.to_string())),
            }

            attempt += 1;
            if attempt < MAX_ATTEMPTS {
                sleep(BASE_RETRY_DELAY * 2u32.pow(attempt - 1)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BridgeError::OperationFailed("All retry attempts exhausted".to_string())
        }))
    }

    async fn read_file(path: &Path) -> Result<Bytes> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Bytes::from(bytes))
    }
}

/// Probe encoded image bytes for format and dimensions.
pub fn decode_artwork(bytes: Bytes) -> Result<Artwork> {
    let reader = ImageReader::new(Cursor::new(bytes.as_ref())).with_guessed_format()?;
    let mime_type = reader.format().map(|format| format.to_mime_type().to_string());
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| BridgeError::InvalidInput(format!("Undecodable image: {e}")))?;

    Ok(Artwork {
        bytes,
        width,
        height,
        mime_type,
    })
}

impl Default for HttpImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn get_bitmap(&self, image: &ImageRef) -> Result<Artwork> {
        let bytes = match image.image_type {
            ImageType::Network => self.fetch(&image.path).await?,
            ImageType::File => Self::read_file(Path::new(&image.path)).await?,
            ImageType::Asset => Self::read_file(&self.asset_path(image)).await?,
        };
        tokio::task::spawn_blocking(move || decode_artwork(bytes))
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Artwork decode task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut encoded = Cursor::new(Vec::new());
        RgbaImage::new(width, height)
            .write_to(&mut encoded, ImageFormat::Png)
            .unwrap();
        encoded.into_inner()
    }

    #[test]
    fn test_decode_reports_dimensions_and_mime() {
        let artwork = decode_artwork(Bytes::from(png(3, 2))).unwrap();
        assert_eq!((artwork.width, artwork.height), (3, 2));
        assert_eq!(artwork.mime_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_artwork(Bytes::from_static(b"not an image")).is_err());
    }

    #[test]
    fn test_asset_paths() {
        let loader = HttpImageLoader::with_client(Client::new()).with_asset_root("/app");

        let plain = ImageRef::new(ImageType::Asset, "assets/cover.png");
        assert_eq!(loader.asset_path(&plain), PathBuf::from("/app/assets/cover.png"));

        let mut packaged = ImageRef::new(ImageType::Asset, "assets/cover.png");
        packaged.package = Some("shared_art".to_string());
        assert_eq!(
            loader.asset_path(&packaged),
            PathBuf::from("/app/packages/shared_art/assets/cover.png")
        );
    }

    #[tokio::test]
    async fn test_loads_file_and_asset_images() {
        let root = std::env::temp_dir().join(format!("artwork-test-{}", std::process::id()));
        tokio::fs::create_dir_all(root.join("assets")).await.unwrap();
        tokio::fs::write(root.join("assets/cover.png"), png(4, 4))
            .await
            .unwrap();

        let loader = HttpImageLoader::with_client(Client::new()).with_asset_root(&root);

        let asset = ImageRef::new(ImageType::Asset, "assets/cover.png");
        assert_eq!(loader.get_bitmap(&asset).await.unwrap().width, 4);

        let file = ImageRef::new(
            ImageType::File,
            root.join("assets/cover.png").to_string_lossy(),
        );
        assert_eq!(loader.get_bitmap(&file).await.unwrap().height, 4);

        tokio::fs::write(root.join("assets/broken.png"), b"not an image")
            .await
            .unwrap();
        let broken = ImageRef::new(ImageType::Asset, "assets/broken.png");
        assert!(matches!(
            loader.get_bitmap(&broken).await,
            Err(BridgeError::InvalidInput(_))
        ));

        let missing = ImageRef::new(ImageType::Asset, "assets/missing.png");
        assert!(matches!(
            loader.get_bitmap(&missing).await,
            Err(BridgeError::Io(_))
        ));

        tokio::fs::remove_dir_all(&root).await.ok();
    }
}
