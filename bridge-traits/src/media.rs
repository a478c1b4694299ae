//! Media Source Descriptors
//!
//! Typed descriptors for what a session plays and what it shows on the
//! notification surface. The channel layer validates raw arguments into these
//! before anything reaches the core.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::BridgeError;

/// Origin of an audio source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AudioType {
    /// Progressive or adaptive stream over HTTP(S)
    Network,
    /// Unbounded stream; duration is reported as 0
    LiveStream,
    /// Absolute path on the device file system
    File,
    /// Asset bundled with the host application
    Asset,
}

impl AudioType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioType::Network => "network",
            AudioType::LiveStream => "liveStream",
            AudioType::File => "file",
            AudioType::Asset => "asset",
        }
    }

    /// Whether the source is fetched over the network.
    pub fn is_remote(&self) -> bool {
        matches!(self, AudioType::Network | AudioType::LiveStream)
    }
}

impl fmt::Display for AudioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioType {
    type Err = BridgeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "network" => Ok(AudioType::Network),
            "liveStream" => Ok(AudioType::LiveStream),
            "file" => Ok(AudioType::File),
            "asset" => Ok(AudioType::Asset),
            other => Err(BridgeError::InvalidInput(format!(
                "unknown audio type '{other}'"
            ))),
        }
    }
}

/// A source to open on an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    pub audio_type: AudioType,
    /// URL, file path or asset key depending on `audio_type`
    pub path: String,
    /// Package owning the asset, for assets shipped by a dependency
    pub package: Option<String>,
    /// Extra request headers for network sources
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl MediaSource {
    pub fn new(audio_type: AudioType, path: impl Into<String>) -> Self {
        Self {
            audio_type,
            path: path.into(),
            package: None,
            headers: HashMap::new(),
        }
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Origin of a notification artwork image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageType {
    Network,
    File,
    Asset,
}

/// Reference to an artwork image, resolved by an [`ImageLoader`](crate::image::ImageLoader).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub image_type: ImageType,
    pub path: String,
    pub package: Option<String>,
}

impl ImageRef {
    pub fn new(image_type: ImageType, path: impl Into<String>) -> Self {
        Self {
            image_type,
            path: path.into(),
            package: None,
        }
    }
}

/// Display metadata for the current track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioMetas {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub image: Option<ImageRef>,
    /// Opaque id handed back when the user selects the notification
    pub track_id: Option<String>,
}

impl AudioMetas {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.artist.is_none()
            && self.album.is_none()
            && self.image.is_none()
            && self.track_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_type_parsing() {
        assert_eq!("liveStream".parse::<AudioType>().unwrap(), AudioType::LiveStream);
        assert_eq!("asset".parse::<AudioType>().unwrap(), AudioType::Asset);
        assert!("podcast".parse::<AudioType>().is_err());
    }

    #[test]
    fn test_audio_type_serde_matches_wire_names() {
        let json = serde_json::to_string(&AudioType::LiveStream).unwrap();
        assert_eq!(json, "\"liveStream\"");
        assert!(AudioType::LiveStream.is_remote());
        assert!(!AudioType::File.is_remote());
    }

    #[test]
    fn test_media_source_builder() {
        let source = MediaSource::new(AudioType::Network, "https://example.com/a.mp3")
            .with_header("Authorization", "Bearer abc");

        assert_eq!(source.headers.len(), 1);
        assert!(source.package.is_none());
    }
}
