//! Artwork configuration model, defaults, and the shared runtime handle.

use std::sync::{Arc, RwLock};

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ArtworkConfig {
    /// Provider used for artist images.
    #[serde(default)]
    pub artist_provider: ArtistProviderId,
    /// Provider used for album covers.
    #[serde(default)]
    pub album_provider: AlbumProviderId,
    /// Suppress downloads unless connected through wifi or ethernet.
    #[serde(default = "default_true")]
    pub wifi_only: bool,
    #[serde(default = "default_max_image_edge_px")]
    pub max_image_edge_px: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// Artist image providers.
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArtistProviderId {
    None,
    #[default]
    LastFm,
    FanartTv,
}

/// Album cover providers.
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlbumProviderId {
    None,
    #[default]
    MusicBrainz,
    LastFm,
}

impl ArtistProviderId {
    pub fn is_none(self) -> bool {
        self == Self::None
    }
}

impl AlbumProviderId {
    pub fn is_none(self) -> bool {
        self == Self::None
    }
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            artist_provider: ArtistProviderId::default(),
            album_provider: AlbumProviderId::default(),
            wifi_only: default_true(),
            max_image_edge_px: default_max_image_edge_px(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_image_edge_px() -> u32 {
    500
}

fn default_jpeg_quality() -> u8 {
    80
}

/// Clamps values that would make the image pipeline misbehave.
pub fn sanitize_config(config: ArtworkConfig) -> ArtworkConfig {
    ArtworkConfig {
        max_image_edge_px: config.max_image_edge_px.max(1),
        jpeg_quality: config.jpeg_quality.clamp(1, 100),
        ..config
    }
}

/// Read side of the configuration surface. Implementations must return the
/// current values on every call so changes apply to the next operation.
pub trait ArtworkConfigSource: Send + Sync {
    fn snapshot(&self) -> ArtworkConfig;
}

/// Cloneable, thread-safe configuration holder owned by the host application.
#[derive(Debug, Clone, Default)]
pub struct SharedArtworkConfig {
    inner: Arc<RwLock<ArtworkConfig>>,
}

impl SharedArtworkConfig {
    pub fn new(config: ArtworkConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(sanitize_config(config))),
        }
    }

    pub fn replace(&self, config: ArtworkConfig) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = sanitize_config(config);
    }

    pub fn update(&self, apply: impl FnOnce(&mut ArtworkConfig)) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut guard);
        *guard = sanitize_config(guard.clone());
    }

    pub fn set_wifi_only(&self, wifi_only: bool) {
        self.update(|config| config.wifi_only = wifi_only);
    }

    pub fn set_artist_provider(&self, provider: ArtistProviderId) {
        self.update(|config| config.artist_provider = provider);
    }

    pub fn set_album_provider(&self, provider: AlbumProviderId) {
        self.update(|config| config.album_provider = provider);
    }
}

impl ArtworkConfigSource for SharedArtworkConfig {
    fn snapshot(&self) -> ArtworkConfig {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
