//! Library entities and artwork result types shared by all components.

/// Artist as reported by the library metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ArtistRef {
    /// MusicBrainz artist ids. Multi-artist entries may carry several.
    pub mbids: Vec<String>,
    pub name: String,
}

/// Album as reported by the library metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AlbumRef {
    /// MusicBrainz release id, empty when unknown.
    pub mbid: String,
    pub name: String,
    pub artist_name: String,
}

/// Album-related tags of a single track, used for per-track cover lookups.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackRef {
    pub album: String,
    pub album_mbid: String,
    pub album_artist: String,
    pub artist: String,
}

impl ArtistRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            mbids: Vec::new(),
            name: name.into(),
        }
    }

    pub fn with_mbid(mut self, mbid: impl Into<String>) -> Self {
        let mbid = mbid.into();
        if !mbid.trim().is_empty() {
            self.mbids.push(mbid);
        }
        self
    }

    /// Non-blank MBIDs in declaration order.
    pub fn known_mbids(&self) -> impl Iterator<Item = &str> {
        self.mbids
            .iter()
            .map(|mbid| mbid.trim())
            .filter(|mbid| !mbid.is_empty())
    }

    pub fn has_mbid(&self) -> bool {
        self.known_mbids().next().is_some()
    }

    /// An artist without MBID and name cannot be looked up or fetched.
    pub fn is_empty(&self) -> bool {
        !self.has_mbid() && self.name.trim().is_empty()
    }
}

impl AlbumRef {
    pub fn new(name: impl Into<String>, artist_name: impl Into<String>) -> Self {
        Self {
            mbid: String::new(),
            name: name.into(),
            artist_name: artist_name.into(),
        }
    }

    pub fn with_mbid(mut self, mbid: impl Into<String>) -> Self {
        self.mbid = mbid.into();
        self
    }

    pub fn has_mbid(&self) -> bool {
        !self.mbid.trim().is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_mbid() && self.name.trim().is_empty()
    }
}

impl TrackRef {
    /// Album reference derived from the track tags, as used for fetching.
    pub fn album_ref(&self) -> AlbumRef {
        AlbumRef {
            mbid: self.album_mbid.clone(),
            name: self.album.clone(),
            artist_name: self.album_artist.clone(),
        }
    }
}

/// Identity of one cached artwork record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    ArtistMbid(String),
    ArtistName(String),
    AlbumMbid(String),
    AlbumNameArtist { album: String, artist: String },
    AlbumName(String),
}

impl EntityKey {
    pub fn for_artist(artist: &ArtistRef) -> Self {
        match artist.known_mbids().next() {
            Some(mbid) => Self::ArtistMbid(mbid.to_string()),
            None => Self::ArtistName(artist.name.clone()),
        }
    }

    pub fn for_album(album: &AlbumRef) -> Self {
        if album.has_mbid() {
            Self::AlbumMbid(album.mbid.trim().to_string())
        } else if !album.artist_name.trim().is_empty() {
            Self::AlbumNameArtist {
                album: album.name.clone(),
                artist: album.artist_name.clone(),
            }
        } else {
            Self::AlbumName(album.name.clone())
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ArtistMbid(mbid) => write!(f, "artist:mbid:{mbid}"),
            Self::ArtistName(name) => write!(f, "artist:{name}"),
            Self::AlbumMbid(mbid) => write!(f, "album:mbid:{mbid}"),
            Self::AlbumNameArtist { album, artist } => write!(f, "album:{album}\u{001f}{artist}"),
            Self::AlbumName(album) => write!(f, "album:{album}"),
        }
    }
}

/// Three-state cache answer. Only `NotAttempted` should lead to a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLookup {
    Found(Vec<u8>),
    /// A fetch already ran and found nothing; do not retry implicitly.
    NegativeCached,
    NotAttempted,
}

impl ImageLookup {
    pub fn is_attempted(&self) -> bool {
        !matches!(self, Self::NotAttempted)
    }

    pub fn image_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Found(bytes) => Some(bytes),
            Self::NegativeCached | Self::NotAttempted => None,
        }
    }
}

/// Why a provider fetch produced no image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// Network, HTTP or parse error for this single entity.
    GenericError,
    /// Provider throttled us. Fatal for a bulk session.
    RateLimited,
    NotFound,
}

/// Result of one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Image { bytes: Vec<u8>, source_url: String },
    Failed(FetchFailure),
}

impl FetchOutcome {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Failed(FetchFailure::RateLimited))
    }

    /// Payload to persist; `None` means "write the negative marker".
    pub fn into_image_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Image { bytes, .. } if !bytes.is_empty() => Some(bytes),
            Self::Image { .. } | Self::Failed(_) => None,
        }
    }
}
