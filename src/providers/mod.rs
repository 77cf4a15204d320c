//! Provider adapter abstractions and per-call provider routing.

pub mod http_transport;

use std::collections::HashMap;
use std::sync::Arc;

use log::warn;

use crate::config::{AlbumProviderId, ArtistProviderId};
use crate::entities::{AlbumRef, ArtistRef, FetchOutcome};

/// Interface implemented by concrete artist image sources.
///
/// Calls block and run on worker threads, never on the coordinating thread.
pub trait ArtistImageProvider: Send + Sync {
    fn fetch_artist_image(&self, artist: &ArtistRef) -> FetchOutcome;
}

/// Interface implemented by concrete album cover sources.
pub trait AlbumImageProvider: Send + Sync {
    fn fetch_album_image(&self, album: &AlbumRef) -> FetchOutcome;
}

/// Request machinery shared by the providers.
pub trait RequestTransport: Send + Sync {
    /// Best-effort cancellation of every outstanding request.
    fn cancel_all(&self);
}

/// Lookup table from provider ids to provider clients.
///
/// The router holds no configuration; callers pass the id read from the
/// current config on every call.
#[derive(Default, Clone)]
pub struct ProviderRouter {
    artist_providers: HashMap<ArtistProviderId, Arc<dyn ArtistImageProvider>>,
    album_providers: HashMap<AlbumProviderId, Arc<dyn AlbumImageProvider>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artist_provider(
        mut self,
        id: ArtistProviderId,
        provider: Arc<dyn ArtistImageProvider>,
    ) -> Self {
        if id.is_none() {
            warn!("Artwork router: ignoring provider registered for artist provider 'none'");
            return self;
        }
        self.artist_providers.insert(id, provider);
        self
    }

    pub fn with_album_provider(
        mut self,
        id: AlbumProviderId,
        provider: Arc<dyn AlbumImageProvider>,
    ) -> Self {
        if id.is_none() {
            warn!("Artwork router: ignoring provider registered for album provider 'none'");
            return self;
        }
        self.album_providers.insert(id, provider);
        self
    }

    /// `None` means "don't fetch": the id is `None` or has no client.
    pub fn artist_provider(&self, id: ArtistProviderId) -> Option<Arc<dyn ArtistImageProvider>> {
        if id.is_none() {
            return None;
        }
        let provider = self.artist_providers.get(&id).cloned();
        if provider.is_none() {
            warn!("Artwork router: no client registered for artist provider {id:?}");
        }
        provider
    }

    pub fn album_provider(&self, id: AlbumProviderId) -> Option<Arc<dyn AlbumImageProvider>> {
        if id.is_none() {
            return None;
        }
        let provider = self.album_providers.get(&id).cloned();
        if provider.is_none() {
            warn!("Artwork router: no client registered for album provider {id:?}");
        }
        provider
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{AlbumImageProvider, ArtistImageProvider, ProviderRouter};
    use crate::config::{AlbumProviderId, ArtistProviderId};
    use crate::entities::{AlbumRef, ArtistRef, FetchFailure, FetchOutcome};
    use crate::test_support::FakeProvider;

    #[test]
    fn test_router_dispatches_to_configured_provider() {
        let lastfm = Arc::new(FakeProvider::returning(FetchOutcome::Failed(
            FetchFailure::NotFound,
        )));
        let fanart = Arc::new(FakeProvider::with_image(vec![1]));
        let router = ProviderRouter::new()
            .with_artist_provider(ArtistProviderId::LastFm, lastfm.clone())
            .with_artist_provider(ArtistProviderId::FanartTv, fanart.clone());

        let provider = router
            .artist_provider(ArtistProviderId::FanartTv)
            .expect("fanart provider should be registered");
        let outcome = provider.fetch_artist_image(&ArtistRef::new("Low"));

        assert!(matches!(outcome, FetchOutcome::Image { .. }));
        assert_eq!(fanart.fetch_count(), 1);
        assert_eq!(lastfm.fetch_count(), 0);
    }

    #[test]
    fn test_router_returns_nothing_for_none_or_unregistered() {
        let musicbrainz = Arc::new(FakeProvider::with_image(vec![1]));
        let router = ProviderRouter::new()
            .with_album_provider(AlbumProviderId::MusicBrainz, musicbrainz.clone())
            .with_album_provider(AlbumProviderId::None, musicbrainz.clone());

        assert!(router.album_provider(AlbumProviderId::None).is_none());
        assert!(router.album_provider(AlbumProviderId::LastFm).is_none());
        assert!(router.artist_provider(ArtistProviderId::LastFm).is_none());
        let provider = router
            .album_provider(AlbumProviderId::MusicBrainz)
            .expect("musicbrainz provider should be registered");
        provider.fetch_album_image(&AlbumRef::new("Dummy", "Portishead"));
        assert_eq!(musicbrainz.fetch_count(), 1);
    }
}
