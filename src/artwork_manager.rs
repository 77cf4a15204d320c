//! Artwork fetch coordination.
//!
//! `ArtworkManager` owns the bulk session, the request epoch and the
//! in-flight bookkeeping, and mutates them only from its `run()` loop.
//! Provider calls, library listing and cache writes run on worker threads
//! and report back through the manager's inbox.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, error, info, warn};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::bulk_session::{BulkLoadingProgress, BulkSession};
use crate::cache_store::CacheStore;
use crate::config::ArtworkConfigSource;
use crate::db_manager::{ArtworkStore, CacheStats, StoreError};
use crate::entities::{AlbumRef, ArtistRef, EntityKey, FetchOutcome, ImageLookup, TrackRef};
use crate::image_pipeline::ImagePostProcessor;
use crate::library_source::LibrarySource;
use crate::listener_registry::{AlbumImageListener, ArtistImageListener, ListenerRegistry};
use crate::network_gate::{ConnectionClass, ConnectivityMonitor, NetworkGate};
use crate::protocol::{ArtworkMessage, FetchOrigin};
use crate::providers::{AlbumImageProvider, ArtistImageProvider, ProviderRouter, RequestTransport};

/// Collaborators injected into the manager.
pub struct ArtworkServices {
    pub store: Arc<dyn ArtworkStore>,
    pub router: ProviderRouter,
    pub connectivity: Arc<dyn ConnectivityMonitor>,
    pub transport: Arc<dyn RequestTransport>,
    pub library: Arc<dyn LibrarySource>,
    pub config: Arc<dyn ArtworkConfigSource>,
}

/// Coordinates on-demand fetches and bulk sessions.
pub struct ArtworkManager {
    cache: CacheStore,
    router: ProviderRouter,
    connectivity: Arc<dyn ConnectivityMonitor>,
    transport: Arc<dyn RequestTransport>,
    library: Arc<dyn LibrarySource>,
    config: Arc<dyn ArtworkConfigSource>,
    listeners: Arc<ListenerRegistry>,
    sender: UnboundedSender<ArtworkMessage>,
    receiver: UnboundedReceiver<ArtworkMessage>,
    session: Option<BulkSession>,
    next_session_id: u64,
    /// Bumped on every cancel. Results of requests issued under an older
    /// epoch are dropped.
    request_epoch: Arc<AtomicU64>,
    /// Held by persist workers across their epoch check and write, and by
    /// `cancel_outstanding` while it bumps the epoch.
    persist_lock: Arc<Mutex<()>>,
    /// Keys with a fetch or write outstanding, with the epoch they were issued in.
    in_flight: HashMap<EntityKey, u64>,
}

impl ArtworkManager {
    pub fn new(services: ArtworkServices) -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            cache: CacheStore::new(services.store),
            router: services.router,
            connectivity: services.connectivity,
            transport: services.transport,
            library: services.library,
            config: services.config,
            listeners: Arc::new(ListenerRegistry::new()),
            sender,
            receiver,
            session: None,
            next_session_id: 0,
            request_epoch: Arc::new(AtomicU64::new(0)),
            persist_lock: Arc::new(Mutex::new(())),
            in_flight: HashMap::new(),
        }
    }

    /// Caller-facing handle. Clones share this manager.
    pub fn handle(&self) -> ArtworkHandle {
        ArtworkHandle {
            sender: self.sender.clone(),
            cache: self.cache.clone(),
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Starts the manager on its own thread.
    pub fn spawn(services: ArtworkServices) -> (ArtworkHandle, thread::JoinHandle<()>) {
        let mut manager = Self::new(services);
        let handle = manager.handle();
        let join_handle = thread::spawn(move || manager.run());
        (handle, join_handle)
    }

    /// Processes messages until `Shutdown` arrives.
    pub fn run(&mut self) {
        while let Some(message) = self.receiver.blocking_recv() {
            if !self.handle_message(message) {
                break;
            }
        }
        debug!("Artwork manager stopped");
    }

    /// Returns false once the manager should stop.
    fn handle_message(&mut self, message: ArtworkMessage) -> bool {
        match message {
            ArtworkMessage::FetchArtistImage(artist) => {
                self.fetch_artist_on_demand(artist);
            }
            ArtworkMessage::FetchAlbumImage(album) => {
                self.fetch_album_on_demand(album);
            }
            ArtworkMessage::BulkLoad(progress) => self.start_bulk_load(progress),
            ArtworkMessage::CancelAll => self.cancel_outstanding("cancel requested"),
            ArtworkMessage::ConnectivityChanged(class) => self.handle_connectivity_changed(class),
            ArtworkMessage::Shutdown => {
                self.cancel_outstanding("shutting down");
                return false;
            }
            ArtworkMessage::AlbumsListed { session, result } => {
                self.handle_albums_listed(session, result);
            }
            ArtworkMessage::ArtistsListed { session, result } => {
                self.handle_artists_listed(session, result);
            }
            ArtworkMessage::ArtistFetchCompleted {
                epoch,
                origin,
                artist,
                outcome,
            } => self.handle_artist_fetch_completed(epoch, origin, artist, outcome),
            ArtworkMessage::AlbumFetchCompleted {
                epoch,
                origin,
                album,
                outcome,
            } => self.handle_album_fetch_completed(epoch, origin, album, outcome),
            ArtworkMessage::ArtistImageStored {
                epoch,
                origin,
                artist,
                stored,
            } => self.handle_artist_stored(epoch, origin, artist, stored),
            ArtworkMessage::AlbumImageStored {
                epoch,
                origin,
                album,
                stored,
            } => self.handle_album_stored(epoch, origin, album, stored),
        }
        true
    }

    fn current_epoch(&self) -> u64 {
        self.request_epoch.load(Ordering::Acquire)
    }

    fn is_stale(&self, epoch: u64) -> bool {
        epoch != self.current_epoch()
    }

    fn release_in_flight(&mut self, key: &EntityKey, epoch: u64) {
        if self.in_flight.get(key) == Some(&epoch) {
            self.in_flight.remove(key);
        }
    }

    fn fetch_allowed_now(&self) -> bool {
        let config = self.config.snapshot();
        let class = self.connectivity.current_class();
        if NetworkGate::allows_fetch(&config, class) {
            return true;
        }
        debug!("Artwork: fetch suppressed, wifi-only and connection is {class:?}");
        false
    }

    /// Provider to call for `artist`, or `None` when no fetch should happen:
    /// any cache record exists, a fetch for the key is outstanding, the
    /// network gate blocks, or the provider is disabled.
    fn artist_fetch_provider(&self, artist: &ArtistRef) -> Option<Arc<dyn ArtistImageProvider>> {
        if artist.is_empty() {
            return None;
        }
        let key = EntityKey::for_artist(artist);
        if self.in_flight.contains_key(&key) {
            debug!("Artwork: fetch for {key} already in flight");
            return None;
        }
        match self.cache.artist_image(artist) {
            Ok(ImageLookup::NotAttempted) => {}
            Ok(_) => return None,
            Err(error) => {
                warn!("Artwork: cache lookup for {key} failed: {error}");
                return None;
            }
        }
        if !self.fetch_allowed_now() {
            return None;
        }
        self.router
            .artist_provider(self.config.snapshot().artist_provider)
    }

    fn album_fetch_provider(&self, album: &AlbumRef) -> Option<Arc<dyn AlbumImageProvider>> {
        if album.is_empty() {
            return None;
        }
        let key = EntityKey::for_album(album);
        if self.in_flight.contains_key(&key) {
            debug!("Artwork: fetch for {key} already in flight");
            return None;
        }
        match self.cache.album_image(album) {
            Ok(ImageLookup::NotAttempted) => {}
            Ok(_) => return None,
            Err(error) => {
                warn!("Artwork: cache lookup for {key} failed: {error}");
                return None;
            }
        }
        if !self.fetch_allowed_now() {
            return None;
        }
        self.router.album_provider(self.config.snapshot().album_provider)
    }

    fn fetch_artist_on_demand(&mut self, artist: ArtistRef) -> bool {
        let Some(provider) = self.artist_fetch_provider(&artist) else {
            return false;
        };
        self.spawn_artist_fetch(provider, artist, FetchOrigin::OnDemand);
        true
    }

    fn fetch_album_on_demand(&mut self, album: AlbumRef) -> bool {
        let Some(provider) = self.album_fetch_provider(&album) else {
            return false;
        };
        self.spawn_album_fetch(provider, album, FetchOrigin::OnDemand);
        true
    }

    fn spawn_artist_fetch(
        &mut self,
        provider: Arc<dyn ArtistImageProvider>,
        artist: ArtistRef,
        origin: FetchOrigin,
    ) {
        let epoch = self.current_epoch();
        self.in_flight.insert(EntityKey::for_artist(&artist), epoch);
        debug!("Artwork: fetching artist image for '{}'", artist.name);
        let sender = self.sender.clone();
        thread::spawn(move || {
            let outcome = provider.fetch_artist_image(&artist);
            let _ = sender.send(ArtworkMessage::ArtistFetchCompleted {
                epoch,
                origin,
                artist,
                outcome,
            });
        });
    }

    fn spawn_album_fetch(
        &mut self,
        provider: Arc<dyn AlbumImageProvider>,
        album: AlbumRef,
        origin: FetchOrigin,
    ) {
        let epoch = self.current_epoch();
        self.in_flight.insert(EntityKey::for_album(&album), epoch);
        debug!(
            "Artwork: fetching album cover for '{}' by '{}'",
            album.name, album.artist_name
        );
        let sender = self.sender.clone();
        thread::spawn(move || {
            let outcome = provider.fetch_album_image(&album);
            let _ = sender.send(ArtworkMessage::AlbumFetchCompleted {
                epoch,
                origin,
                album,
                outcome,
            });
        });
    }

    fn handle_artist_fetch_completed(
        &mut self,
        epoch: u64,
        origin: FetchOrigin,
        artist: ArtistRef,
        outcome: FetchOutcome,
    ) {
        let key = EntityKey::for_artist(&artist);
        if self.is_stale(epoch) {
            debug!("Artwork: dropping cancelled result for {key}");
            self.release_in_flight(&key, epoch);
            return;
        }
        if outcome.is_rate_limited() {
            self.release_in_flight(&key, epoch);
            warn!("Artwork: provider rate limited request for {key}");
            self.cancel_outstanding("provider rate limit");
            return;
        }
        self.spawn_artist_store(epoch, origin, artist, outcome.into_image_bytes());
    }

    fn handle_album_fetch_completed(
        &mut self,
        epoch: u64,
        origin: FetchOrigin,
        album: AlbumRef,
        outcome: FetchOutcome,
    ) {
        let key = EntityKey::for_album(&album);
        if self.is_stale(epoch) {
            debug!("Artwork: dropping cancelled result for {key}");
            self.release_in_flight(&key, epoch);
            return;
        }
        if outcome.is_rate_limited() {
            self.release_in_flight(&key, epoch);
            warn!("Artwork: provider rate limited request for {key}");
            self.cancel_outstanding("provider rate limit");
            return;
        }
        self.spawn_album_store(epoch, origin, album, outcome.into_image_bytes());
    }

    fn spawn_artist_store(
        &self,
        epoch: u64,
        origin: FetchOrigin,
        artist: ArtistRef,
        payload: Option<Vec<u8>>,
    ) {
        let cache = self.cache.clone();
        let processor = ImagePostProcessor::from_config(&self.config.snapshot());
        let request_epoch = Arc::clone(&self.request_epoch);
        let persist_lock = Arc::clone(&self.persist_lock);
        let sender = self.sender.clone();
        thread::spawn(move || {
            let stored = if request_epoch.load(Ordering::Acquire) != epoch {
                false
            } else {
                let image = processor.prepare_for_storage(payload);
                match write_if_current(&persist_lock, &request_epoch, epoch, || {
                    cache.put_artist_image(&artist, image.as_deref())
                }) {
                    Ok(stored) => stored,
                    Err(error) => {
                        error!(
                            "Artwork: failed to store image for artist '{}': {}",
                            artist.name, error
                        );
                        false
                    }
                }
            };
            let _ = sender.send(ArtworkMessage::ArtistImageStored {
                epoch,
                origin,
                artist,
                stored,
            });
        });
    }

    fn spawn_album_store(
        &self,
        epoch: u64,
        origin: FetchOrigin,
        album: AlbumRef,
        payload: Option<Vec<u8>>,
    ) {
        let cache = self.cache.clone();
        let processor = ImagePostProcessor::from_config(&self.config.snapshot());
        let request_epoch = Arc::clone(&self.request_epoch);
        let persist_lock = Arc::clone(&self.persist_lock);
        let sender = self.sender.clone();
        thread::spawn(move || {
            let stored = if request_epoch.load(Ordering::Acquire) != epoch {
                false
            } else {
                let image = processor.prepare_for_storage(payload);
                match write_if_current(&persist_lock, &request_epoch, epoch, || {
                    cache.put_album_image(&album, image.as_deref())
                }) {
                    Ok(stored) => stored,
                    Err(error) => {
                        error!(
                            "Artwork: failed to store cover for album '{}': {}",
                            album.name, error
                        );
                        false
                    }
                }
            };
            let _ = sender.send(ArtworkMessage::AlbumImageStored {
                epoch,
                origin,
                album,
                stored,
            });
        });
    }

    fn handle_artist_stored(
        &mut self,
        epoch: u64,
        origin: FetchOrigin,
        artist: ArtistRef,
        stored: bool,
    ) {
        self.release_in_flight(&EntityKey::for_artist(&artist), epoch);
        if self.is_stale(epoch) {
            return;
        }
        if stored {
            self.listeners.notify_artist_image(&artist);
        }
        let FetchOrigin::Bulk { session } = origin else {
            return;
        };
        let Some(active) = self.session.as_mut() else {
            return;
        };
        if active.id() == session && active.is_current_artist(&artist) {
            active.release_artist();
            self.drain_artists();
        }
    }

    fn handle_album_stored(&mut self, epoch: u64, origin: FetchOrigin, album: AlbumRef, stored: bool) {
        self.release_in_flight(&EntityKey::for_album(&album), epoch);
        if self.is_stale(epoch) {
            return;
        }
        if stored {
            self.listeners.notify_album_image(&album);
        }
        let FetchOrigin::Bulk { session } = origin else {
            return;
        };
        let Some(active) = self.session.as_mut() else {
            return;
        };
        if active.id() == session && active.is_current_album(&album) {
            active.release_album();
            self.drain_albums();
        }
    }

    /// Discards any previous session and requests both library lists.
    fn start_bulk_load(&mut self, progress: Arc<dyn BulkLoadingProgress>) {
        if let Some(previous) = self.session.take() {
            info!(
                "Artwork bulk: replacing session {} ({} albums, {} artists pending)",
                previous.id(),
                previous.pending_album_count(),
                previous.pending_artist_count()
            );
        }
        self.next_session_id += 1;
        let session_id = self.next_session_id;
        let config = self.config.snapshot();
        let mut session = BulkSession::new(session_id, progress);

        if config.album_provider.is_none() {
            session.albums_arrived(Vec::new(), false);
        } else {
            let library = Arc::clone(&self.library);
            let sender = self.sender.clone();
            thread::spawn(move || {
                let result = library.list_albums();
                let _ = sender.send(ArtworkMessage::AlbumsListed {
                    session: session_id,
                    result,
                });
            });
        }
        if config.artist_provider.is_none() {
            session.artists_arrived(Vec::new(), false);
        } else {
            let library = Arc::clone(&self.library);
            let sender = self.sender.clone();
            thread::spawn(move || {
                let result = library.list_artists();
                let _ = sender.send(ArtworkMessage::ArtistsListed {
                    session: session_id,
                    result,
                });
            });
        }

        info!("Artwork bulk: session {session_id} started");
        self.session = Some(session);
        self.drain_albums();
        self.drain_artists();
    }

    fn handle_albums_listed(&mut self, session_id: u64, result: Result<Vec<AlbumRef>, String>) {
        let albums = result.unwrap_or_else(|error| {
            warn!("Artwork bulk: listing albums failed: {error}");
            Vec::new()
        });
        let Some(session) = self.session.as_mut().filter(|s| s.id() == session_id) else {
            debug!("Artwork bulk: ignoring album list for inactive session {session_id}");
            return;
        };
        info!("Artwork bulk: {} albums listed", albums.len());
        session.albums_arrived(albums, true);
        self.drain_albums();
        self.drain_artists();
    }

    fn handle_artists_listed(&mut self, session_id: u64, result: Result<Vec<ArtistRef>, String>) {
        let artists = result.unwrap_or_else(|error| {
            warn!("Artwork bulk: listing artists failed: {error}");
            Vec::new()
        });
        let Some(session) = self.session.as_mut().filter(|s| s.id() == session_id) else {
            debug!("Artwork bulk: ignoring artist list for inactive session {session_id}");
            return;
        };
        info!("Artwork bulk: {} artists listed", artists.len());
        session.artists_arrived(artists, true);
        self.drain_albums();
        self.drain_artists();
    }

    /// Advances the album queue until a fetch is in flight or the queue is empty.
    fn drain_albums(&mut self) {
        loop {
            let Some(session) = self.session.as_mut() else {
                return;
            };
            if !session.is_ready() || session.has_album_in_flight() {
                return;
            }
            let session_id = session.id();
            let Some(album) = session.pop_album() else {
                break;
            };
            match self.album_fetch_provider(&album) {
                Some(provider) => {
                    self.spawn_album_fetch(provider, album, FetchOrigin::Bulk {
                        session: session_id,
                    });
                    return;
                }
                None => {
                    if let Some(session) = self.session.as_mut() {
                        session.release_album();
                    }
                }
            }
        }
        self.finish_session_if_drained();
    }

    fn drain_artists(&mut self) {
        loop {
            let Some(session) = self.session.as_mut() else {
                return;
            };
            if !session.is_ready() || session.has_artist_in_flight() {
                return;
            }
            let session_id = session.id();
            let Some(artist) = session.pop_artist() else {
                break;
            };
            match self.artist_fetch_provider(&artist) {
                Some(provider) => {
                    self.spawn_artist_fetch(provider, artist, FetchOrigin::Bulk {
                        session: session_id,
                    });
                    return;
                }
                None => {
                    if let Some(session) = self.session.as_mut() {
                        session.release_artist();
                    }
                }
            }
        }
        self.finish_session_if_drained();
    }

    fn finish_session_if_drained(&mut self) {
        if !self.session.as_ref().is_some_and(BulkSession::is_drained) {
            return;
        }
        if let Some(mut session) = self.session.take() {
            info!("Artwork bulk: session {} finished", session.id());
            session.finish();
        }
    }

    /// Cancels outstanding requests, invalidates their results and ends the
    /// active session, if any.
    fn cancel_outstanding(&mut self, reason: &str) {
        self.transport.cancel_all();
        let epoch = {
            let _guard = self
                .persist_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            self.request_epoch.fetch_add(1, Ordering::AcqRel) + 1
        };
        self.in_flight.clear();
        if let Some(mut session) = self.session.take() {
            info!(
                "Artwork bulk: aborting session {} ({}), {} albums and {} artists dropped",
                session.id(),
                reason,
                session.pending_album_count(),
                session.pending_artist_count()
            );
            session.abort();
            session.finish();
        } else {
            debug!("Artwork: requests cancelled ({reason}), epoch {epoch}");
        }
    }

    fn handle_connectivity_changed(&mut self, class: ConnectionClass) {
        let config = self.config.snapshot();
        if NetworkGate::should_cancel_on_change(&config, class) {
            info!("Artwork: connection changed to {class:?}, cancelling downloads");
            self.cancel_outstanding("connectivity change");
        }
    }
}

/// Cloneable caller-facing API of an [`ArtworkManager`].
///
/// Cache reads run on the calling thread; everything else is queued for the
/// manager. Failures degrade to "no image" and are logged.
#[derive(Clone)]
pub struct ArtworkHandle {
    sender: UnboundedSender<ArtworkMessage>,
    cache: CacheStore,
    listeners: Arc<ListenerRegistry>,
}

impl ArtworkHandle {
    fn send(&self, message: ArtworkMessage) {
        if self.sender.send(message).is_err() {
            warn!("Artwork: manager is not running, request dropped");
        }
    }

    fn lookup_or_degrade(result: Result<ImageLookup, StoreError>) -> ImageLookup {
        result.unwrap_or_else(|error| {
            warn!("Artwork: cache lookup failed: {error}");
            ImageLookup::NotAttempted
        })
    }

    pub fn artist_image(&self, artist: &ArtistRef) -> ImageLookup {
        Self::lookup_or_degrade(self.cache.artist_image(artist))
    }

    pub fn album_image(&self, album: &AlbumRef) -> ImageLookup {
        Self::lookup_or_degrade(self.cache.album_image(album))
    }

    pub fn album_image_for_track(&self, track: &TrackRef) -> ImageLookup {
        Self::lookup_or_degrade(self.cache.album_image_for_track(track))
    }

    pub fn fetch_artist_image(&self, artist: ArtistRef) {
        if artist.is_empty() {
            return;
        }
        self.send(ArtworkMessage::FetchArtistImage(artist));
    }

    pub fn fetch_album_image(&self, album: AlbumRef) {
        if album.is_empty() {
            return;
        }
        self.send(ArtworkMessage::FetchAlbumImage(album));
    }

    /// Fetches the cover of the track's album, credited to the album artist.
    pub fn fetch_album_image_for_track(&self, track: &TrackRef) {
        self.fetch_album_image(track.album_ref());
    }

    pub fn bulk_load_images(&self, progress: Arc<dyn BulkLoadingProgress>) {
        self.send(ArtworkMessage::BulkLoad(progress));
    }

    pub fn cancel_all(&self) {
        self.send(ArtworkMessage::CancelAll);
    }

    pub fn connectivity_changed(&self, class: ConnectionClass) {
        self.send(ArtworkMessage::ConnectivityChanged(class));
    }

    pub fn shutdown(&self) {
        self.send(ArtworkMessage::Shutdown);
    }

    pub fn register_artist_listener(&self, listener: Arc<dyn ArtistImageListener>) {
        self.listeners.register_artist_listener(listener);
    }

    pub fn unregister_artist_listener(&self, listener: &Arc<dyn ArtistImageListener>) {
        self.listeners.unregister_artist_listener(listener);
    }

    pub fn register_album_listener(&self, listener: Arc<dyn AlbumImageListener>) {
        self.listeners.register_album_listener(listener);
    }

    pub fn unregister_album_listener(&self, listener: &Arc<dyn AlbumImageListener>) {
        self.listeners.unregister_album_listener(listener);
    }

    /// Removes every cached image and negative marker.
    pub fn clear_cache(&self) -> Result<usize, StoreError> {
        self.cache.clear()
    }

    pub fn cache_stats(&self) -> Result<CacheStats, StoreError> {
        self.cache.stats()
    }
}

/// Runs `write` only while `epoch` is still current. No write for an older
/// epoch starts once `cancel_outstanding` has returned.
fn write_if_current(
    persist_lock: &Mutex<()>,
    request_epoch: &AtomicU64,
    epoch: u64,
    write: impl FnOnce() -> Result<(), StoreError>,
) -> Result<bool, StoreError> {
    let _guard = persist_lock
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if request_epoch.load(Ordering::Acquire) != epoch {
        return Ok(false);
    }
    write()?;
    Ok(true)
}
