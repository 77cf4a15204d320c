//! Fake collaborators and fixtures shared by unit tests.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use image::{ImageFormat, Rgb, RgbImage};

use crate::bulk_session::BulkLoadingProgress;
use crate::db_manager::{ArtworkStore, CacheStats, DbManager, StoreError, StoredImage};
use crate::entities::{AlbumRef, ArtistRef, FetchOutcome};
use crate::library_source::LibrarySource;
use crate::listener_registry::{AlbumImageListener, ArtistImageListener};
use crate::network_gate::{ConnectionClass, ConnectivityMonitor};
use crate::providers::{AlbumImageProvider, ArtistImageProvider, RequestTransport};

fn gradient_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

pub fn encode_test_png(width: u32, height: u32) -> Vec<u8> {
    let mut encoded = Cursor::new(Vec::new());
    gradient_image(width, height)
        .write_to(&mut encoded, ImageFormat::Png)
        .expect("test png should encode");
    encoded.into_inner()
}

pub fn encode_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut encoded = Cursor::new(Vec::new());
    gradient_image(width, height)
        .write_to(&mut encoded, ImageFormat::Jpeg)
        .expect("test jpeg should encode");
    encoded.into_inner()
}

/// Blocks callers until opened.
pub struct Gate {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    pub fn new(open: bool) -> Self {
        Self {
            open: Mutex::new(open),
            changed: Condvar::new(),
        }
    }

    pub fn open(&self) {
        *self.open.lock().expect("gate lock") = true;
        self.changed.notify_all();
    }

    pub fn wait(&self) {
        let mut open = self.open.lock().expect("gate lock");
        while !*open {
            open = self.changed.wait(open).expect("gate wait");
        }
    }
}

/// Provider for both entity kinds returning a fixed outcome.
pub struct FakeProvider {
    outcome: FetchOutcome,
    gate: Gate,
    fetches: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn returning(outcome: FetchOutcome) -> Self {
        Self {
            outcome,
            gate: Gate::new(true),
            fetches: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn with_image(bytes: Vec<u8>) -> Self {
        Self::returning(FetchOutcome::Image {
            bytes,
            source_url: "https://img.example/cover.jpg".to_string(),
        })
    }

    /// Fetches block until [`FakeProvider::release_all`].
    pub fn gated(mut self) -> Self {
        self.gate = Gate::new(false);
        self
    }

    pub fn release_all(&self) {
        self.gate.open();
    }

    /// Counted when a fetch starts, before the gate.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().expect("requested lock").clone()
    }

    fn fetch(&self, label: String) -> FetchOutcome {
        self.requested.lock().expect("requested lock").push(label);
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.gate.wait();
        self.outcome.clone()
    }
}

impl ArtistImageProvider for FakeProvider {
    fn fetch_artist_image(&self, artist: &ArtistRef) -> FetchOutcome {
        self.fetch(artist.name.clone())
    }
}

impl AlbumImageProvider for FakeProvider {
    fn fetch_album_image(&self, album: &AlbumRef) -> FetchOutcome {
        self.fetch(format!("{}|{}", album.name, album.artist_name))
    }
}

pub struct FakeLibrary {
    albums: Vec<AlbumRef>,
    artists: Vec<ArtistRef>,
    albums_gate: Gate,
    artists_gate: Gate,
    fail_artists: bool,
    album_list_calls: AtomicUsize,
}

impl Default for FakeLibrary {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl FakeLibrary {
    pub fn new(albums: Vec<AlbumRef>, artists: Vec<ArtistRef>) -> Self {
        Self {
            albums,
            artists,
            albums_gate: Gate::new(true),
            artists_gate: Gate::new(true),
            fail_artists: false,
            album_list_calls: AtomicUsize::new(0),
        }
    }

    /// Lists are held back until released one by one.
    pub fn gated(mut self) -> Self {
        self.albums_gate = Gate::new(false);
        self.artists_gate = Gate::new(false);
        self
    }

    pub fn failing_artists(mut self) -> Self {
        self.fail_artists = true;
        self
    }

    pub fn release_albums(&self) {
        self.albums_gate.open();
    }

    pub fn release_artists(&self) {
        self.artists_gate.open();
    }

    pub fn album_list_calls(&self) -> usize {
        self.album_list_calls.load(Ordering::SeqCst)
    }
}

impl LibrarySource for FakeLibrary {
    fn list_albums(&self) -> Result<Vec<AlbumRef>, String> {
        self.album_list_calls.fetch_add(1, Ordering::SeqCst);
        self.albums_gate.wait();
        Ok(self.albums.clone())
    }

    fn list_artists(&self) -> Result<Vec<ArtistRef>, String> {
        self.artists_gate.wait();
        if self.fail_artists {
            return Err("connection reset".to_string());
        }
        Ok(self.artists.clone())
    }
}

pub struct FakeConnectivity {
    class: Mutex<ConnectionClass>,
}

impl FakeConnectivity {
    pub fn new(class: ConnectionClass) -> Self {
        Self {
            class: Mutex::new(class),
        }
    }

    pub fn set_class(&self, class: ConnectionClass) {
        *self.class.lock().expect("class lock") = class;
    }
}

impl ConnectivityMonitor for FakeConnectivity {
    fn current_class(&self) -> ConnectionClass {
        *self.class.lock().expect("class lock")
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    cancels: AtomicUsize,
}

impl RecordingTransport {
    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl RequestTransport for RecordingTransport {
    fn cancel_all(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    StartAlbums(usize),
    StartArtists(usize),
    AlbumsRemaining(usize),
    ArtistsRemaining(usize),
    Finished,
}

#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn finished_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| **event == ProgressEvent::Finished)
            .count()
    }

    fn record(&self, event: ProgressEvent) {
        self.events.lock().expect("events lock").push(event);
    }
}

impl BulkLoadingProgress for RecordingProgress {
    fn start_album_loading(&self, album_count: usize) {
        self.record(ProgressEvent::StartAlbums(album_count));
    }

    fn start_artist_loading(&self, artist_count: usize) {
        self.record(ProgressEvent::StartArtists(artist_count));
    }

    fn albums_remaining(&self, remaining: usize) {
        self.record(ProgressEvent::AlbumsRemaining(remaining));
    }

    fn artists_remaining(&self, remaining: usize) {
        self.record(ProgressEvent::ArtistsRemaining(remaining));
    }

    fn finished_loading(&self) {
        self.record(ProgressEvent::Finished);
    }
}

#[derive(Default)]
pub struct RecordingListener {
    artists: Mutex<Vec<String>>,
    albums: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn artists(&self) -> Vec<String> {
        self.artists.lock().expect("artists lock").clone()
    }

    pub fn albums(&self) -> Vec<String> {
        self.albums.lock().expect("albums lock").clone()
    }
}

impl ArtistImageListener for RecordingListener {
    fn new_artist_image(&self, artist: &ArtistRef) {
        self.artists
            .lock()
            .expect("artists lock")
            .push(artist.name.clone());
    }
}

impl AlbumImageListener for RecordingListener {
    fn new_album_image(&self, album: &AlbumRef) {
        self.albums
            .lock()
            .expect("albums lock")
            .push(album.name.clone());
    }
}

/// In-memory store that counts read calls.
pub struct CountingStore {
    inner: DbManager,
    reads: AtomicUsize,
}

impl Default for CountingStore {
    fn default() -> Self {
        Self {
            inner: DbManager::open_in_memory().expect("in-memory db should open"),
            reads: AtomicUsize::new(0),
        }
    }
}

impl CountingStore {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset_reads(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }

    fn count_read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

impl ArtworkStore for CountingStore {
    fn artist_image_by_mbid(&self, mbid: &str) -> Result<Option<StoredImage>, StoreError> {
        self.count_read();
        self.inner.artist_image_by_mbid(mbid)
    }

    fn artist_image_by_name(&self, name: &str) -> Result<Option<StoredImage>, StoreError> {
        self.count_read();
        self.inner.artist_image_by_name(name)
    }

    fn album_image_by_mbid(&self, mbid: &str) -> Result<Option<StoredImage>, StoreError> {
        self.count_read();
        self.inner.album_image_by_mbid(mbid)
    }

    fn album_image_by_name_and_artist(
        &self,
        album: &str,
        artist: &str,
    ) -> Result<Option<StoredImage>, StoreError> {
        self.count_read();
        self.inner.album_image_by_name_and_artist(album, artist)
    }

    fn album_image_by_name(&self, album: &str) -> Result<Option<StoredImage>, StoreError> {
        self.count_read();
        self.inner.album_image_by_name(album)
    }

    fn put_artist_image(
        &self,
        artist: &ArtistRef,
        image: Option<&[u8]>,
    ) -> Result<(), StoreError> {
        self.inner.put_artist_image(artist, image)
    }

    fn put_album_image(&self, album: &AlbumRef, image: Option<&[u8]>) -> Result<(), StoreError> {
        self.inner.put_album_image(album, image)
    }

    fn clear(&self) -> Result<usize, StoreError> {
        self.inner.clear()
    }

    fn stats(&self) -> Result<CacheStats, StoreError> {
        self.inner.stats()
    }
}
