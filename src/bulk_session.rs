//! State of one library-wide artwork download pass.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::entities::{AlbumRef, ArtistRef};

/// Progress observer supplied with a bulk load request. Invoked on the
/// manager thread.
pub trait BulkLoadingProgress: Send + Sync {
    fn start_album_loading(&self, album_count: usize);
    fn start_artist_loading(&self, artist_count: usize);
    fn albums_remaining(&self, remaining: usize);
    fn artists_remaining(&self, remaining: usize);
    /// Delivered at most once per session.
    fn finished_loading(&self);
}

impl fmt::Debug for dyn BulkLoadingProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BulkLoadingProgress")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for at least one of the two library lists.
    ListsRequested,
    Draining,
}

/// Pending queues, readiness flags and the in-flight item of each queue.
pub struct BulkSession {
    id: u64,
    progress: Arc<dyn BulkLoadingProgress>,
    pending_albums: VecDeque<AlbumRef>,
    pending_artists: VecDeque<ArtistRef>,
    albums_listed: bool,
    artists_listed: bool,
    current_album: Option<AlbumRef>,
    current_artist: Option<ArtistRef>,
    finished: bool,
}

impl BulkSession {
    pub fn new(id: u64, progress: Arc<dyn BulkLoadingProgress>) -> Self {
        Self {
            id,
            progress,
            pending_albums: VecDeque::new(),
            pending_artists: VecDeque::new(),
            albums_listed: false,
            artists_listed: false,
            current_album: None,
            current_artist: None,
            finished: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        if self.is_ready() {
            SessionState::Draining
        } else {
            SessionState::ListsRequested
        }
    }

    pub fn is_ready(&self) -> bool {
        self.albums_listed && self.artists_listed
    }

    /// Stores the album list. `announce` is false when the album provider is
    /// disabled and the list is only a placeholder.
    pub fn albums_arrived(&mut self, albums: Vec<AlbumRef>, announce: bool) {
        self.pending_albums = albums.into_iter().filter(|album| !album.is_empty()).collect();
        self.albums_listed = true;
        if announce {
            self.progress.start_album_loading(self.pending_albums.len());
        }
    }

    pub fn artists_arrived(&mut self, artists: Vec<ArtistRef>, announce: bool) {
        self.pending_artists = artists
            .into_iter()
            .filter(|artist| !artist.is_empty())
            .collect();
        self.artists_listed = true;
        if announce {
            self.progress.start_artist_loading(self.pending_artists.len());
        }
    }

    /// Pops the next album, marks it current and reports the remaining count.
    pub fn pop_album(&mut self) -> Option<AlbumRef> {
        let album = self.pending_albums.pop_front()?;
        self.current_album = Some(album.clone());
        self.progress.albums_remaining(self.pending_albums.len());
        Some(album)
    }

    pub fn pop_artist(&mut self) -> Option<ArtistRef> {
        let artist = self.pending_artists.pop_front()?;
        self.current_artist = Some(artist.clone());
        self.progress.artists_remaining(self.pending_artists.len());
        Some(artist)
    }

    pub fn is_current_album(&self, album: &AlbumRef) -> bool {
        self.current_album.as_ref() == Some(album)
    }

    pub fn is_current_artist(&self, artist: &ArtistRef) -> bool {
        self.current_artist.as_ref() == Some(artist)
    }

    pub fn release_album(&mut self) {
        self.current_album = None;
    }

    pub fn release_artist(&mut self) {
        self.current_artist = None;
    }

    pub fn has_album_in_flight(&self) -> bool {
        self.current_album.is_some()
    }

    pub fn has_artist_in_flight(&self) -> bool {
        self.current_artist.is_some()
    }

    /// Drops everything that has not been started yet, including the
    /// in-flight markers whose results will be discarded.
    pub fn abort(&mut self) {
        self.pending_albums.clear();
        self.pending_artists.clear();
        self.current_album = None;
        self.current_artist = None;
    }

    /// Both lists arrived, both queues are empty and nothing is in flight.
    pub fn is_drained(&self) -> bool {
        self.is_ready()
            && self.pending_albums.is_empty()
            && self.pending_artists.is_empty()
            && self.current_album.is_none()
            && self.current_artist.is_none()
    }

    /// Fires `finished_loading` the first time it is called.
    pub fn finish(&mut self) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        self.progress.finished_loading();
        true
    }

    pub fn pending_album_count(&self) -> usize {
        self.pending_albums.len()
    }

    pub fn pending_artist_count(&self) -> usize {
        self.pending_artists.len()
    }
}
