//! Observer sets for "new artwork stored" events.

use std::sync::{Arc, Mutex};

use log::debug;

use crate::entities::{AlbumRef, ArtistRef};

/// Called after an artist image (or its negative marker) was written.
pub trait ArtistImageListener: Send + Sync {
    fn new_artist_image(&self, artist: &ArtistRef);
}

/// Called after an album cover (or its negative marker) was written.
pub trait AlbumImageListener: Send + Sync {
    fn new_album_image(&self, album: &AlbumRef);
}

/// Listeners are compared by pointer identity, so registering the same `Arc`
/// twice keeps a single entry.
#[derive(Default)]
pub struct ListenerRegistry {
    artist_listeners: Mutex<Vec<Arc<dyn ArtistImageListener>>>,
    album_listeners: Mutex<Vec<Arc<dyn AlbumImageListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_artist_listener(&self, listener: Arc<dyn ArtistImageListener>) {
        let mut listeners = self
            .artist_listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !listeners.iter().any(|known| Arc::ptr_eq(known, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn unregister_artist_listener(&self, listener: &Arc<dyn ArtistImageListener>) {
        self.artist_listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|known| !Arc::ptr_eq(known, listener));
    }

    pub fn register_album_listener(&self, listener: Arc<dyn AlbumImageListener>) {
        let mut listeners = self
            .album_listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !listeners.iter().any(|known| Arc::ptr_eq(known, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn unregister_album_listener(&self, listener: &Arc<dyn AlbumImageListener>) {
        self.album_listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|known| !Arc::ptr_eq(known, listener));
    }

    /// Runs on the manager thread. The list is snapshotted first so a
    /// listener may unregister itself from inside the callback.
    pub fn notify_artist_image(&self, artist: &ArtistRef) {
        let listeners = self
            .artist_listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        debug!(
            "Artwork listeners: artist '{}' -> {} listener(s)",
            artist.name,
            listeners.len()
        );
        for listener in listeners {
            listener.new_artist_image(artist);
        }
    }

    pub fn notify_album_image(&self, album: &AlbumRef) {
        let listeners = self
            .album_listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        debug!(
            "Artwork listeners: album '{}' -> {} listener(s)",
            album.name,
            listeners.len()
        );
        for listener in listeners {
            listener.new_album_image(album);
        }
    }

    pub fn artist_listener_count(&self) -> usize {
        self.artist_listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn album_listener_count(&self) -> usize {
        self.album_listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{AlbumImageListener, ArtistImageListener, ListenerRegistry};
    use crate::entities::{AlbumRef, ArtistRef};
    use crate::test_support::RecordingListener;

    #[test]
    fn test_register_is_idempotent_per_listener() {
        let registry = ListenerRegistry::new();
        let listener = Arc::new(RecordingListener::default());
        let as_artist: Arc<dyn ArtistImageListener> = listener.clone();

        registry.register_artist_listener(as_artist.clone());
        registry.register_artist_listener(as_artist.clone());
        registry.notify_artist_image(&ArtistRef::new("Low"));

        assert_eq!(registry.artist_listener_count(), 1);
        assert_eq!(listener.artists(), vec!["Low".to_string()]);
    }

    #[test]
    fn test_unregister_stops_notifications() {
        let registry = ListenerRegistry::new();
        let listener = Arc::new(RecordingListener::default());
        let as_album: Arc<dyn AlbumImageListener> = listener.clone();

        registry.register_album_listener(as_album.clone());
        registry.notify_album_image(&AlbumRef::new("Dummy", "Portishead"));
        registry.unregister_album_listener(&as_album);
        registry.unregister_album_listener(&as_album);
        registry.notify_album_image(&AlbumRef::new("Third", "Portishead"));

        assert_eq!(registry.album_listener_count(), 0);
        assert_eq!(listener.albums(), vec!["Dummy".to_string()]);
    }

    #[test]
    fn test_kinds_are_notified_independently() {
        let registry = ListenerRegistry::new();
        let artist_listener = Arc::new(RecordingListener::default());
        let album_listener = Arc::new(RecordingListener::default());
        registry.register_artist_listener(artist_listener.clone());
        registry.register_album_listener(album_listener.clone());

        registry.notify_album_image(&AlbumRef::new("Dummy", "Portishead"));

        assert!(artist_listener.artists().is_empty());
        assert!(artist_listener.albums().is_empty());
        assert_eq!(album_listener.albums(), vec!["Dummy".to_string()]);
    }
}
