//! Artwork cache lookups with MBID / name fallback over an [`ArtworkStore`].

use std::sync::Arc;

use crate::db_manager::{ArtworkStore, CacheStats, StoreError};
use crate::entities::{AlbumRef, ArtistRef, ImageLookup, TrackRef};

/// Cheap to clone; every clone reads and writes the same store.
#[derive(Clone)]
pub struct CacheStore {
    store: Arc<dyn ArtworkStore>,
}

impl CacheStore {
    pub fn new(store: Arc<dyn ArtworkStore>) -> Self {
        Self { store }
    }

    /// MBID lookup when the artist has any, otherwise name lookup.
    pub fn artist_image(&self, artist: &ArtistRef) -> Result<ImageLookup, StoreError> {
        if artist.is_empty() {
            return Ok(ImageLookup::NotAttempted);
        }
        if artist.has_mbid() {
            for mbid in artist.known_mbids() {
                if let Some(row) = self.store.artist_image_by_mbid(mbid)? {
                    return Ok(Some(row).into());
                }
            }
            return Ok(ImageLookup::NotAttempted);
        }
        Ok(self.store.artist_image_by_name(&artist.name)?.into())
    }

    /// MBID, then (album, artist), then album name alone. The first row found
    /// wins, negative markers included.
    pub fn album_image(&self, album: &AlbumRef) -> Result<ImageLookup, StoreError> {
        if album.is_empty() {
            return Ok(ImageLookup::NotAttempted);
        }
        if album.has_mbid() {
            if let Some(row) = self.store.album_image_by_mbid(album.mbid.trim())? {
                return Ok(Some(row).into());
            }
        }
        if album.name.trim().is_empty() {
            return Ok(ImageLookup::NotAttempted);
        }
        if !album.artist_name.trim().is_empty() {
            if let Some(row) = self
                .store
                .album_image_by_name_and_artist(&album.name, &album.artist_name)?
            {
                return Ok(Some(row).into());
            }
        }
        Ok(self.store.album_image_by_name(&album.name)?.into())
    }

    /// Cover for a single track. Negative rows do not stop the search here,
    /// only an actual image does.
    pub fn album_image_for_track(&self, track: &TrackRef) -> Result<ImageLookup, StoreError> {
        let mut saw_negative = false;

        if !track.album_mbid.trim().is_empty() {
            let row = self.store.album_image_by_mbid(track.album_mbid.trim())?;
            if let Some(found) = settle(row.into(), &mut saw_negative) {
                return Ok(found);
            }
        }
        if !track.album.trim().is_empty() {
            for artist in [&track.album_artist, &track.artist] {
                if artist.trim().is_empty() {
                    continue;
                }
                let row = self
                    .store
                    .album_image_by_name_and_artist(&track.album, artist)?;
                if let Some(found) = settle(row.into(), &mut saw_negative) {
                    return Ok(found);
                }
            }
            let row = self.store.album_image_by_name(&track.album)?;
            if let Some(found) = settle(row.into(), &mut saw_negative) {
                return Ok(found);
            }
        }

        Ok(if saw_negative {
            ImageLookup::NegativeCached
        } else {
            ImageLookup::NotAttempted
        })
    }

    /// `None` stores the negative marker.
    pub fn put_artist_image(
        &self,
        artist: &ArtistRef,
        image: Option<&[u8]>,
    ) -> Result<(), StoreError> {
        if artist.is_empty() {
            return Ok(());
        }
        self.store.put_artist_image(artist, image)
    }

    pub fn put_album_image(&self, album: &AlbumRef, image: Option<&[u8]>) -> Result<(), StoreError> {
        if album.is_empty() {
            return Ok(());
        }
        self.store.put_album_image(album, image)
    }

    pub fn clear(&self) -> Result<usize, StoreError> {
        self.store.clear()
    }

    pub fn stats(&self) -> Result<CacheStats, StoreError> {
        self.store.stats()
    }
}

fn settle(lookup: ImageLookup, saw_negative: &mut bool) -> Option<ImageLookup> {
    match lookup {
        ImageLookup::Found(_) => Some(lookup),
        ImageLookup::NegativeCached => {
            *saw_negative = true;
            None
        }
        ImageLookup::NotAttempted => None,
    }
}
