//! Metadata collaborator that enumerates the whole library.

use crate::entities::{AlbumRef, ArtistRef};

/// Library listing used by bulk loads. Calls block and run on worker
/// threads; an `Err` is logged and handled as an empty list.
pub trait LibrarySource: Send + Sync {
    fn list_albums(&self) -> Result<Vec<AlbumRef>, String>;
    fn list_artists(&self) -> Result<Vec<ArtistRef>, String>;
}
