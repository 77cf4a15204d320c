//! Message vocabulary of the artwork manager's inbox.
//!
//! Callers send commands through [`crate::ArtworkHandle`]; worker threads send
//! completion messages back. Only the manager thread mutates session state.

use std::sync::Arc;

use crate::bulk_session::BulkLoadingProgress;
use crate::entities::{AlbumRef, ArtistRef, FetchOutcome};
use crate::network_gate::ConnectionClass;

/// Who asked for a fetch. Only bulk fetches advance a queue, and only for
/// the session that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrigin {
    OnDemand,
    Bulk { session: u64 },
}

#[derive(Debug, Clone)]
pub enum ArtworkMessage {
    FetchArtistImage(ArtistRef),
    FetchAlbumImage(AlbumRef),
    BulkLoad(Arc<dyn BulkLoadingProgress>),
    CancelAll,
    ConnectivityChanged(ConnectionClass),
    Shutdown,

    // Worker completions.
    AlbumsListed {
        session: u64,
        result: Result<Vec<AlbumRef>, String>,
    },
    ArtistsListed {
        session: u64,
        result: Result<Vec<ArtistRef>, String>,
    },
    ArtistFetchCompleted {
        epoch: u64,
        origin: FetchOrigin,
        artist: ArtistRef,
        outcome: FetchOutcome,
    },
    AlbumFetchCompleted {
        epoch: u64,
        origin: FetchOrigin,
        album: AlbumRef,
        outcome: FetchOutcome,
    },
    /// `stored` is false when the write failed or was skipped after a cancel.
    ArtistImageStored {
        epoch: u64,
        origin: FetchOrigin,
        artist: ArtistRef,
        stored: bool,
    },
    AlbumImageStored {
        epoch: u64,
        origin: FetchOrigin,
        album: AlbumRef,
        stored: bool,
    },
}
