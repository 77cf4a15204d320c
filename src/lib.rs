//! Artwork acquisition and caching for a music-library client.
//!
//! Artist and album cover art is resolved from remote providers, persisted
//! (including "looked, nothing found" markers) in a local SQLite store, and
//! fetched in bulk across a whole library by a single coordinating manager.

pub mod artwork_manager;
pub mod bulk_session;
pub mod cache_store;
pub mod config;
pub mod config_persistence;
pub mod db_manager;
pub mod entities;
pub mod image_pipeline;
pub mod library_source;
pub mod listener_registry;
pub mod network_gate;
pub mod protocol;
pub mod providers;

#[cfg(test)]
mod test_support;

pub use artwork_manager::{ArtworkHandle, ArtworkManager, ArtworkServices};
pub use cache_store::CacheStore;
pub use config::{AlbumProviderId, ArtistProviderId, ArtworkConfig, SharedArtworkConfig};
pub use entities::{
    AlbumRef, ArtistRef, EntityKey, FetchFailure, FetchOutcome, ImageLookup, TrackRef,
};
