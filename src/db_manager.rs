//! SQLite persistence for artwork blobs and negative markers.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::entities::{AlbumRef, ArtistRef, ImageLookup};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no user cache directory is available on this platform")]
    NoCacheDir,
    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// One persisted artwork row. Absence of a row means "never attempted".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredImage {
    Image(Vec<u8>),
    NotFound,
}

impl From<Option<StoredImage>> for ImageLookup {
    fn from(row: Option<StoredImage>) -> Self {
        match row {
            Some(StoredImage::Image(bytes)) => ImageLookup::Found(bytes),
            Some(StoredImage::NotFound) => ImageLookup::NegativeCached,
            None => ImageLookup::NotAttempted,
        }
    }
}

/// Row counts per table, split by positive and negative records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub artist_images: u64,
    pub artist_not_found: u64,
    pub album_images: u64,
    pub album_not_found: u64,
}

/// Keyed blob store used by the artwork cache. Implementations never touch
/// the network or decode images.
pub trait ArtworkStore: Send + Sync {
    fn artist_image_by_mbid(&self, mbid: &str) -> Result<Option<StoredImage>, StoreError>;
    fn artist_image_by_name(&self, name: &str) -> Result<Option<StoredImage>, StoreError>;
    fn album_image_by_mbid(&self, mbid: &str) -> Result<Option<StoredImage>, StoreError>;
    fn album_image_by_name_and_artist(
        &self,
        album: &str,
        artist: &str,
    ) -> Result<Option<StoredImage>, StoreError>;
    fn album_image_by_name(&self, album: &str) -> Result<Option<StoredImage>, StoreError>;
    /// `None` writes the negative marker. Replaces any prior row for the key.
    fn put_artist_image(&self, artist: &ArtistRef, image: Option<&[u8]>)
        -> Result<(), StoreError>;
    fn put_album_image(&self, album: &AlbumRef, image: Option<&[u8]>) -> Result<(), StoreError>;
    /// Removes every record and returns the number of deleted rows.
    fn clear(&self) -> Result<usize, StoreError>;
    fn stats(&self) -> Result<CacheStats, StoreError>;
}

pub struct DbManager {
    conn: Mutex<Connection>,
}

impl DbManager {
    /// Opens `<cache_dir>/coverkeep/artwork.db`.
    pub fn new() -> Result<Self, StoreError> {
        let data_dir = dirs::cache_dir()
            .ok_or(StoreError::NoCacheDir)?
            .join("coverkeep");
        Self::open(&data_dir.join("artwork.db"))
    }

    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let conn = Connection::open(db_path)?;
        // WAL lets another process, such as the CLI, read the file while this one
        // writes. Access within one DbManager is serialized by its mutex.
        let journal_mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(
            "Artwork db opened at {} (journal_mode={})",
            db_path.display(),
            journal_mode
        );
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let db_manager = Self {
            conn: Mutex::new(conn),
        };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS artist_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mbid TEXT,
                name TEXT NOT NULL,
                image BLOB,
                not_found INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS album_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mbid TEXT,
                name TEXT NOT NULL,
                artist_name TEXT NOT NULL,
                image BLOB,
                not_found INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_artist_images_mbid ON artist_images(mbid)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_artist_images_name ON artist_images(name)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_album_images_mbid ON album_images(mbid)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_album_images_name ON album_images(name, artist_name)",
            [],
        )?;
        Ok(())
    }

    fn query_image<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Option<StoredImage>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(sql, params, |row| {
                let image: Option<Vec<u8>> = row.get(0)?;
                let not_found: bool = row.get(1)?;
                Ok((image, not_found))
            })
            .optional()?;
        Ok(row.map(|(image, not_found)| match image {
            Some(bytes) if !not_found && !bytes.is_empty() => StoredImage::Image(bytes),
            _ => StoredImage::NotFound,
        }))
    }

    fn insert_artist_row(
        tx: &Transaction<'_>,
        mbid: Option<&str>,
        name: &str,
        image: Option<&[u8]>,
    ) -> Result<(), rusqlite::Error> {
        tx.execute(
            "INSERT INTO artist_images (mbid, name, image, not_found) VALUES (?1, ?2, ?3, ?4)",
            params![mbid, name, image, image.is_none()],
        )?;
        Ok(())
    }

    fn count(conn: &Connection, sql: &str) -> Result<u64, rusqlite::Error> {
        let value: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(u64::try_from(value).unwrap_or(0))
    }
}

impl ArtworkStore for DbManager {
    fn artist_image_by_mbid(&self, mbid: &str) -> Result<Option<StoredImage>, StoreError> {
        self.query_image(
            "SELECT image, not_found FROM artist_images WHERE mbid = ?1 ORDER BY id DESC LIMIT 1",
            params![mbid],
        )
    }

    fn artist_image_by_name(&self, name: &str) -> Result<Option<StoredImage>, StoreError> {
        // Rows written without MBID are the exact name key, so they win.
        self.query_image(
            "SELECT image, not_found FROM artist_images WHERE name = ?1
             ORDER BY mbid IS NOT NULL, id DESC LIMIT 1",
            params![name],
        )
    }

    fn album_image_by_mbid(&self, mbid: &str) -> Result<Option<StoredImage>, StoreError> {
        self.query_image(
            "SELECT image, not_found FROM album_images WHERE mbid = ?1 ORDER BY id DESC LIMIT 1",
            params![mbid],
        )
    }

    fn album_image_by_name_and_artist(
        &self,
        album: &str,
        artist: &str,
    ) -> Result<Option<StoredImage>, StoreError> {
        self.query_image(
            "SELECT image, not_found FROM album_images WHERE name = ?1 AND artist_name = ?2
             ORDER BY mbid IS NOT NULL, id DESC LIMIT 1",
            params![album, artist],
        )
    }

    fn album_image_by_name(&self, album: &str) -> Result<Option<StoredImage>, StoreError> {
        self.query_image(
            "SELECT image, not_found FROM album_images WHERE name = ?1
             ORDER BY mbid IS NOT NULL, id DESC LIMIT 1",
            params![album],
        )
    }

    fn put_artist_image(
        &self,
        artist: &ArtistRef,
        image: Option<&[u8]>,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mbids: Vec<&str> = artist.known_mbids().collect();
        if mbids.is_empty() {
            tx.execute(
                "DELETE FROM artist_images WHERE mbid IS NULL AND name = ?1",
                params![artist.name],
            )?;
            Self::insert_artist_row(&tx, None, &artist.name, image)?;
        } else {
            for mbid in mbids {
                tx.execute(
                    "DELETE FROM artist_images WHERE mbid = ?1",
                    params![mbid],
                )?;
                Self::insert_artist_row(&tx, Some(mbid), &artist.name, image)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn put_album_image(&self, album: &AlbumRef, image: Option<&[u8]>) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mbid = album.mbid.trim();
        if mbid.is_empty() {
            tx.execute(
                "DELETE FROM album_images WHERE mbid IS NULL AND name = ?1 AND artist_name = ?2",
                params![album.name, album.artist_name],
            )?;
        } else {
            tx.execute("DELETE FROM album_images WHERE mbid = ?1", params![mbid])?;
        }
        let mbid = (!mbid.is_empty()).then_some(mbid);
        tx.execute(
            "INSERT INTO album_images (mbid, name, artist_name, image, not_found)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![mbid, album.name, album.artist_name, image, image.is_none()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let artists = tx.execute("DELETE FROM artist_images", [])?;
        let albums = tx.execute("DELETE FROM album_images", [])?;
        tx.commit()?;
        Ok(artists.saturating_add(albums))
    }

    fn stats(&self) -> Result<CacheStats, StoreError> {
        let conn = self.lock();
        Ok(CacheStats {
            artist_images: Self::count(
                &conn,
                "SELECT COUNT(*) FROM artist_images WHERE not_found = 0",
            )?,
            artist_not_found: Self::count(
                &conn,
                "SELECT COUNT(*) FROM artist_images WHERE not_found = 1",
            )?,
            album_images: Self::count(
                &conn,
                "SELECT COUNT(*) FROM album_images WHERE not_found = 0",
            )?,
            album_not_found: Self::count(
                &conn,
                "SELECT COUNT(*) FROM album_images WHERE not_found = 1",
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ArtworkStore, CacheStats, DbManager, StoredImage};
    use crate::entities::{AlbumRef, ArtistRef};

    fn db() -> DbManager {
        DbManager::open_in_memory().expect("in-memory db should open")
    }

    #[test]
    fn test_missing_rows_read_as_none() {
        let db = db();
        assert_eq!(db.artist_image_by_name("Nobody").expect("query"), None);
        assert_eq!(db.album_image_by_mbid("nope").expect("query"), None);
    }

    #[test]
    fn test_negative_marker_round_trips_as_not_found() {
        let db = db();
        db.put_artist_image(&ArtistRef::new("Low"), None)
            .expect("put should succeed");
        assert_eq!(
            db.artist_image_by_name("Low").expect("query"),
            Some(StoredImage::NotFound)
        );
    }

    #[test]
    fn test_put_overwrites_previous_record_for_key() {
        let db = db();
        let album = AlbumRef::new("Dummy", "Portishead").with_mbid("m-1");
        db.put_album_image(&album, None).expect("put should succeed");
        db.put_album_image(&album, Some(&[1, 2, 3]))
            .expect("put should succeed");

        assert_eq!(
            db.album_image_by_mbid("m-1").expect("query"),
            Some(StoredImage::Image(vec![1, 2, 3]))
        );
        let stats = db.stats().expect("stats");
        assert_eq!(
            stats,
            CacheStats {
                album_images: 1,
                ..CacheStats::default()
            }
        );
    }

    #[test]
    fn test_artist_with_several_mbids_is_reachable_by_each() {
        let db = db();
        let artist = ArtistRef::new("Simon & Garfunkel")
            .with_mbid("a-1")
            .with_mbid("a-2");
        db.put_artist_image(&artist, Some(&[9]))
            .expect("put should succeed");

        assert_eq!(
            db.artist_image_by_mbid("a-2").expect("query"),
            Some(StoredImage::Image(vec![9]))
        );
        assert_eq!(
            db.artist_image_by_name("Simon & Garfunkel").expect("query"),
            Some(StoredImage::Image(vec![9]))
        );
    }

    #[test]
    fn test_album_pair_lookup_finds_mbid_keyed_row() {
        let db = db();
        db.put_album_image(
            &AlbumRef::new("Third", "Portishead").with_mbid("r-3"),
            Some(&[4, 5]),
        )
        .expect("put should succeed");

        assert_eq!(
            db.album_image_by_name_and_artist("Third", "Portishead")
                .expect("query"),
            Some(StoredImage::Image(vec![4, 5]))
        );
        assert_eq!(
            db.album_image_by_name_and_artist("Third", "Someone Else")
                .expect("query"),
            None
        );
    }

    #[test]
    fn test_clear_removes_all_rows() {
        let db = db();
        db.put_artist_image(&ArtistRef::new("Low"), Some(&[1]))
            .expect("put should succeed");
        db.put_album_image(&AlbumRef::new("Things We Lost", "Low"), None)
            .expect("put should succeed");

        assert_eq!(db.clear().expect("clear"), 2);
        assert_eq!(db.stats().expect("stats"), CacheStats::default());
    }

    #[test]
    fn test_file_backed_db_persists_between_opens() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("cache").join("artwork.db");
        {
            let db = DbManager::open(&path).expect("db should open");
            db.put_artist_image(&ArtistRef::new("Low"), Some(&[7]))
                .expect("put should succeed");
        }
        let reopened = DbManager::open(&path).expect("db should reopen");
        assert_eq!(
            reopened.artist_image_by_name("Low").expect("query"),
            Some(StoredImage::Image(vec![7]))
        );
    }

    #[test]
    fn test_file_backed_db_is_readable_from_second_connection() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("artwork.db");
        let db = DbManager::open(&path).expect("db should open");
        let journal_mode: String = db
            .lock()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .expect("journal mode should be readable");
        assert_eq!(journal_mode.to_lowercase(), "wal");

        db.put_artist_image(&ArtistRef::new("Low"), Some(&[7]))
            .expect("put should succeed");
        let other = DbManager::open(&path).expect("second handle should open");
        assert_eq!(
            other.artist_image_by_name("Low").expect("query"),
            Some(StoredImage::Image(vec![7]))
        );
    }
}
