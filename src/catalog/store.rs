use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::models::{MediaKind, MediaRecord, Playlist, PlaylistItem};
use crate::base_system::file_cleaner::remove_file_if_exists;

const CATALOG_SCHEMA: &str = include_str!("schema.sql");

const MEDIA_COLUMNS: &str = "id, title, author, duration, size, format, type, quality, thumbnail, path, created_at, source_id";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to open catalog at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("catalog query failed: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("corrupt catalog row: {0}")]
    Corrupt(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub media: usize,
    pub playlist_items: usize,
}

/// SQLite-backed media catalog.
///
/// Every call opens its own connection and commits before returning; no
/// connection or transaction outlives a single operation.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteCatalog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            flags: OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> CatalogResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            CatalogError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| CatalogError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> CatalogResult<()> {
        let conn = self.open()?;
        conn.execute_batch(CATALOG_SCHEMA)?;
        Ok(())
    }

    pub fn insert(&self, record: &MediaRecord) -> CatalogResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO media (id, title, author, duration, size, format, type, quality, thumbnail, path, source_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.id,
                record.title,
                record.author,
                record.duration.map(|d| d as i64),
                record.size as i64,
                record.format,
                record.kind.as_str(),
                record.quality,
                record.thumbnail,
                record.path.to_string_lossy(),
                record.source_id,
            ],
        )?;
        debug!(target: "catalog", id = %record.id, "media inserted");
        Ok(())
    }

    pub fn get(&self, id: &str) -> CatalogResult<Option<MediaRecord>> {
        let conn = self.open()?;
        get_media(&conn, id)
    }

    pub fn has_path(&self, path: &Path) -> CatalogResult<bool> {
        let conn = self.open()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM media WHERE path = ?1",
                params![path.to_string_lossy()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Newest first.
    pub fn list_all(&self) -> CatalogResult<Vec<MediaRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map([], read_media_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    /// Remove the stored file, the record and its playlist memberships.
    ///
    /// Returns `Ok(false)` when the id is unknown. A file that cannot be
    /// removed is logged and does not keep the record alive.
    pub fn delete(&self, id: &str) -> CatalogResult<bool> {
        let mut conn = self.open()?;
        let Some(record) = get_media(&conn, id)? else {
            return Ok(false);
        };

        if let Err(e) = remove_file_if_exists(&record.path) {
            warn!(
                target: "catalog",
                id,
                path = %record.path.display(),
                error = %e,
                "failed to remove media file, dropping record anyway"
            );
        }

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM playlist_items WHERE media_id = ?1", params![id])?;
        tx.execute("DELETE FROM media WHERE id = ?1", params![id])?;
        tx.commit()?;
        debug!(target: "catalog", id, "media deleted");
        Ok(true)
    }

    /// Drop every media record and every playlist membership. Playlists
    /// themselves are kept.
    pub fn clear_all(&self) -> CatalogResult<ClearReport> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let playlist_items = tx.execute("DELETE FROM playlist_items", [])?;
        let media = tx.execute("DELETE FROM media", [])?;
        tx.commit()?;
        Ok(ClearReport {
            media,
            playlist_items,
        })
    }

    pub fn create_playlist(&self, name: &str, description: Option<&str>) -> CatalogResult<Playlist> {
        let conn = self.open()?;
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO playlists (id, name, description) VALUES (?1, ?2, ?3)",
            params![id, name, description],
        )?;
        get_playlist(&conn, &id)?
            .ok_or_else(|| CatalogError::Corrupt(format!("playlist {id} vanished after insert")))
    }

    /// Append `media_id` at the end of the playlist. Returns `None` when
    /// either side does not exist; re-adding an existing member keeps its
    /// position.
    pub fn add_to_playlist(
        &self,
        playlist_id: &str,
        media_id: &str,
    ) -> CatalogResult<Option<PlaylistItem>> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        if get_playlist(&tx, playlist_id)?.is_none() || get_media(&tx, media_id)?.is_none() {
            return Ok(None);
        }

        let existing: Option<i64> = tx
            .query_row(
                "SELECT position FROM playlist_items WHERE playlist_id = ?1 AND media_id = ?2",
                params![playlist_id, media_id],
                |row| row.get(0),
            )
            .optional()?;

        let position = match existing {
            Some(p) => p,
            None => {
                let next: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(position) + 1, 0) FROM playlist_items WHERE playlist_id = ?1",
                    params![playlist_id],
                    |row| row.get(0),
                )?;
                tx.execute(
                    "INSERT INTO playlist_items (playlist_id, media_id, position) VALUES (?1, ?2, ?3)",
                    params![playlist_id, media_id, next],
                )?;
                next
            }
        };
        tx.commit()?;

        Ok(Some(PlaylistItem {
            playlist_id: playlist_id.to_string(),
            media_id: media_id.to_string(),
            position,
        }))
    }

    /// Playlist plus its members in position order.
    pub fn playlist_with_items(
        &self,
        playlist_id: &str,
    ) -> CatalogResult<Option<(Playlist, Vec<MediaRecord>)>> {
        let conn = self.open()?;
        let Some(playlist) = get_playlist(&conn, playlist_id)? else {
            return Ok(None);
        };

        let cols = MEDIA_COLUMNS
            .split(", ")
            .map(|c| format!("m.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {cols} FROM playlist_items pi JOIN media m ON m.id = pi.media_id
             WHERE pi.playlist_id = ?1 ORDER BY pi.position ASC"
        ))?;
        let rows = stmt.query_map(params![playlist_id], read_media_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row??);
        }
        Ok(Some((playlist, items)))
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA foreign_keys = ON;\n\
         PRAGMA busy_timeout = 5000;\n",
    )
}

fn get_media(conn: &Connection, id: &str) -> CatalogResult<Option<MediaRecord>> {
    let row = conn
        .query_row(
            &format!("SELECT {MEDIA_COLUMNS} FROM media WHERE id = ?1"),
            params![id],
            read_media_row,
        )
        .optional()?;
    row.transpose()
}

fn get_playlist(conn: &Connection, id: &str) -> CatalogResult<Option<Playlist>> {
    Ok(conn
        .query_row(
            "SELECT id, name, description, created_at FROM playlists WHERE id = ?1",
            params![id],
            |row| {
                Ok(Playlist {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()?)
}

// Outer Result is rusqlite's; the inner one reports values the schema allows
// but the model does not.
fn read_media_row(row: &Row<'_>) -> rusqlite::Result<CatalogResult<MediaRecord>> {
    let kind_raw: String = row.get(6)?;
    let kind = match kind_raw.parse::<MediaKind>() {
        Ok(k) => k,
        Err(e) => return Ok(Err(CatalogError::Corrupt(e))),
    };
    let duration: Option<i64> = row.get(3)?;
    let size: i64 = row.get(4)?;
    let path: String = row.get(9)?;

    Ok(Ok(MediaRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        duration: duration.map(|d| d.max(0) as u64),
        size: size.max(0) as u64,
        format: row.get(5)?,
        kind,
        quality: row.get(7)?,
        thumbnail: row.get(8)?,
        path: PathBuf::from(path),
        created_at: row.get(10)?,
        source_id: row.get(11)?,
    }))
}
