use std::{path::PathBuf, time::SystemTime};

use log::warn;
use rusqlite::{OptionalExtension, Row, params};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::{
    config,
    domain::{
        fingerprint::Fingerprint,
        track::{CacheKey, LookupKeys, NewTrack, Track, TrackId, TrackMetadata},
    },
    storage::{
        db::{self, system_time_to_i64},
        error::StorageError,
        schema::{columns::*, tables::*},
    },
};

/// Persistent track cache, reachable by source id, fingerprint or url.
///
/// Every key is an independent, non-unique index: the same audio can be
/// reachable through many records (aliases), each carrying different keys.
pub struct CacheStore {
    pub(crate) db: rusqlite::Connection,
}

const SELECT_TRACK: &str = "SELECT id, source_file_id, source_url, fingerprint, artist, title, \
     audio_path, origin_video_id, created_at FROM tracks";

const NEWEST_FIRST: &str = "ORDER BY created_at DESC, id DESC";

impl CacheStore {
    /// when called, opens a data base connection
    pub fn open(db_config: &config::Database) -> Result<Self, StorageError> {
        Ok(Self::from_existing_conn(db::open(db_config)?))
    }

    pub fn from_existing_conn(db: rusqlite::Connection) -> Self {
        Self { db }
    }

    fn row_to_track(row: &Row) -> rusqlite::Result<Track> {
        let fingerprint = row
            .get::<_, Option<String>>(3)?
            .and_then(|hex| match Fingerprint::from_hex(&hex) {
                Ok(fp) => Some(fp),
                Err(e) => {
                    warn!("Database table {TRACKS} contains invalid fingerprint {hex}: {e}");
                    None
                }
            });

        Ok(Track {
            id: TrackId(row.get(0)?),
            keys: LookupKeys {
                source_id: row.get(1)?,
                url: row.get(2)?,
                fingerprint,
            },
            metadata: TrackMetadata {
                artist: row.get(4)?,
                title: row.get(5)?,
            },
            audio_path: PathBuf::from(row.get::<_, String>(6)?),
            origin_video_id: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn lookup_by_column(&self, column: &str, value: &str) -> Result<Option<Track>, StorageError> {
        Ok(self
            .db
            .query_row(
                &format!("{SELECT_TRACK} WHERE {column} = ?1 {NEWEST_FIRST} LIMIT 1"),
                params![value],
                Self::row_to_track,
            )
            .optional()?)
    }

    pub fn lookup_by_source_id(&self, source_id: &str) -> Result<Option<Track>, StorageError> {
        self.lookup_by_column(SOURCE_FILE_ID, source_id)
    }

    pub fn lookup_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Track>, StorageError> {
        self.lookup_by_column(FINGERPRINT, &fingerprint.to_hex())
    }

    /// Every record carrying the fingerprint, newest first.
    pub fn lookup_all_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<Track>, StorageError> {
        let mut stmt = self
            .db
            .prepare(&format!("{SELECT_TRACK} WHERE {FINGERPRINT} = ?1 {NEWEST_FIRST}"))?;
        let tracks = stmt
            .query_map(params![fingerprint.to_hex()], Self::row_to_track)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    pub fn lookup_by_url(&self, url: &str) -> Result<Option<Track>, StorageError> {
        self.lookup_by_column(SOURCE_URL, url)
    }

    /// Tries every present key in a fixed order: source id, fingerprint, url.
    ///
    /// The order is policy: source id is the cheapest and most specific
    /// signal, so its metadata wins when several keys would match.
    pub fn lookup(&self, keys: &LookupKeys) -> Result<Option<(Track, CacheKey)>, StorageError> {
        if let Some(source_id) = &keys.source_id {
            if let Some(track) = self.lookup_by_source_id(source_id)? {
                return Ok(Some((track, CacheKey::SourceId)));
            }
        }
        if let Some(fingerprint) = &keys.fingerprint {
            if let Some(track) = self.lookup_by_fingerprint(fingerprint)? {
                return Ok(Some((track, CacheKey::Fingerprint)));
            }
        }
        if let Some(url) = &keys.url {
            if let Some(track) = self.lookup_by_url(url)? {
                return Ok(Some((track, CacheKey::Url)));
            }
        }
        Ok(None)
    }

    pub fn get(&self, id: TrackId) -> Result<Track, StorageError> {
        self.db
            .query_row(
                &format!("{SELECT_TRACK} WHERE {ID} = ?1"),
                params![id.0],
                Self::row_to_track,
            )
            .optional()?
            .ok_or(StorageError::TrackNotFound(id))
    }

    /// Inserts the record, or replaces the one holding the same natural key.
    ///
    /// The natural key is the first present of source id, url, fingerprint.
    /// A record only conflicts with rows whose own natural key is the same,
    /// so an alias keyed by source id never overwrites the record it was
    /// derived from. Last write wins.
    pub fn upsert(&mut self, track: NewTrack) -> Result<Track, StorageError> {
        let keys = &track.keys;
        let fingerprint = keys.fingerprint.as_ref().map(Fingerprint::to_hex);

        let (conflict_clause, conflict_value) = if let Some(source_id) = &keys.source_id {
            (format!("{SOURCE_FILE_ID} = ?1"), source_id.clone())
        } else if let Some(url) = &keys.url {
            (
                format!("{SOURCE_FILE_ID} IS NULL AND {SOURCE_URL} = ?1"),
                url.clone(),
            )
        } else if let Some(fingerprint) = &fingerprint {
            (
                format!("{SOURCE_FILE_ID} IS NULL AND {SOURCE_URL} IS NULL AND {FINGERPRINT} = ?1"),
                fingerprint.clone(),
            )
        } else {
            return Err(StorageError::NoLookupKey);
        };

        let now = system_time_to_i64(SystemTime::now())?;
        let tx = self.db.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                &format!("SELECT {ID} FROM {TRACKS} WHERE {conflict_clause} {NEWEST_FIRST} LIMIT 1"),
                params![conflict_value],
                |row| row.get(0),
            )
            .optional()?;

        let audio_path = track.audio_path.to_string_lossy().to_string();

        let id = match existing {
            Some(id) => {
                tx.execute(
                    &format!(
                        "UPDATE {TRACKS} SET {SOURCE_FILE_ID} = ?1, {SOURCE_URL} = ?2, \
                         {FINGERPRINT} = ?3, {ARTIST} = ?4, {TITLE} = ?5, {AUDIO_PATH} = ?6, \
                         {ORIGIN_VIDEO_ID} = ?7, {CREATED_AT} = ?8 WHERE {ID} = ?9"
                    ),
                    params![
                        keys.source_id,
                        keys.url,
                        fingerprint,
                        track.metadata.artist,
                        track.metadata.title,
                        audio_path,
                        track.origin_video_id,
                        now,
                        id,
                    ],
                )?;
                id
            }
            None => {
                tx.execute(
                    &format!(
                        "INSERT INTO {TRACKS} ({SOURCE_FILE_ID}, {SOURCE_URL}, {FINGERPRINT}, \
                         {ARTIST}, {TITLE}, {AUDIO_PATH}, {ORIGIN_VIDEO_ID}, {CREATED_AT}) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                    ),
                    params![
                        keys.source_id,
                        keys.url,
                        fingerprint,
                        track.metadata.artist,
                        track.metadata.title,
                        audio_path,
                        track.origin_video_id,
                        now,
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.commit()?;

        Ok(Track {
            id: TrackId(id),
            keys: track.keys,
            metadata: track.metadata,
            audio_path: track.audio_path,
            origin_video_id: track.origin_video_id,
            created_at: now,
        })
    }

    /// Case and diacritic insensitive substring search over titles and artists.
    ///
    /// Scans the whole table, meant as a fallback when no key matches.
    pub fn lookup_by_title_or_artist(&self, query: &str) -> Result<Option<Track>, StorageError> {
        let needle = fold(query.trim());
        if needle.is_empty() {
            return Ok(None);
        }

        let mut stmt = self.db.prepare(&format!("{SELECT_TRACK} {NEWEST_FIRST}"))?;
        let mut rows = stmt.query_map([], Self::row_to_track)?;

        rows.find_map(|track| match track {
            Ok(track)
                if fold(&track.metadata.title).contains(&needle)
                    || fold(&track.metadata.artist).contains(&needle) =>
            {
                Some(Ok(track))
            }
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
        .transpose()
        .map_err(StorageError::Database)
    }

    pub fn list_tracks(&self) -> Result<Vec<Track>, StorageError> {
        let mut stmt = self.db.prepare(&format!("{SELECT_TRACK} {NEWEST_FIRST}"))?;
        let tracks = stmt
            .query_map([], Self::row_to_track)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    /// Deletes a record. The audio file goes too once no record points at it.
    pub fn remove(&mut self, id: TrackId) -> Result<Track, StorageError> {
        let track = self.get(id)?;
        let path = track.audio_path.to_string_lossy().to_string();

        let tx = self.db.transaction()?;
        tx.execute(&format!("DELETE FROM {TRACKS} WHERE {ID} = ?1"), params![id.0])?;
        let still_referenced: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM {TRACKS} WHERE {AUDIO_PATH} = ?1"),
            params![path],
            |row| row.get(0),
        )?;
        tx.commit()?;

        if still_referenced == 0 {
            match std::fs::remove_file(&track.audio_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::Fs(e)),
            }
        }

        Ok(track)
    }
}

/// lowercase, decompose, drop combining marks: "Beyoncé" -> "beyonce"
pub fn fold(s: &str) -> String {
    s.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}
