//!
//! src/persistent.rs  Andrew Belles  Oct 19th, 2026
//!
//! Defines the track library the resolver writes back into. Each track
//! carries its MusicBrainz recording id plus the four recording_* fields
//! filled in from a resolution
//!

use std::str::FromStr;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, sqlite::SqliteConnectOptions, Pool, Row, Sqlite};
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::errors::RecordingDateError;

/// Fields supplied when a track enters the library
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTrack {
    pub title: String,
    pub artist: Option<String>,
    pub mb_trackid: Option<String>,
    pub year: Option<i32>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub mb_trackid: Option<String>,
    pub year: Option<i32>,
    pub recording_year: Option<i32>,
    pub recording_month: Option<u32>,
    pub recording_day: Option<u32>,
    pub recording_disambiguation: Option<String>,
    pub updated_at: i64
}

impl Track {
    /// A zero year is what an empty tag reads back as
    pub fn has_recording_year(&self) -> bool {
        self.recording_year.is_some_and(|y| y != 0)
    }

    /// Nullable columns decode as Option so NULL never reads back as 0 or ""
    fn from_row(r: &SqliteRow) -> Result<Self, RecordingDateError> {
        Ok( Track {
            id: r.try_get("id")?,
            title: r.try_get("title")?,
            artist: r.try_get::<Option<String>, _>("artist")?,
            mb_trackid: r.try_get::<Option<String>, _>("mb_trackid")?
                .filter(|s| !s.is_empty()),
            year: r.try_get::<Option<i32>, _>("year")?,
            recording_year: r.try_get::<Option<i32>, _>("recording_year")?,
            recording_month: r.try_get::<Option<i64>, _>("recording_month")?
                .map(|m| m as u32),
            recording_day: r.try_get::<Option<i64>, _>("recording_day")?
                .map(|d| d as u32),
            recording_disambiguation:
                r.try_get::<Option<String>, _>("recording_disambiguation")?,
            updated_at: r.try_get("updated_at")?
        } )
    }
}

/// Resolver output to store; only the fields that are Some are written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingFields {
    pub recording_year: Option<i32>,
    pub recording_month: Option<u32>,
    pub recording_day: Option<u32>,
    pub recording_disambiguation: Option<String>
}

const TRACK_COLUMNS: &str = r"
    id, title, artist, mb_trackid, year, recording_year, recording_month,
    recording_day, recording_disambiguation, updated_at";

pub struct Persistent {
    pool: Pool<Sqlite>
}

impl Persistent {

    async fn ensure_schema(pool: &Pool<Sqlite>) -> Result<(), RecordingDateError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS tracks (
              id                        TEXT PRIMARY KEY,
              title                     TEXT NOT NULL,
              artist                    TEXT,
              mb_trackid                TEXT,
              year                      INTEGER,
              recording_year            INTEGER,
              recording_month           INTEGER,
              recording_day             INTEGER,
              recording_disambiguation  TEXT,
              created_at                INTEGER NOT NULL,
              updated_at                INTEGER NOT NULL
            );
            "
        ).execute(pool).await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tracks_mbid ON tracks(mb_trackid);"
        ).execute(pool).await?;

        Ok(())
    }

    pub async fn init(database_url: &str) -> Result<Self, RecordingDateError> {
        let is_memory = database_url == "sqlite::memory:";

        let mut opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true);

        // WAL is file-only
        if !is_memory {
            opts = opts.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                       .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        }

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(if is_memory {1} else {4})
            .connect_with(opts)
            .await?;

        Self::ensure_schema(&pool).await?;

        Ok(Self { pool })
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    pub async fn insert_track(&self, track: &NewTrack) -> Result<String, RecordingDateError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r"
            INSERT INTO tracks (
                id, title, artist, mb_trackid, year, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6);
            "
        )
        .bind(&id)
        .bind(&track.title)
        .bind(track.artist.as_ref())
        .bind(track.mb_trackid.as_ref())
        .bind(track.year)
        .bind(Self::now())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn get_track(&self, track_id: &str) ->
        Result<Option<Track>, RecordingDateError> {
        let row = sqlx::query(
            &format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?1;")
        )
        .bind(track_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Track::from_row).transpose()
    }

    /// Tracks whose title, artist or recording id contains `query`;
    /// every track when no query is given
    pub async fn query_tracks(&self, query: Option<&str>) ->
        Result<Vec<Track>, RecordingDateError> {
        let rows = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let pattern = format!("%{q}%");
                sqlx::query(&format!(
                    r"
                    SELECT {TRACK_COLUMNS} FROM tracks
                     WHERE title LIKE ?1 OR artist LIKE ?1 OR mb_trackid LIKE ?1
                     ORDER BY created_at ASC, rowid ASC;
                    "
                ))
                .bind(pattern)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {TRACK_COLUMNS} FROM tracks ORDER BY created_at ASC, rowid ASC;"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(Track::from_row).collect()
    }

    /// Writes the present recording_* fields, leaving the rest untouched
    pub async fn store_recording_fields(&self, track_id: &str, fields: &RecordingFields) ->
        Result<(), RecordingDateError> {
        let updated = sqlx::query(
            r"
            UPDATE tracks
               SET recording_year = COALESCE(?1, recording_year),
                   recording_month = COALESCE(?2, recording_month),
                   recording_day = COALESCE(?3, recording_day),
                   recording_disambiguation = COALESCE(?4, recording_disambiguation),
                   updated_at = ?5
             WHERE id = ?6;
            "
        )
        .bind(fields.recording_year)
        .bind(fields.recording_month.map(i64::from))
        .bind(fields.recording_day.map(i64::from))
        .bind(fields.recording_disambiguation.as_ref())
        .bind(Self::now())
        .bind(track_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(RecordingDateError::Db(format!("no track {track_id}")));
        }
        Ok(())
    }

    pub async fn set_year(&self, track_id: &str, year: i32) -> Result<(), RecordingDateError> {
        sqlx::query(
            "UPDATE tracks SET year = ?1, updated_at = ?2 WHERE id = ?3;"
        )
        .bind(year)
        .bind(Self::now())
        .bind(track_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
