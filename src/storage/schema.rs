use rusqlite::Connection;

pub mod tables {
    pub const TRACKS: &str = "tracks";

    pub const ALL_TABLES: &[&str] = &[TRACKS];
}

pub mod columns {
    pub const ID: &str = "id";
    pub const SOURCE_FILE_ID: &str = "source_file_id";
    pub const SOURCE_URL: &str = "source_url";
    pub const FINGERPRINT: &str = "fingerprint";
    pub const ARTIST: &str = "artist";
    pub const TITLE: &str = "title";
    pub const AUDIO_PATH: &str = "audio_path";
    pub const ORIGIN_VIDEO_ID: &str = "origin_video_id";
    pub const CREATED_AT: &str = "created_at";
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_file_id TEXT,
    source_url TEXT,
    fingerprint TEXT,
    artist TEXT NOT NULL,
    title TEXT NOT NULL,
    audio_path TEXT NOT NULL,
    origin_video_id TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tracks_source_file_id ON tracks(source_file_id);
CREATE INDEX IF NOT EXISTS idx_tracks_fingerprint ON tracks(fingerprint);
CREATE INDEX IF NOT EXISTS idx_tracks_source_url ON tracks(source_url);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
