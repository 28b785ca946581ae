use std::{fmt::Display, path::PathBuf};

use super::fingerprint::Fingerprint;

/// Synthetic primary key of a cached track record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(pub i64);

impl Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub artist: String,
    pub title: String,
}

impl Display for TrackMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// Keys under which a sample can be found in the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupKeys {
    /// id of the original media item on the chat platform
    pub source_id: Option<String>,
    pub fingerprint: Option<Fingerprint>,
    pub url: Option<String>,
}

impl LookupKeys {
    pub fn is_empty(&self) -> bool {
        self.source_id.is_none() && self.fingerprint.is_none() && self.url.is_none()
    }
}

/// Which lookup key produced a cache hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey {
    SourceId,
    Fingerprint,
    Url,
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::SourceId => write!(f, "source id"),
            CacheKey::Fingerprint => write!(f, "fingerprint"),
            CacheKey::Url => write!(f, "url"),
        }
    }
}

/// A track record as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: TrackId,
    pub keys: LookupKeys,
    pub metadata: TrackMetadata,
    pub audio_path: PathBuf,
    /// catalog id of the video the audio was downloaded from
    pub origin_video_id: Option<String>,
    pub created_at: i64,
}

/// A track record that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrack {
    pub keys: LookupKeys,
    pub metadata: TrackMetadata,
    pub audio_path: PathBuf,
    pub origin_video_id: Option<String>,
}

impl Track {
    /// Record that links `keys` to the metadata and audio of this track.
    pub fn alias(&self, keys: LookupKeys) -> NewTrack {
        NewTrack {
            keys,
            metadata: self.metadata.clone(),
            audio_path: self.audio_path.clone(),
            origin_video_id: self.origin_video_id.clone(),
        }
    }
}
