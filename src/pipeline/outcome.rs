use thiserror::Error;

use crate::{
    domain::{
        candidate::ScoredCandidate,
        track::{CacheKey, Track},
    },
    jobs::JobError,
    storage::error::StorageError,
};

/// How a sample ended up resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// found in the cache, nothing was recognized or downloaded
    Cached { track: Track, via: CacheKey },
    /// recognized and downloaded now
    Resolved(Track),
}

impl Resolution {
    pub fn track(&self) -> &Track {
        match self {
            Resolution::Cached { track, .. } | Resolution::Resolved(track) => track,
        }
    }
}

/// Answer to a free-text query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOutcome {
    Cached(Track),
    /// ranked list now pending for the session
    Choices(Vec<ScoredCandidate>),
}

/// Why a resolution produced no track. Each variant has its own user message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    #[error("sample has no usable audio")]
    NoAudio,

    #[error("recognition was inconclusive")]
    RecognitionInconclusive,

    #[error("no suitable candidate found")]
    NoCandidatesFound,

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("download did not finish in time")]
    Timeout,

    #[error("choice is no longer available")]
    ChoiceExpired,

    #[error("internal error: {0}")]
    Io(String),
}

impl Failure {
    /// Text for the end user, free of technical detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            Failure::NoAudio => "Could not extract any sound from this video.",
            Failure::RecognitionInconclusive => "Could not recognize the track.",
            Failure::NoCandidatesFound => "Could not find this track online.",
            Failure::DownloadFailed(_) => "Downloading the track failed.",
            Failure::Timeout => "The download is taking too long, please try again later.",
            Failure::ChoiceExpired => "This choice has expired, please search again.",
            Failure::Io(_) => "Something went wrong on our side.",
        }
    }
}

impl From<JobError> for Failure {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Timeout { .. } => Failure::Timeout,
            JobError::Failed(message) => Failure::DownloadFailed(message),
            other => Failure::DownloadFailed(other.to_string()),
        }
    }
}

impl From<StorageError> for Failure {
    fn from(err: StorageError) -> Self {
        Failure::Io(err.to_string())
    }
}

impl From<std::io::Error> for Failure {
    fn from(err: std::io::Error) -> Self {
        Failure::Io(err.to_string())
    }
}
