use serde::{Deserialize, Serialize};

/// One result of a catalog search, not yet confirmed as the wanted track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub external_id: String,
    pub url: String,
    pub title: String,
    pub uploader: String,
    pub duration_seconds: u32,
}

/// Candidate together with the score the ranker gave it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: i64,
}

impl Candidate {
    /// `m:ss` rendering of the duration, as shown in choice lists
    pub fn duration_label(&self) -> String {
        format!(
            "{}:{:02}",
            self.duration_seconds / 60,
            self.duration_seconds % 60
        )
    }
}
