use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;

use super::{ToolError, YtDlp, run_tool};
use crate::domain::candidate::Candidate;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{0}")]
    Tool(#[from] ToolError),

    #[error("unreadable search results: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Full-text search over the video catalog.
pub trait CatalogSearch: Send + Sync {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, SearchError>;
}

/// Catalog search through `yt-dlp`'s flat playlist dump.
pub struct YtDlpCatalog {
    yt_dlp: YtDlp,
}

impl YtDlpCatalog {
    pub fn new(yt_dlp: YtDlp) -> Self {
        Self { yt_dlp }
    }
}

#[derive(Debug, Deserialize)]
struct SearchDump {
    #[serde(default)]
    entries: Vec<Option<SearchEntry>>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    id: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    duration: Option<f64>,
}

impl SearchEntry {
    fn into_candidate(self) -> Option<Candidate> {
        let url = self
            .url
            .or(self.webpage_url)
            .or_else(|| self.id.as_ref().map(|id| format!("https://www.youtube.com/watch?v={id}")))?;
        Some(Candidate {
            external_id: self.id.unwrap_or_else(|| url.clone()),
            url,
            title: self.title.unwrap_or_default(),
            uploader: self.uploader.or(self.channel).unwrap_or_default(),
            duration_seconds: self
                .duration
                .filter(|d| d.is_finite() && *d > 0.0)
                .map(|d| d.round() as u32)
                .unwrap_or(0),
        })
    }
}

pub(crate) fn parse_search_dump(json: &[u8]) -> Result<Vec<Candidate>, SearchError> {
    let dump: SearchDump = serde_json::from_slice(json)?;
    Ok(dump
        .entries
        .into_iter()
        .flatten()
        .filter_map(SearchEntry::into_candidate)
        .collect())
}

impl CatalogSearch for YtDlpCatalog {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, SearchError> {
        let output = run_tool(
            self.yt_dlp
                .command()
                .args(["--flat-playlist", "--dump-single-json", "--skip-download"])
                .arg(format!("ytsearch{limit}:{query}")),
        )?;

        let candidates = parse_search_dump(&output.stdout)?;
        info!("search '{query}' returned {} results", candidates.len());
        for c in &candidates {
            debug!("  {} | {} | {}s", c.title, c.uploader, c.duration_seconds);
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_playlist_entries() {
        let json = br#"{
            "_type": "playlist",
            "id": "Daft Punk One More Time",
            "entries": [
                {
                    "_type": "url",
                    "id": "FGBhQbmPwH8",
                    "url": "https://www.youtube.com/watch?v=FGBhQbmPwH8",
                    "title": "Daft Punk - One More Time (Official Video)",
                    "uploader": "Daft Punk",
                    "duration": 320.0
                },
                {
                    "id": "abc",
                    "title": "One More Time",
                    "channel": "Daft Punk - Topic",
                    "duration": 320.6
                },
                null
            ]
        }"#;

        let found = parse_search_dump(json).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].external_id, "FGBhQbmPwH8");
        assert_eq!(found[0].duration_seconds, 320);
        assert_eq!(found[1].url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(found[1].uploader, "Daft Punk - Topic");
        assert_eq!(found[1].duration_seconds, 321);
    }

    #[test]
    fn live_streams_have_no_duration() {
        let json = br#"{"entries":[{"id":"live","title":"24/7 radio","duration":null}]}"#;
        assert_eq!(parse_search_dump(json).unwrap()[0].duration_seconds, 0);
    }

    #[test]
    fn entries_without_any_address_are_skipped() {
        let json = br#"{"entries":[{"title":"ghost"}]}"#;
        assert!(parse_search_dump(json).unwrap().is_empty());
    }

    #[test]
    fn empty_search_has_no_entries() {
        assert!(parse_search_dump(br#"{"_type":"playlist"}"#).unwrap().is_empty());
    }
}
