use std::{path::Path, time::Duration, time::Instant};

use base64::{Engine, engine::general_purpose::STANDARD};
use log::{info, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    config::RecognizerConfig,
    domain::track::TrackMetadata,
    http_client::{self, RetryConfig},
};

/// Snippets are small, anything beyond this is not a snippet.
const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
const MAX_ANSWER_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    pub metadata: TrackMetadata,
    /// length of the recognized song in seconds, when the service knows it
    pub duration_hint: Option<u32>,
}

#[derive(Debug, Error)]
pub enum RecognizeError {
    #[error("recognizer is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("snippet is too large to upload ({0} bytes)")]
    TooLarge(u64),

    #[error("recognition request failed: {0}")]
    Http(String),

    #[error("unreadable recognizer answer: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identifies the song playing in an audio snippet.
pub trait Recognizer: Send + Sync {
    /// `Ok(None)` when the service answered but did not know the song.
    fn recognize(&self, snippet: &Path) -> Result<Option<Recognition>, RecognizeError>;
}

/// Client of the AudD recognition API.
pub struct AuddRecognizer {
    api_url: String,
    api_token: Option<String>,
    agent: ureq::Agent,
}

impl AuddRecognizer {
    pub fn new(config: &RecognizerConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            api_token: config.api_token.clone(),
            agent: http_client::agent_with_timeout(Duration::from_secs(config.timeout_secs)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuddAnswer {
    status: String,
    result: Option<AuddResult>,
}

#[derive(Debug, Deserialize)]
struct AuddResult {
    artist: Option<String>,
    title: Option<String>,
    spotify: Option<SpotifyInfo>,
    apple_music: Option<AppleMusicInfo>,
}

#[derive(Debug, Deserialize)]
struct SpotifyInfo {
    duration_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppleMusicInfo {
    duration_in_millis: Option<u64>,
}

fn parse_answer(bytes: &[u8]) -> Result<Option<Recognition>, RecognizeError> {
    let answer: AuddAnswer = serde_json::from_slice(bytes)?;
    if answer.status != "success" {
        warn!("recognizer answered with status '{}'", answer.status);
        return Ok(None);
    }
    let Some(result) = answer.result else {
        return Ok(None);
    };

    let millis = result
        .spotify
        .and_then(|s| s.duration_ms)
        .or_else(|| result.apple_music.and_then(|a| a.duration_in_millis));

    Ok(Some(Recognition {
        metadata: TrackMetadata {
            artist: result.artist.unwrap_or_else(|| "Unknown".to_string()),
            title: result.title.unwrap_or_else(|| "Unknown".to_string()),
        },
        duration_hint: millis
            .map(|ms| u32::try_from(ms / 1000).unwrap_or(u32::MAX))
            .filter(|secs| *secs > 0),
    }))
}

impl Recognizer for AuddRecognizer {
    fn recognize(&self, snippet: &Path) -> Result<Option<Recognition>, RecognizeError> {
        let token = self
            .api_token
            .as_deref()
            .ok_or(RecognizeError::NotConfigured("no api token"))?;

        let size = std::fs::metadata(snippet)?.len();
        if size > MAX_UPLOAD_BYTES {
            return Err(RecognizeError::TooLarge(size));
        }
        let audio = STANDARD.encode(std::fs::read(snippet)?);
        info!("recognizing {} ({:.1} KB)", snippet.to_string_lossy(), size as f64 / 1024.0);

        let started = Instant::now();
        let response = http_client::retry_with_backoff(
            RetryConfig::default(),
            || {
                self.agent.post(&self.api_url).send_form(&[
                    ("api_token", token),
                    ("audio", audio.as_str()),
                    ("return", "apple_music,spotify"),
                ])
            },
            http_client::is_transport_error,
        )
        .map_err(|e| RecognizeError::Http(e.to_string()))?;

        let bytes = http_client::read_response_bytes(response, MAX_ANSWER_BYTES)?;
        let recognition = parse_answer(&bytes)?;
        match &recognition {
            Some(found) => info!(
                "recognized {} in {:.2}s",
                found.metadata,
                started.elapsed().as_secs_f64()
            ),
            None => info!("recognizer did not know the snippet"),
        }
        Ok(recognition)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::http_client::tests::{http_response, serve_once};

    #[test]
    fn successful_answer_yields_metadata_and_duration() {
        let json = br#"{
            "status": "success",
            "result": {
                "artist": "Daft Punk",
                "title": "One More Time",
                "timecode": "00:56",
                "spotify": { "duration_ms": 320357 },
                "apple_music": { "durationInMillis": 320000 }
            }
        }"#;

        let found = parse_answer(json).unwrap().unwrap();
        assert_eq!(found.metadata.artist, "Daft Punk");
        assert_eq!(found.metadata.title, "One More Time");
        assert_eq!(found.duration_hint, Some(320));
    }

    #[test]
    fn apple_music_duration_is_a_fallback() {
        let json = br#"{"status":"success","result":{"artist":"A","title":"T",
            "apple_music":{"durationInMillis":180500}}}"#;
        assert_eq!(parse_answer(json).unwrap().unwrap().duration_hint, Some(180));
    }

    #[test]
    fn null_result_or_error_status_is_no_match() {
        assert_eq!(parse_answer(br#"{"status":"success","result":null}"#).unwrap(), None);
        assert_eq!(
            parse_answer(br#"{"status":"error","error":{"error_code":901}}"#).unwrap(),
            None
        );
    }

    #[test]
    fn garbage_answer_is_a_decode_error() {
        assert!(matches!(
            parse_answer(b"<html>bad gateway</html>"),
            Err(RecognizeError::Decode(_))
        ));
    }

    #[test]
    fn missing_token_is_reported_before_any_request() {
        let dir = tempdir().unwrap();
        let snippet = dir.path().join("snip.mp3");
        fs::write(&snippet, b"audio").unwrap();

        let recognizer = AuddRecognizer::new(&RecognizerConfig::default());
        assert!(matches!(
            recognizer.recognize(&snippet),
            Err(RecognizeError::NotConfigured(_))
        ));
    }

    #[test]
    fn recognizes_against_http_endpoint() {
        let body = r#"{"status":"success","result":{"artist":"A","title":"T"}}"#;
        let url = serve_once(http_response("200 OK", "application/json", body));
        let dir = tempdir().unwrap();
        let snippet = dir.path().join("snip.mp3");
        fs::write(&snippet, b"audio").unwrap();

        let recognizer = AuddRecognizer::new(&RecognizerConfig {
            api_url: url,
            api_token: Some("token".into()),
            timeout_secs: 5,
        });

        let found = recognizer.recognize(&snippet).unwrap().unwrap();
        assert_eq!(found.metadata.to_string(), "A - T");
        assert_eq!(found.duration_hint, None);
    }
}
