use std::{
    path::{Path, PathBuf},
    process::Command,
};

use log::{info, warn};
use thiserror::Error;

use super::{ToolError, YtDlp, find_with_extension, run_tool};

/// Snippets below this size carry no usable audio.
pub const MIN_SNIPPET_BYTES: u64 = 100_000;

const SNIPPET_START_SECS: u32 = 5;
const SNIPPET_LENGTH_SECS: u32 = 25;
const SNIPPET_FILTER: &str =
    "silenceremove=stop_periods=-1:stop_threshold=-50dB:stop_duration=0.5,volume=2.0";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0}")]
    Tool(#[from] ToolError),

    #[error("link produced no video file")]
    NoVideo,

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

/// Media work on samples: fetching shared links and cutting audio snippets.
pub trait MediaToolchain: Send + Sync {
    /// Downloads the video behind `url` into `dir`.
    fn fetch_link(&self, url: &str, dir: &Path) -> Result<PathBuf, MediaError>;

    /// Cuts the recognition snippet out of `media` into `dir`.
    ///
    /// `Ok(None)` when the media has no usable audio track.
    fn extract_snippet(&self, media: &Path, dir: &Path) -> Result<Option<PathBuf>, MediaError>;
}

pub struct FfmpegToolchain {
    ffmpeg: PathBuf,
    yt_dlp: YtDlp,
}

impl FfmpegToolchain {
    pub fn new(ffmpeg: impl Into<PathBuf>, yt_dlp: YtDlp) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            yt_dlp,
        }
    }

    fn snippet_command(&self, media: &Path, snippet: &Path) -> Command {
        let mut command = Command::new(&self.ffmpeg);
        command
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(media)
            .args(["-ss", &SNIPPET_START_SECS.to_string()])
            .args(["-t", &SNIPPET_LENGTH_SECS.to_string()])
            .args(["-vn", "-ac", "2", "-ar", "44100", "-b:a", "192k"])
            .args(["-af", SNIPPET_FILTER])
            .arg(snippet);
        command
    }
}

/// A snippet counts only if it exists and is big enough to hold sound.
pub fn is_usable_snippet(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() >= MIN_SNIPPET_BYTES)
}

impl MediaToolchain for FfmpegToolchain {
    fn fetch_link(&self, url: &str, dir: &Path) -> Result<PathBuf, MediaError> {
        run_tool(
            self.yt_dlp
                .command()
                .args(["--format", "mp4", "--no-playlist"])
                .arg("--output")
                .arg(dir.join("video.%(ext)s"))
                .arg(url),
        )?;
        let video = find_with_extension(dir, "mp4")?.ok_or(MediaError::NoVideo)?;
        info!("fetched {url} to {}", video.to_string_lossy());
        Ok(video)
    }

    fn extract_snippet(&self, media: &Path, dir: &Path) -> Result<Option<PathBuf>, MediaError> {
        let snippet = dir.join("snippet.mp3");
        match run_tool(&mut self.snippet_command(media, &snippet)) {
            Ok(_) => {}
            // ffmpeg refuses to write an output for a stream without audio
            Err(ToolError::Failed { stderr, .. }) => {
                warn!("ffmpeg found no audio in {}: {stderr}", media.to_string_lossy());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        if !is_usable_snippet(&snippet) {
            warn!("snippet of {} is too small, no audio", media.to_string_lossy());
            return Ok(None);
        }
        Ok(Some(snippet))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn snippet_command_cuts_from_five_seconds_for_twenty_five() {
        let tools = FfmpegToolchain::new("ffmpeg", YtDlp::new("yt-dlp", None));
        let command = tools.snippet_command(Path::new("in.mp4"), Path::new("out.mp3"));
        let args: Vec<_> = command
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        let after = |flag: &str| {
            let at = args.iter().position(|a| a == flag).unwrap();
            args[at + 1].clone()
        };
        assert_eq!(after("-ss"), "5");
        assert_eq!(after("-t"), "25");
        assert_eq!(after("-af"), SNIPPET_FILTER);
        assert_eq!(args.last().unwrap(), "out.mp3");
    }

    #[test]
    fn small_snippets_are_not_usable() {
        let dir = tempdir().unwrap();
        let small = dir.path().join("small.mp3");
        let big = dir.path().join("big.mp3");
        fs::write(&small, vec![0u8; 99_999]).unwrap();
        fs::write(&big, vec![0u8; 100_000]).unwrap();

        assert!(!is_usable_snippet(&small));
        assert!(is_usable_snippet(&big));
        assert!(!is_usable_snippet(&dir.path().join("missing.mp3")));
    }

    #[test]
    fn missing_ffmpeg_is_an_error_not_silence() {
        let dir = tempdir().unwrap();
        let tools = FfmpegToolchain::new(
            "definitely-not-a-real-tool-xyz",
            YtDlp::new("yt-dlp", None),
        );

        let err = tools
            .extract_snippet(&dir.path().join("in.mp4"), dir.path())
            .unwrap_err();
        assert!(matches!(err, MediaError::Tool(ToolError::Spawn { .. })));
    }
}
