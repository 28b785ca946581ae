use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use super::{ToolError, YtDlp, find_with_extension, is_url, run_tool};
use crate::storage::fs::{is_valid_audio_path, move_file, safe_file_stem};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{0}")]
    Tool(#[from] ToolError),

    #[error("no mp3 found")]
    NoOutput,

    #[error("file too large ({bytes} bytes, limit {limit})")]
    TooLarge { bytes: u64, limit: u64 },

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download worker panicked: {0}")]
    Panicked(String),
}

/// Searches for and downloads audio for a query or url.
pub trait Downloader: Send + Sync {
    /// Returns the path of an audio file inside `dest_dir`.
    fn download(&self, query: &str, dest_dir: &Path) -> Result<PathBuf, DownloadError>;
}

pub struct YtDlpDownloader {
    yt_dlp: YtDlp,
    temp_root: Option<PathBuf>,
    max_file_bytes: u64,
}

impl YtDlpDownloader {
    pub fn new(yt_dlp: YtDlp, temp_root: Option<PathBuf>, max_file_bytes: u64) -> Self {
        Self {
            yt_dlp,
            temp_root,
            max_file_bytes,
        }
    }

    fn scratch_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("cliptrack-dl-");
        match &self.temp_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }
}

/// Where the download for `query` lands. Doubles as the backend's file cache.
pub fn destination_for(query: &str, dest_dir: &Path) -> PathBuf {
    dest_dir.join(format!("{}.mp3", safe_file_stem(query)))
}

impl Downloader for YtDlpDownloader {
    fn download(&self, query: &str, dest_dir: &Path) -> Result<PathBuf, DownloadError> {
        let dest = destination_for(query, dest_dir);
        if is_valid_audio_path(&dest) {
            info!("already downloaded: {}", dest.to_string_lossy());
            return Ok(dest);
        }

        let scratch = self.scratch_dir()?;
        let target = if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{query}")
        };

        run_tool(
            self.yt_dlp
                .command()
                .args(["--format", "bestaudio/best", "--no-playlist"])
                .args(["--extract-audio", "--audio-format", "mp3"])
                .args(["--audio-quality", "160K"])
                .args(["--socket-timeout", "10", "--retries", "2"])
                .args(["--fragment-retries", "2", "--concurrent-fragments", "10"])
                .arg("--output")
                .arg(scratch.path().join("track.%(ext)s"))
                .arg(&target),
        )?;

        let mp3 = find_with_extension(scratch.path(), "mp3")?.ok_or(DownloadError::NoOutput)?;

        let bytes = std::fs::metadata(&mp3)?.len();
        if bytes > self.max_file_bytes {
            warn!("download for '{query}' is {bytes} bytes, discarding");
            return Err(DownloadError::TooLarge {
                bytes,
                limit: self.max_file_bytes,
            });
        }

        move_file(&mp3, &dest)?;
        info!("downloaded '{query}' to {}", dest.to_string_lossy());
        Ok(dest)
    }
}
