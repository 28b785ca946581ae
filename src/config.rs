use anyhow::Context;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

pub const AUDD_TOKEN_ENV: &str = "AUDD_API_TOKEN";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    pub database: Database,
    pub paths: Paths,
    #[serde(default)]
    pub tools: Tools,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub choices: ChoicesConfig,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path}"))?;
        let mut config: Config =
            toml::from_str(&contents).with_context(|| "Failed to parse config TOML")?;
        if let Ok(token) = std::env::var(AUDD_TOKEN_ENV) {
            config.recognizer.api_token = Some(token);
        }
        Ok(config)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Database {
    InMemory,
    OnDisk { path: PathBuf },
}

#[derive(Debug, Deserialize, Clone)]
pub struct Paths {
    /// where resolved tracks are kept
    pub audio_dir: PathBuf,
    /// where the download backend puts finished jobs
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// parent of per-request scratch directories, system temp dir if unset
    pub temp_dir: Option<PathBuf>,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("cache/downloads")
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Tools {
    pub ffmpeg: PathBuf,
    pub yt_dlp: PathBuf,
    pub cookies: Option<PathBuf>,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            yt_dlp: PathBuf::from("yt-dlp"),
            cookies: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RecognizerConfig {
    pub api_url: String,
    pub api_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.audd.io/".to_string(),
            api_token: None,
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    /// how many catalog results to fetch per search
    pub results: usize,
    pub max_duration_secs: u32,
    /// how many entries a choice list shows
    pub list_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            results: 20,
            max_duration_secs: 300,
            list_limit: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobsMode {
    /// download in worker threads of this process
    Local,
    /// delegate to a download backend over HTTP
    Remote,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct JobsConfig {
    pub mode: JobsMode,
    pub backend_url: String,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub max_file_mb: u64,
    /// how long finished jobs stay pollable
    pub retention_secs: u64,
}

impl JobsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_mb * 1024 * 1024
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            mode: JobsMode::Remote,
            backend_url: "http://127.0.0.1:8080".to_string(),
            poll_interval_ms: 1000,
            max_attempts: 120,
            max_file_mb: 50,
            retention_secs: 3600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChoicesConfig {
    pub ttl_secs: u64,
}

impl ChoicesConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for ChoicesConfig {
    fn default() -> Self {
        Self { ttl_secs: 60 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_minimal_config_uses_defaults() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[database]
kind = "in_memory"

[paths]
audio_dir = "cache/mp3"
"#;

        let cfg: Config = toml::from_str(toml_str)?;

        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.database, Database::InMemory);
        assert_eq!(cfg.paths.audio_dir, PathBuf::from("cache/mp3"));
        assert_eq!(cfg.paths.download_dir, PathBuf::from("cache/downloads"));
        assert_eq!(cfg.search.max_duration_secs, 300);
        assert_eq!(cfg.search.list_limit, 10);
        assert_eq!(cfg.jobs.mode, JobsMode::Remote);
        assert_eq!(cfg.jobs.max_file_bytes(), 50 * 1024 * 1024);
        assert_eq!(cfg.choices.ttl(), Duration::from_secs(60));
        assert_eq!(cfg.tools.ffmpeg, PathBuf::from("ffmpeg"));
        assert!(cfg.recognizer.api_token.is_none());

        Ok(())
    }

    #[test]
    fn test_parse_full_config() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[database]
kind = "on_disk"
path = "/tmp/cliptrack.db"

[paths]
audio_dir = "/srv/mp3"
download_dir = "/srv/downloads"
temp_dir = "/srv/tmp"

[tools]
yt_dlp = "/usr/local/bin/yt-dlp"
cookies = "cookies.txt"

[recognizer]
api_token = "secret"

[search]
results = 5
max_duration_secs = 420

[jobs]
mode = "local"
poll_interval_ms = 250
max_attempts = 8

[http]
bind_addr = "127.0.0.1"
port = 9000

[choices]
ttl_secs = 30
"#;

        let cfg: Config = toml::from_str(toml_str)?;

        assert_eq!(
            cfg.database,
            Database::OnDisk {
                path: PathBuf::from("/tmp/cliptrack.db")
            }
        );
        assert_eq!(cfg.paths.temp_dir, Some(PathBuf::from("/srv/tmp")));
        assert_eq!(cfg.tools.yt_dlp, PathBuf::from("/usr/local/bin/yt-dlp"));
        assert_eq!(cfg.tools.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(cfg.tools.cookies, Some(PathBuf::from("cookies.txt")));
        assert_eq!(cfg.recognizer.api_token.as_deref(), Some("secret"));
        assert_eq!(cfg.recognizer.api_url, "https://api.audd.io/");
        assert_eq!(cfg.search.results, 5);
        assert_eq!(cfg.search.max_duration_secs, 420);
        assert_eq!(cfg.jobs.mode, JobsMode::Local);
        assert_eq!(cfg.jobs.poll_interval(), Duration::from_millis(250));
        assert_eq!(cfg.jobs.max_attempts, 8);
        assert_eq!(cfg.http.port, 9000);
        assert_eq!(cfg.choices.ttl_secs, 30);

        Ok(())
    }

    #[test]
    fn test_example_config_parses() -> anyhow::Result<()> {
        let cfg: Config = toml::from_str(include_str!("../config.example.toml"))?;

        assert_eq!(cfg.jobs.mode, JobsMode::Remote);
        assert_eq!(cfg.paths.download_dir, PathBuf::from("cache/downloads"));
        assert!(cfg.recognizer.api_token.is_none());

        Ok(())
    }
}
