use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use std::{
    io::{BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use crate::{
    backend::server::BackendServer,
    config::{self, Config, JobsMode},
    domain::{fingerprint::Fingerprint, track::{Track, TrackId}},
    external::{
        YtDlp, catalog::YtDlpCatalog, downloader::YtDlpDownloader, media::FfmpegToolchain,
        recognizer::AuddRecognizer,
    },
    jobs::{JobOrchestrator, registry::LocalJobs, remote::RemoteJobs},
    pipeline::{
        Failure, PendingChoices, PipelineSettings, Resolution, ResolutionPipeline, Sample,
        TextOutcome,
    },
    storage::{cache::CacheStore, db::i64_seconds_to_local_time, fs::is_valid_audio_path},
};

/// session name for choices made on this terminal
const CLI_SESSION: &str = "cli";

#[derive(Parser)]
#[command(name = "cliptrack")]
#[command(version = "0.1")]
#[command(about = "Resolve video clips, links and titles to full-length tracks")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the download backend over HTTP
    Serve,
    /// Resolve a video or audio clip
    Clip {
        file: PathBuf,
        /// Stable id of the clip, derived from its content if omitted
        #[arg(short, long)]
        source_id: Option<String>,
    },
    /// Resolve a shared link
    Link { url: String },
    /// Search by title and pick one of the results
    Query {
        text: String,
        /// Pick this entry (1-based) instead of asking
        #[arg(short, long)]
        pick: Option<usize>,
    },
    /// Look a title or artist up in the cache only
    Find { text: String },
    /// List cached tracks
    List {
        /// Include tracks whose audio file is gone
        #[arg(short, long)]
        show_unavailable: bool,
    },
    /// Remove a cached track by id
    Forget { id: i64 },
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = Config::load(&cli.config.to_string_lossy())?;

    match cli.command {
        Commands::Serve => serve(cfg),

        Commands::Clip { file, source_id } => {
            let source_id = match source_id {
                Some(id) => id,
                None => Fingerprint::from_file(&file)
                    .with_context(|| format!("Failed to read clip {}", file.to_string_lossy()))?
                    .to_hex(),
            };
            let pipeline = build_pipeline(&cfg)?;
            report(pipeline.resolve(&Sample::Clip {
                source_id,
                media: file,
            }))
        }

        Commands::Link { url } => {
            let pipeline = build_pipeline(&cfg)?;
            report(pipeline.resolve(&Sample::Link { url }))
        }

        Commands::Query { text, pick } => {
            let pipeline = build_pipeline(&cfg)?;
            let list = match pipeline.search_text(CLI_SESSION, &text) {
                Ok(TextOutcome::Cached(track)) => {
                    println!("From cache: {}", track.metadata);
                    println!("  {}", track.audio_path.to_string_lossy());
                    return Ok(());
                }
                Ok(TextOutcome::Choices(list)) => list,
                Err(failure) => return fail(failure),
            };

            println!("Found several tracks:");
            for (i, scored) in list.iter().enumerate() {
                let c = &scored.candidate;
                println!("{:>3}. {} ({})", i + 1, c.title, c.duration_label());
            }

            let number = match pick {
                Some(n) => n,
                None => ask_number(list.len())?,
            };
            if number == 0 {
                bail!("Choices are numbered from 1");
            }
            report(pipeline.choose(CLI_SESSION, number - 1))
        }

        Commands::Find { text } => {
            let store = CacheStore::open(&cfg.database)?;
            match store.lookup_by_title_or_artist(&text)? {
                Some(track) => print_track(&track),
                None => println!("Nothing cached matches '{text}'"),
            }
            Ok(())
        }

        Commands::List { show_unavailable } => {
            let store = CacheStore::open(&cfg.database)?;
            for track in store.list_tracks()? {
                if show_unavailable || is_valid_audio_path(&track.audio_path) {
                    print_track(&track);
                }
            }
            Ok(())
        }

        Commands::Forget { id } => {
            let mut store = CacheStore::open(&cfg.database)?;
            let track = store.remove(TrackId(id))?;
            println!("Removed {} {}", track.id, track.metadata);
            Ok(())
        }
    }
}

fn serve(cfg: Config) -> anyhow::Result<()> {
    println!("Starting download backend...");

    let downloader = YtDlpDownloader::new(
        yt_dlp(&cfg.tools),
        cfg.paths.temp_dir.clone(),
        cfg.jobs.max_file_bytes(),
    );
    std::fs::create_dir_all(&cfg.paths.download_dir).with_context(|| {
        format!(
            "Failed to create download dir {}",
            cfg.paths.download_dir.to_string_lossy()
        )
    })?;
    let jobs = LocalJobs::new(
        Arc::new(downloader),
        cfg.paths.download_dir.clone(),
        cfg.jobs.retention(),
    );

    let server = BackendServer::new(Arc::new(jobs), cfg.http);
    println!(
        "Download backend running at http://{}:{}",
        server.config.bind_addr, server.config.port
    );
    server.run();
    Ok(())
}

fn yt_dlp(tools: &config::Tools) -> YtDlp {
    YtDlp::new(tools.yt_dlp.clone(), tools.cookies.clone())
}

fn build_pipeline(cfg: &Config) -> anyhow::Result<ResolutionPipeline> {
    let store = CacheStore::open(&cfg.database).context("Failed to open track cache")?;

    let jobs: Arc<dyn JobOrchestrator> = match cfg.jobs.mode {
        JobsMode::Local => {
            let downloader = YtDlpDownloader::new(
                yt_dlp(&cfg.tools),
                cfg.paths.temp_dir.clone(),
                cfg.jobs.max_file_bytes(),
            );
            Arc::new(LocalJobs::new(
                Arc::new(downloader),
                cfg.paths.download_dir.clone(),
                cfg.jobs.retention(),
            ))
        }
        JobsMode::Remote => Arc::new(RemoteJobs::new(
            &cfg.jobs.backend_url,
            cfg.jobs.max_file_bytes(),
        )),
    };

    Ok(ResolutionPipeline::new(
        store,
        Arc::new(AuddRecognizer::new(&cfg.recognizer)),
        Arc::new(YtDlpCatalog::new(yt_dlp(&cfg.tools))),
        Arc::new(FfmpegToolchain::new(cfg.tools.ffmpeg.clone(), yt_dlp(&cfg.tools))),
        jobs,
        PendingChoices::new(cfg.choices.ttl()),
        PipelineSettings::from_config(cfg),
    ))
}

fn report(result: Result<Resolution, Failure>) -> anyhow::Result<()> {
    match result {
        Ok(Resolution::Cached { track, via }) => {
            println!("From cache (by {via}): {}", track.metadata);
            println!("  {}", track.audio_path.to_string_lossy());
            Ok(())
        }
        Ok(Resolution::Resolved(track)) => {
            println!("{}", track.metadata);
            println!("  {}", track.audio_path.to_string_lossy());
            Ok(())
        }
        Err(failure) => fail(failure),
    }
}

fn fail(failure: Failure) -> anyhow::Result<()> {
    log::debug!("resolution failed: {failure}");
    Err(anyhow!(failure.user_message()))
}

fn ask_number(max: usize) -> anyhow::Result<usize> {
    print!("Pick a track [1-{max}]: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    line.trim()
        .parse()
        .with_context(|| format!("'{}' is not a number", line.trim()))
}

fn print_track(track: &Track) {
    let created = i64_seconds_to_local_time(track.created_at)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| track.created_at.to_string());
    println!("Track {}: {} (cached {created})", track.id, track.metadata);

    if is_valid_audio_path(&track.audio_path) {
        println!("  {}", track.audio_path.to_string_lossy());
    } else {
        println!("  {} (missing)", track.audio_path.to_string_lossy());
    }
    if let Some(id) = &track.keys.source_id {
        println!("  source id: {id}");
    }
    if let Some(url) = &track.keys.url {
        println!("  url: {url}");
    }
    if let Some(fp) = &track.keys.fingerprint {
        println!("  fingerprint: {fp}");
    }
}
