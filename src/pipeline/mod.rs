//! Resolves incoming samples to cached, full-length tracks.
//!
//! Every step that does not need the network comes first: the cache is
//! consulted by source id or url, then by the fingerprint of the extracted
//! snippet, and only then is the snippet sent for recognition and the audio
//! searched for and downloaded.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::{debug, info, warn};
use tempfile::TempDir;

use crate::{
    config::Config,
    domain::{
        candidate::Candidate,
        fingerprint::Fingerprint,
        track::{CacheKey, LookupKeys, NewTrack, Track, TrackMetadata},
    },
    external::{catalog::CatalogSearch, media::MediaToolchain, recognizer::Recognizer},
    jobs::{JobOrchestrator, await_completion},
    ranking::{self, RankOptions},
    storage::{
        cache::CacheStore,
        fs::{is_valid_audio_path, track_file_path},
    },
};

pub mod choices;
pub mod outcome;

pub use choices::PendingChoices;
pub use outcome::{Failure, Resolution, TextOutcome};

/// A sample as delivered by the chat layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sample {
    /// a video or audio file; `source_id` is the platform's stable id for it
    Clip { source_id: String, media: PathBuf },
    Link { url: String },
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub audio_dir: PathBuf,
    /// parent of per-request scratch dirs, system temp dir when unset
    pub temp_dir: Option<PathBuf>,
    pub rank: RankOptions,
    pub search_results: usize,
    pub list_limit: usize,
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            audio_dir: config.paths.audio_dir.clone(),
            temp_dir: config.paths.temp_dir.clone(),
            rank: RankOptions {
                max_duration: config.search.max_duration_secs,
            },
            search_results: config.search.results,
            list_limit: config.search.list_limit,
            poll_interval: config.jobs.poll_interval(),
            max_attempts: config.jobs.max_attempts,
        }
    }
}

pub struct ResolutionPipeline {
    cache: Mutex<CacheStore>,
    recognizer: Arc<dyn Recognizer>,
    catalog: Arc<dyn CatalogSearch>,
    media: Arc<dyn MediaToolchain>,
    jobs: Arc<dyn JobOrchestrator>,
    choices: PendingChoices,
    settings: PipelineSettings,
}

impl ResolutionPipeline {
    pub fn new(
        cache: CacheStore,
        recognizer: Arc<dyn Recognizer>,
        catalog: Arc<dyn CatalogSearch>,
        media: Arc<dyn MediaToolchain>,
        jobs: Arc<dyn JobOrchestrator>,
        choices: PendingChoices,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            cache: Mutex::new(cache),
            recognizer,
            catalog,
            media,
            jobs,
            choices,
            settings,
        }
    }

    fn cache(&self) -> MutexGuard<'_, CacheStore> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cache lookup that ignores hits whose audio file is gone.
    fn cached(&self, keys: &LookupKeys) -> Result<Option<(Track, CacheKey)>, Failure> {
        match self.cache().lookup(keys)? {
            Some((track, via)) if is_valid_audio_path(&track.audio_path) => Ok(Some((track, via))),
            Some((track, via)) => {
                warn!(
                    "cached track {} found by {via} lost its audio {}, resolving again",
                    track.id,
                    track.audio_path.to_string_lossy()
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Newest record of the sound whose audio file still exists.
    fn cached_by_sound(&self, fingerprint: &Fingerprint) -> Result<Option<Track>, Failure> {
        let records = self.cache().lookup_all_by_fingerprint(fingerprint)?;
        let mut stale = 0;
        for track in records {
            if is_valid_audio_path(&track.audio_path) {
                if stale > 0 {
                    debug!("skipped {stale} records of {fingerprint} without audio");
                }
                return Ok(Some(track));
            }
            stale += 1;
        }
        if stale > 0 {
            warn!("all {stale} records of {fingerprint} lost their audio, resolving again");
        }
        Ok(None)
    }

    fn workspace(&self) -> Result<TempDir, Failure> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("cliptrack-");
        let dir = match &self.settings.temp_dir {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    pub fn resolve(&self, sample: &Sample) -> Result<Resolution, Failure> {
        let known = match sample {
            Sample::Clip { source_id, .. } => LookupKeys {
                source_id: Some(source_id.clone()),
                ..Default::default()
            },
            // the only key of a link before fetching it, so it goes ahead of the fingerprint
            Sample::Link { url } => LookupKeys {
                url: Some(url.clone()),
                ..Default::default()
            },
        };

        if let Some((track, via)) = self.cached(&known)? {
            info!("cache hit by {via}: {}", track.metadata);
            return Ok(Resolution::Cached { track, via });
        }

        // dropped on every return below, taking fetched media and snippet with it
        let workspace = self.workspace()?;
        let media = match sample {
            Sample::Clip { media, .. } => media.clone(),
            Sample::Link { url } => self.media.fetch_link(url, workspace.path()).map_err(|e| {
                warn!("fetching {url} failed: {e}");
                Failure::DownloadFailed(e.to_string())
            })?,
        };

        let snippet = self
            .media
            .extract_snippet(&media, workspace.path())
            .map_err(|e| {
                warn!("snippet extraction failed: {e}");
                Failure::NoAudio
            })?
            .ok_or(Failure::NoAudio)?;

        let fingerprint = Fingerprint::from_file(&snippet)?;
        let cached = self.cached_by_sound(&fingerprint)?;
        let keys = LookupKeys {
            fingerprint: Some(fingerprint),
            ..known
        };

        if let Some(original) = cached {
            info!("fingerprint hit: {}", original.metadata);
            let alias = self.cache().upsert(original.alias(keys))?;
            return Ok(Resolution::Cached {
                track: alias,
                via: CacheKey::Fingerprint,
            });
        }

        let recognition = match self.recognizer.recognize(&snippet) {
            Ok(Some(found)) => found,
            Ok(None) => return Err(Failure::RecognitionInconclusive),
            Err(e) => {
                warn!("recognizer failed: {e}");
                return Err(Failure::RecognitionInconclusive);
            }
        };
        let metadata = recognition.metadata;

        let query = format!("{} {}", metadata.artist, metadata.title);
        let candidates = self.search(query.trim())?;
        let best = ranking::rank(
            &candidates,
            &metadata.artist,
            &metadata.title,
            recognition.duration_hint,
            &self.settings.rank,
        )
        .ok_or(Failure::NoCandidatesFound)?;
        info!(
            "picked '{}' by {} ({}s, score {})",
            best.candidate.title, best.candidate.uploader, best.candidate.duration_seconds, best.score
        );

        let audio_path = self.download(&best.candidate, &metadata)?;
        let track = self.cache().upsert(NewTrack {
            keys,
            metadata,
            audio_path,
            origin_video_id: Some(best.candidate.external_id),
        })?;
        Ok(Resolution::Resolved(track))
    }

    /// Fuzzy cache lookup, then a ranked list left pending for `session`.
    pub fn search_text(&self, session: &str, query: &str) -> Result<TextOutcome, Failure> {
        let query = query.trim();
        let expired = self.choices.sweep();
        if expired > 0 {
            debug!("dropped {expired} expired choice lists");
        }
        if let Some(track) = self.cache().lookup_by_title_or_artist(query)? {
            if is_valid_audio_path(&track.audio_path) {
                info!("'{query}' found in cache: {}", track.metadata);
                return Ok(TextOutcome::Cached(track));
            }
        }

        let candidates = self.search(query)?;
        let list = ranking::rank_list(&candidates, self.settings.list_limit, &self.settings.rank);
        if list.is_empty() {
            return Err(Failure::NoCandidatesFound);
        }
        self.choices.offer(session, list.clone());
        Ok(TextOutcome::Choices(list))
    }

    /// Resolves entry `index` (zero-based) of the list pending for `session`.
    pub fn choose(&self, session: &str, index: usize) -> Result<Resolution, Failure> {
        let candidate = self
            .choices
            .select(session, index)
            .ok_or(Failure::ChoiceExpired)?;

        let keys = LookupKeys {
            url: Some(candidate.url.clone()),
            ..Default::default()
        };
        if let Some((track, via)) = self.cached(&keys)? {
            return Ok(Resolution::Cached { track, via });
        }

        let metadata = metadata_from_candidate(&candidate);
        let audio_path = self.download(&candidate, &metadata)?;
        let track = self.cache().upsert(NewTrack {
            keys,
            metadata,
            audio_path,
            origin_video_id: Some(candidate.external_id),
        })?;
        Ok(Resolution::Resolved(track))
    }

    fn search(&self, query: &str) -> Result<Vec<Candidate>, Failure> {
        self.catalog
            .search(query, self.settings.search_results)
            .map_err(|e| {
                warn!("search for '{query}' failed: {e}");
                Failure::NoCandidatesFound
            })
    }

    /// Runs a download job for the candidate and places the audio in the library.
    fn download(&self, candidate: &Candidate, metadata: &TrackMetadata) -> Result<PathBuf, Failure> {
        let dest = track_file_path(&self.settings.audio_dir, &metadata.artist, &metadata.title);
        if is_valid_audio_path(&dest) {
            info!("{} already in library", dest.to_string_lossy());
            return Ok(dest);
        }

        let id = self.jobs.create(&candidate.url)?;
        info!("job {id} downloads {}", candidate.url);
        let result = await_completion(
            self.jobs.as_ref(),
            &id,
            self.settings.poll_interval,
            self.settings.max_attempts,
        )
        .and_then(|_| self.jobs.fetch(&id, &dest));

        result.map_err(|e| {
            warn!("job {id} for {}: {e}", candidate.url);
            Failure::from(e)
        })
    }
}

/// Catalog titles usually read "Artist - Title"; topic channels are named
/// after the artist.
fn metadata_from_candidate(candidate: &Candidate) -> TrackMetadata {
    if let Some((artist, title)) = candidate.title.split_once(" - ") {
        if !artist.trim().is_empty() && !title.trim().is_empty() {
            return TrackMetadata {
                artist: artist.trim().to_string(),
                title: title.trim().to_string(),
            };
        }
    }

    let uploader = candidate.uploader.trim();
    let artist = uploader
        .strip_suffix(" - Topic")
        .unwrap_or(uploader)
        .trim();
    TrackMetadata {
        artist: if artist.is_empty() { "Unknown" } else { artist }.to_string(),
        title: candidate.title.trim().to_string(),
    }
}
