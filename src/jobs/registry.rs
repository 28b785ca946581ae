use std::{
    any::Any,
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use log::{info, warn};

use super::{JobError, JobId, JobOrchestrator, JobState};
use crate::external::downloader::{DownloadError, Downloader};

#[derive(Debug)]
struct JobEntry {
    state: JobState,
    finished_at: Option<Instant>,
}

/// Mutex-guarded job state map shared by pollers and workers.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, JobEntry>> {
        // every write is a single insert, a poisoned map is still consistent
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self) -> JobId {
        let id = JobId::generate();
        self.jobs().insert(
            id.clone(),
            JobEntry {
                state: JobState::Pending,
                finished_at: None,
            },
        );
        id
    }

    pub fn state(&self, id: &JobId) -> Option<JobState> {
        self.jobs().get(id).map(|entry| entry.state.clone())
    }

    /// Moves a pending job to a terminal state.
    ///
    /// Returns false, leaving the job untouched, if the job is unknown or
    /// already terminal.
    pub fn complete(&self, id: &JobId, state: JobState) -> bool {
        self.complete_at(id, state, Instant::now())
    }

    fn complete_at(&self, id: &JobId, state: JobState, now: Instant) -> bool {
        if !state.is_terminal() {
            return false;
        }
        match self.jobs().get_mut(id) {
            Some(entry) if !entry.state.is_terminal() => {
                entry.state = state;
                entry.finished_at = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Forgets terminal jobs that finished more than `retention` before `now`.
    pub fn prune_finished(&self, retention: Duration, now: Instant) -> usize {
        let mut jobs = self.jobs();
        let before = jobs.len();
        jobs.retain(|_, entry| match entry.finished_at {
            Some(finished) => now.saturating_duration_since(finished) <= retention,
            None => true,
        });
        before - jobs.len()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.jobs().len()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs downloads on worker threads of this process.
pub struct LocalJobs {
    registry: Arc<JobRegistry>,
    downloader: Arc<dyn Downloader>,
    download_dir: PathBuf,
    retention: Duration,
}

impl LocalJobs {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        download_dir: impl Into<PathBuf>,
        retention: Duration,
    ) -> Self {
        Self {
            registry: Arc::new(JobRegistry::new()),
            downloader,
            download_dir: download_dir.into(),
            retention,
        }
    }
}

impl JobOrchestrator for LocalJobs {
    fn create(&self, query: &str) -> Result<JobId, JobError> {
        let pruned = self.registry.prune_finished(self.retention, Instant::now());
        if pruned > 0 {
            info!("forgot {pruned} finished jobs");
        }

        let id = self.registry.register();
        let worker_id = id.clone();
        let registry = Arc::clone(&self.registry);
        let downloader = Arc::clone(&self.downloader);
        let dir = self.download_dir.clone();
        let query = query.to_string();

        info!("job {id}: queued download for '{query}'");
        let spawned = std::thread::Builder::new()
            .name(format!("download-{id}"))
            .spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| downloader.download(&query, &dir)))
                    .unwrap_or_else(|payload| {
                        Err(DownloadError::Panicked(panic_message(payload)))
                    });
                let state = match outcome {
                    Ok(path) => JobState::Ready { path },
                    Err(e) => {
                        warn!("job {worker_id}: download for '{query}' failed: {e}");
                        JobState::Failed {
                            message: e.to_string(),
                        }
                    }
                };
                registry.complete(&worker_id, state);
            });

        if let Err(e) = spawned {
            self.registry.complete(
                &id,
                JobState::Failed {
                    message: format!("could not start worker: {e}"),
                },
            );
            return Err(JobError::Io(e));
        }

        Ok(id)
    }

    fn poll(&self, id: &JobId) -> Result<JobState, JobError> {
        self.registry
            .state(id)
            .ok_or_else(|| JobError::NotFound(id.clone()))
    }

    fn fetch(&self, id: &JobId, dest: &Path) -> Result<PathBuf, JobError> {
        let path = match self.poll(id)? {
            JobState::Ready { path } => path,
            _ => return Err(JobError::NotReady(id.clone())),
        };
        if path == dest {
            return Ok(path);
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // the download dir keeps its copy, it serves repeated queries
        std::fs::copy(&path, dest)?;
        Ok(dest.to_path_buf())
    }
}
