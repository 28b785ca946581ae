//! Asynchronous download jobs.
//!
//! A job starts `Pending` and moves exactly once to `Ready` or `Failed`, both
//! terminal. The worker performing the download is the only writer; callers
//! create, poll and finally fetch. [`await_completion`] turns the polling into
//! a bounded blocking wait.

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use log::debug;
use thiserror::Error;

pub mod registry;
pub mod remote;
pub mod wire;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl JobId {
    /// `<unix millis>-<sequence>`, unique within the process
    pub fn generate() -> Self {
        static SEQUENCE: AtomicU64 = AtomicU64::new(0);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("{millis}-{seq}"))
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Ready { path: PathBuf },
    Failed { message: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Pending)
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {0} is not ready")]
    NotReady(JobId),

    #[error("job still pending after {attempts} polls")]
    Timeout { attempts: u32 },

    #[error("job failed: {0}")]
    Failed(String),

    #[error("download backend error: {0}")]
    Backend(String),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

/// create/poll/fetch protocol over download jobs
pub trait JobOrchestrator: Send + Sync {
    /// Registers a pending job and schedules the download. Never blocks on it.
    fn create(&self, query: &str) -> Result<JobId, JobError>;

    /// Current state of the job, without waiting.
    fn poll(&self, id: &JobId) -> Result<JobState, JobError>;

    /// Places the audio of a ready job at `dest` and returns where it ended up.
    fn fetch(&self, id: &JobId, dest: &Path) -> Result<PathBuf, JobError>;
}

/// Polls until the job is terminal or `max_attempts` polls were spent.
///
/// Sleeps only between polls: a job that is already ready returns at once
/// and `max_attempts == 1` never sleeps. A caller that gives up early just
/// stops polling; the worker still records its result.
pub fn await_completion(
    jobs: &dyn JobOrchestrator,
    id: &JobId,
    poll_interval: Duration,
    max_attempts: u32,
) -> Result<PathBuf, JobError> {
    for attempt in 1..=max_attempts {
        match jobs.poll(id)? {
            JobState::Ready { path } => return Ok(path),
            JobState::Failed { message } => return Err(JobError::Failed(message)),
            JobState::Pending => {
                debug!("job {id} pending, poll {attempt}/{max_attempts}");
                if attempt < max_attempts {
                    thread::sleep(poll_interval);
                }
            }
        }
    }

    Err(JobError::Timeout {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Mutex, time::Instant};

    use super::*;

    /// Replays a fixed sequence of states, repeating the last one.
    struct Scripted {
        states: Mutex<Vec<JobState>>,
        polls: Mutex<u32>,
    }

    impl Scripted {
        fn new(states: Vec<JobState>) -> Self {
            Self {
                states: Mutex::new(states),
                polls: Mutex::new(0),
            }
        }

        fn polls(&self) -> u32 {
            *self.polls.lock().unwrap()
        }
    }

    impl JobOrchestrator for Scripted {
        fn create(&self, _query: &str) -> Result<JobId, JobError> {
            Ok(JobId::generate())
        }

        fn poll(&self, _id: &JobId) -> Result<JobState, JobError> {
            *self.polls.lock().unwrap() += 1;
            let mut states = self.states.lock().unwrap();
            if states.len() > 1 {
                Ok(states.remove(0))
            } else {
                Ok(states[0].clone())
            }
        }

        fn fetch(&self, id: &JobId, _dest: &Path) -> Result<PathBuf, JobError> {
            Err(JobError::NotReady(id.clone()))
        }
    }

    fn ready(path: &str) -> JobState {
        JobState::Ready { path: path.into() }
    }

    #[test]
    fn job_ids_are_unique() {
        let ids: HashSet<_> = (0..1000).map(|_| JobId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn single_attempt_on_pending_job_times_out_without_sleeping() {
        let jobs = Scripted::new(vec![JobState::Pending]);
        let started = Instant::now();

        let err =
            await_completion(&jobs, &JobId::generate(), Duration::from_secs(5), 1).unwrap_err();

        assert!(matches!(err, JobError::Timeout { attempts: 1 }));
        assert_eq!(jobs.polls(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn ready_job_returns_immediately() {
        let jobs = Scripted::new(vec![ready("/tmp/a.mp3")]);
        let started = Instant::now();

        let path =
            await_completion(&jobs, &JobId::generate(), Duration::from_secs(5), 10).unwrap();

        assert_eq!(path, PathBuf::from("/tmp/a.mp3"));
        assert_eq!(jobs.polls(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn waits_through_pending_states() {
        let jobs = Scripted::new(vec![
            JobState::Pending,
            JobState::Pending,
            ready("/tmp/b.mp3"),
        ]);

        let path =
            await_completion(&jobs, &JobId::generate(), Duration::from_millis(1), 5).unwrap();

        assert_eq!(path, PathBuf::from("/tmp/b.mp3"));
        assert_eq!(jobs.polls(), 3);
    }

    #[test]
    fn failed_job_surfaces_its_message() {
        let jobs = Scripted::new(vec![
            JobState::Pending,
            JobState::Failed {
                message: "no mp3 found".into(),
            },
        ]);

        let err =
            await_completion(&jobs, &JobId::generate(), Duration::from_millis(1), 5).unwrap_err();

        assert!(matches!(err, JobError::Failed(msg) if msg == "no mp3 found"));
    }

    #[test]
    fn never_ready_job_times_out_after_budget() {
        let jobs = Scripted::new(vec![JobState::Pending]);

        let err =
            await_completion(&jobs, &JobId::generate(), Duration::from_millis(1), 4).unwrap_err();

        assert!(matches!(err, JobError::Timeout { attempts: 4 }));
        assert_eq!(jobs.polls(), 4);
    }
}
