use std::path::{Path, PathBuf};

use log::{debug, info};
use tempfile::NamedTempFile;

use super::{
    JobError, JobId, JobOrchestrator, JobState,
    wire::{CreatedBody, StatusBody},
};
use crate::http_client::{self, RetryConfig};

/// Client of the download backend's `/download`, `/status` and `/file` routes.
pub struct RemoteJobs {
    base_url: String,
    agent: ureq::Agent,
    retry: RetryConfig,
    max_file_bytes: u64,
}

impl RemoteJobs {
    pub fn new(base_url: &str, max_file_bytes: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: http_client::agent().clone(),
            retry: RetryConfig::default(),
            max_file_bytes,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get(&self, path: &str) -> Result<ureq::Response, ureq::Error> {
        let url = self.url(path);
        http_client::retry_with_backoff(
            self.retry,
            || self.agent.get(&url).call(),
            http_client::is_transport_error,
        )
    }
}

fn backend_error(err: ureq::Error) -> JobError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            JobError::Backend(format!("HTTP {code}: {}", body.trim()))
        }
        ureq::Error::Transport(transport) => JobError::Backend(transport.to_string()),
    }
}

impl JobOrchestrator for RemoteJobs {
    fn create(&self, query: &str) -> Result<JobId, JobError> {
        // not retried, a lost answer would leave an orphan job behind
        let response = self
            .agent
            .post(&self.url("/download"))
            .query("q", query)
            .call()
            .map_err(backend_error)?;
        let body: CreatedBody = response
            .into_json()
            .map_err(|e| JobError::Backend(format!("bad /download answer: {e}")))?;

        let id = JobId(body.task_id);
        info!("backend job {id} created for '{query}'");
        Ok(id)
    }

    fn poll(&self, id: &JobId) -> Result<JobState, JobError> {
        let response = match self.get(&format!("/status/{id}")) {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Err(JobError::NotFound(id.clone())),
            Err(e) => return Err(backend_error(e)),
        };
        let body: StatusBody = response
            .into_json()
            .map_err(|e| JobError::Backend(format!("bad /status answer: {e}")))?;
        let state = JobState::try_from(body)?;
        debug!("backend job {id}: {state:?}");
        Ok(state)
    }

    fn fetch(&self, id: &JobId, dest: &Path) -> Result<PathBuf, JobError> {
        let response = match self.get(&format!("/file/{id}")) {
            Ok(response) => response,
            Err(ureq::Error::Status(400, _)) => return Err(JobError::NotReady(id.clone())),
            Err(ureq::Error::Status(404, _)) => return Err(JobError::NotFound(id.clone())),
            Err(e) => return Err(backend_error(e)),
        };

        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut partial = NamedTempFile::new_in(dir)?;
        let bytes =
            http_client::copy_response_to_writer(response, partial.as_file_mut(), self.max_file_bytes)?;
        partial.persist(dest).map_err(|e| e.error)?;

        info!("fetched {bytes} bytes of job {id} to {}", dest.to_string_lossy());
        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::http_client::tests::{http_response, serve_once};

    fn json(status: &str, body: &str) -> String {
        http_response(status, "application/json", body)
    }

    #[test]
    fn create_reads_task_id() {
        let url = serve_once(json("200 OK", r#"{"task_id":"42-0","status":"pending"}"#));
        let jobs = RemoteJobs::new(&url, 1024);

        assert_eq!(jobs.create("Artist Song").unwrap(), JobId("42-0".into()));
    }

    #[test]
    fn poll_maps_status_bodies() {
        let url = serve_once(json("200 OK", r#"{"status":"ready","file":"cache/a.mp3"}"#));
        let jobs = RemoteJobs::new(&url, 1024);

        assert_eq!(
            jobs.poll(&JobId("1-0".into())).unwrap(),
            JobState::Ready {
                path: "cache/a.mp3".into()
            }
        );
    }

    #[test]
    fn poll_of_unknown_job_is_not_found() {
        let url = serve_once(json("404 Not Found", r#"{"error":"Task not found"}"#));
        let jobs = RemoteJobs::new(&url, 1024);

        let err = jobs.poll(&JobId("missing".into())).unwrap_err();
        assert!(matches!(err, JobError::NotFound(id) if id.0 == "missing"));
    }

    #[test]
    fn fetch_before_ready_is_not_ready() {
        let url = serve_once(json("400 Bad Request", r#"{"error":"Not ready"}"#));
        let jobs = RemoteJobs::new(&url, 1024);
        let dir = tempdir().unwrap();

        let err = jobs
            .fetch(&JobId("1-0".into()), &dir.path().join("a.mp3"))
            .unwrap_err();
        assert!(matches!(err, JobError::NotReady(_)));
    }

    #[test]
    fn fetch_streams_audio_to_destination() {
        let url = serve_once(http_response("200 OK", "audio/mpeg", "ID3 audio"));
        let jobs = RemoteJobs::new(&url, 1024);
        let dir = tempdir().unwrap();
        let dest = dir.path().join("mp3").join("Artist - Song.mp3");

        assert_eq!(jobs.fetch(&JobId("1-0".into()), &dest).unwrap(), dest);
        assert_eq!(fs::read(&dest).unwrap(), b"ID3 audio");
    }

    #[test]
    fn oversized_file_leaves_nothing_behind() {
        let url = serve_once(http_response("200 OK", "audio/mpeg", &"x".repeat(64)));
        let jobs = RemoteJobs::new(&url, 16);
        let dir = tempdir().unwrap();
        let dest = dir.path().join("big.mp3");

        let err = jobs.fetch(&JobId("1-0".into()), &dest).unwrap_err();
        assert!(matches!(err, JobError::Io(_)));
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
