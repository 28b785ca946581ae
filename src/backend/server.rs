use log::{debug, info};
use rouille::{Request, Response};
use std::{path::Path, sync::Arc};

use crate::{
    backend::error::ApiError,
    config::HttpConfig,
    jobs::{
        JobError, JobId, JobOrchestrator, JobState,
        wire::{CreatedBody, StatusBody},
    },
};

/// Download backend: starts jobs and hands out their files.
pub struct BackendServer {
    jobs: Arc<dyn JobOrchestrator>,
    pub config: HttpConfig,
}

impl BackendServer {
    pub fn new(jobs: Arc<dyn JobOrchestrator>, config: HttpConfig) -> Self {
        Self { jobs, config }
    }

    pub fn run(self) {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        rouille::start_server(addr, move |request| self.handle_request(request));
    }

    fn handle_request(&self, request: &Request) -> Response {
        Self::log_request(request);

        let response = rouille::router!(request,
            (POST) (/download) => {
                self.handle_download(request)
            },
            (GET) (/download) => {
                self.handle_download(request)
            },
            (GET) (/status/{id: String}) => {
                self.handle_status(JobId(id))
            },
            (GET) (/file/{id: String}) => {
                self.handle_file(JobId(id))
            },
            _ => Response::empty_404()
        );

        info!("Response: {} {} {}", request.method(), request.url(), response.status_code);
        response
    }

    fn log_request(request: &Request) {
        info!("{} {}", request.method(), request.raw_url());
    }

    fn handle_download(&self, request: &Request) -> Response {
        let query = match request.get_param("q").filter(|q| !q.trim().is_empty()) {
            Some(q) => q,
            None => return ApiError::BadRequest("missing query".into()).into_response(),
        };

        match self.jobs.create(query.trim()) {
            Ok(id) => Response::json(&CreatedBody::pending(&id)),
            Err(e) => ApiError::from(e).into_response(),
        }
    }

    fn handle_status(&self, id: JobId) -> Response {
        match self.jobs.poll(&id) {
            Ok(state) => Response::json(&StatusBody::from(&state)),
            Err(e) => ApiError::from(e).into_response(),
        }
    }

    fn ready_file(&self, id: &JobId) -> Result<Response, ApiError> {
        let path = match self.jobs.poll(id) {
            Ok(JobState::Ready { path }) => path,
            // unknown jobs are simply never ready here
            Ok(_) | Err(JobError::NotFound(_)) => {
                return Err(ApiError::from(JobError::NotReady(id.clone())));
            }
            Err(e) => return Err(e.into()),
        };

        let file = std::fs::File::open(&path).map_err(JobError::Io)?;
        let mime = Self::mime_for_audio(&path);
        debug!(
            "FILE {} -> 200 OK, path: {}, MIME type: {}",
            id,
            path.to_string_lossy(),
            mime
        );

        Ok(Response::from_file(mime, file).with_content_disposition_attachment(&format!("{id}.mp3")))
    }

    fn handle_file(&self, id: JobId) -> Response {
        match self.ready_file(&id) {
            Ok(r) => r,
            Err(e) => e.into_response(),
        }
    }

    fn mime_for_audio(path: &Path) -> String {
        let ext = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase());
        let default = || {
            mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string()
        };
        ext.and_then(|ext| Self::mime_from_ext(ext.as_str()))
            .unwrap_or_else(default)
    }

    /// Map file extension (without dot) to the MIME type players expect.
    pub fn mime_from_ext(ext: &str) -> Option<String> {
        match ext {
            "m4a" => Some("audio/x-m4a".to_string()),
            "mp3" => Some("audio/mpeg".to_string()),
            "opus" => Some("audio/opus".to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
pub fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: rouille::Response,
) -> anyhow::Result<T> {
    Ok(serde_json::from_reader(
        response.data.into_reader_and_size().0,
    )?)
}
