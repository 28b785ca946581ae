use rouille::Response;
use serde::Serialize;

use crate::jobs::JobError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound(_) => ApiError::NotFound("task not found".into()),

            JobError::NotReady(_) => ApiError::BadRequest("not ready".into()),

            JobError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ApiError::NotFound("file missing".into())
            }

            JobError::Timeout { .. }
            | JobError::Failed(_)
            | JobError::Backend(_)
            | JobError::Io(_) => ApiError::Internal("internal server error".into()),
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status_code();
        let (ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg)) = self;
        Response::json(&ErrorBody { error: &msg }).with_status_code(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobId;

    #[test]
    fn job_errors_map_to_statuses() {
        let id = JobId("1-0".into());
        assert_eq!(ApiError::from(JobError::NotFound(id.clone())).status_code(), 404);
        assert_eq!(ApiError::from(JobError::NotReady(id)).status_code(), 400);
        assert_eq!(
            ApiError::from(JobError::Io(std::io::ErrorKind::NotFound.into())).status_code(),
            404
        );
        assert_eq!(
            ApiError::from(JobError::Backend("boom".into())).status_code(),
            500
        );
    }
}
