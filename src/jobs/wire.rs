//! JSON bodies of the download backend. Backend states map 1:1 onto [`JobState`].

use serde::{Deserialize, Serialize};

use super::{JobError, JobId, JobState};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_READY: &str = "ready";
pub const STATUS_ERROR: &str = "error";

/// answer to `POST /download`
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedBody {
    #[serde(alias = "taskId")]
    pub task_id: String,
    pub status: String,
}

impl CreatedBody {
    pub fn pending(id: &JobId) -> Self {
        Self {
            task_id: id.0.clone(),
            status: STATUS_PENDING.to_string(),
        }
    }
}

/// answer to `GET /status/<id>`
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusBody {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl From<&JobState> for StatusBody {
    fn from(state: &JobState) -> Self {
        match state {
            JobState::Pending => Self {
                status: STATUS_PENDING.to_string(),
                file: None,
                msg: None,
            },
            JobState::Ready { path } => Self {
                status: STATUS_READY.to_string(),
                file: Some(path.to_string_lossy().to_string()),
                msg: None,
            },
            JobState::Failed { message } => Self {
                status: STATUS_ERROR.to_string(),
                file: None,
                msg: Some(message.clone()),
            },
        }
    }
}

impl TryFrom<StatusBody> for JobState {
    type Error = JobError;

    fn try_from(body: StatusBody) -> Result<Self, Self::Error> {
        match body.status.as_str() {
            STATUS_PENDING => Ok(JobState::Pending),
            STATUS_READY => body
                .file
                .map(|file| JobState::Ready { path: file.into() })
                .ok_or_else(|| JobError::Backend("ready job without a file".to_string())),
            STATUS_ERROR => Ok(JobState::Failed {
                message: body.msg.unwrap_or_else(|| "unknown error".to_string()),
            }),
            other => Err(JobError::Backend(format!("unknown job status '{other}'"))),
        }
    }
}
