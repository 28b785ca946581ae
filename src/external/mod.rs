//! Collaborators outside the core: recognition API, catalog search and
//! download, media tooling. Each sits behind a trait so the pipeline can be
//! driven by fakes.

use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

use log::debug;
use thiserror::Error;

pub mod catalog;
pub mod downloader;
pub mod media;
pub mod recognizer;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Runs the command to completion and returns its output if it succeeded.
pub fn run_tool(command: &mut Command) -> Result<Output, ToolError> {
    let program = command.get_program().to_string_lossy().to_string();
    debug!("running {command:?}");

    let output = command.output().map_err(|source| ToolError::Spawn {
        program: program.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}

/// The `yt-dlp` executable plus the options every invocation shares.
#[derive(Debug, Clone)]
pub struct YtDlp {
    pub program: PathBuf,
    pub cookies: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>, cookies: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cookies,
        }
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(["--quiet", "--no-warnings", "--no-progress"]);
        if let Some(cookies) = self.cookies.as_deref().filter(|c| c.exists()) {
            command.arg("--cookies").arg(cookies);
        }
        command
    }
}

pub fn is_url(text: &str) -> bool {
    let text = text.trim_start().to_ascii_lowercase();
    text.starts_with("http://") || text.starts_with("https://")
}

/// First file in `dir` with the given extension, in name order.
pub fn find_with_extension(dir: &Path, extension: &str) -> std::io::Result<Option<PathBuf>> {
    let mut found = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .collect::<Vec<_>>();
    found.sort();
    Ok(found.into_iter().next())
}
