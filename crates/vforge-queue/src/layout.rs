//! On-disk storage layout.
//!
//! ```text
//! <root>/sessions/<session>/input/        uploaded sources
//! <root>/sessions/<session>/output/       produced videos
//! <root>/sessions/<session>/queue/        <job>.json, <job>.processing, <job>.reaping
//! <root>/sessions/<session>/completed/    <job>.json
//! <root>/sessions/<session>/failed/       <job>.json
//! ```

use std::path::{Path, PathBuf};

use vforge_models::JobStatus;

use crate::error::{QueueError, QueueResult};

pub const SESSIONS_DIR: &str = "sessions";
pub const INPUT_DIR: &str = "input";
pub const OUTPUT_DIR: &str = "output";
pub const QUEUE_DIR: &str = "queue";
pub const COMPLETED_DIR: &str = "completed";
pub const FAILED_DIR: &str = "failed";

/// Extension of a pending record.
pub const QUEUED_EXT: &str = "json";
/// Extension of a claimed record.
pub const IN_FLIGHT_EXT: &str = "processing";
/// Extension of a record held by the reaper.
pub const REAPING_EXT: &str = "reaping";

/// Resolves every path under a storage root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join(SESSIONS_DIR)
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(session_id)
    }

    pub fn queue_dir(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join(QUEUE_DIR)
    }

    pub fn completed_dir(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join(COMPLETED_DIR)
    }

    pub fn failed_dir(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join(FAILED_DIR)
    }

    /// Directory a record with `status` is finalized into.
    pub fn terminal_dir(&self, session_id: &str, status: JobStatus) -> PathBuf {
        match status {
            JobStatus::Completed => self.completed_dir(session_id),
            _ => self.failed_dir(session_id),
        }
    }

    /// Create all directories of a session.
    pub async fn ensure_session(&self, session_id: &str) -> QueueResult<PathBuf> {
        validate_session_id(session_id)?;
        let dir = self.session_dir(session_id);
        for sub in [INPUT_DIR, OUTPUT_DIR, QUEUE_DIR, COMPLETED_DIR, FAILED_DIR] {
            tokio::fs::create_dir_all(dir.join(sub)).await?;
        }
        Ok(dir)
    }

    /// Ids of all session directories, in no particular order.
    pub async fn session_ids(&self) -> QueueResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(self.sessions_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(ids)
    }
}

/// Whether `name` can be used as a single path component.
pub fn is_plain_name(name: &str) -> bool {
    !(name.trim().is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name == "."
        || name == "..")
}

/// Session ids become directory names and must not escape the sessions dir.
pub fn validate_session_id(session_id: &str) -> QueueResult<()> {
    if !is_plain_name(session_id) {
        return Err(QueueError::InvalidSession(session_id.to_string()));
    }
    Ok(())
}

/// `dir/<base>.<ext>`
pub fn record_path(dir: &Path, base: &str, ext: &str) -> PathBuf {
    dir.join(format!("{base}.{ext}"))
}

/// Whether `path` has extension `ext`.
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e == ext)
}
