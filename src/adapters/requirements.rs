//! Append-only requirement store with file-based persistence.
//!
//! Requirements are stored as newline-delimited JSON (JSONL), one file per
//! project, for simplicity and easy inspection. A run's requirements are
//! appended with a single write.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::{RequirementStore, StoreError};
use crate::domain::Requirement;

/// File-based requirement store using JSONL format
pub struct JsonlRequirementStore {
    /// Directory holding one `<project_id>.jsonl` per project
    dir: PathBuf,

    /// Serializes appends from concurrent runs
    write_lock: Mutex<()>,
}

impl JsonlRequirementStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the JSONL file for a project
    pub fn project_path(&self, project_id: &str) -> PathBuf {
        let safe: String = project_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.jsonl", safe))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl RequirementStore for JsonlRequirementStore {
    async fn save_all(&self, requirements: &[Requirement]) -> Result<(), StoreError> {
        if requirements.is_empty() {
            return Ok(());
        }

        // Group by project while keeping order; a run only ever has one
        let mut batches: Vec<(String, String)> = Vec::new();
        for requirement in requirements {
            let line = serde_json::to_string(requirement)?;
            match batches.iter_mut().find(|(p, _)| *p == requirement.project_id) {
                Some((_, buf)) => {
                    buf.push_str(&line);
                    buf.push('\n');
                }
                None => batches.push((requirement.project_id.clone(), format!("{}\n", line))),
            }
        }

        let _guard = self.write_lock.lock().await;

        for (project_id, buf) in batches {
            let path = self.project_path(&project_id);
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;

            file.write_all(buf.as_bytes()).await?;
            file.flush().await?;
        }

        Ok(())
    }

    async fn list(&self, project_id: &str) -> Result<Vec<Requirement>, StoreError> {
        let path = self.project_path(project_id);

        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut requirements = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let requirement: Requirement = serde_json::from_str(&line)?;
            if requirement.project_id == project_id {
                requirements.push(requirement);
            }
        }

        Ok(requirements)
    }
}
