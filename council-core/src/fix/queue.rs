//! Persisted correction queue
//!
//! Layout under the queue root:
//!
//! ```text
//! pending/0001.json     waiting to be applied
//! completed/0000.json   applied and validated
//! ```
//!
//! Processing order is file-name order. Completing an instruction moves its
//! record into `completed/`, so a re-run never sees it again.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

use super::instruction::{CorrectionInstruction, RawInstruction};

const PENDING: &str = "pending";
const COMPLETED: &str = "completed";

/// One loaded queue record
#[derive(Debug, Clone)]
pub struct QueuedInstruction {
    /// File stem, e.g. `0007`
    pub id: String,
    pub path: PathBuf,
    pub instruction: CorrectionInstruction,
}

/// Directory-backed instruction queue
#[derive(Debug, Clone)]
pub struct QueueStore {
    root: PathBuf,
}

impl QueueStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pending_dir(&self) -> PathBuf {
        self.root.join(PENDING)
    }

    pub fn completed_dir(&self) -> PathBuf {
        self.root.join(COMPLETED)
    }

    /// Load every pending record, sorted by id
    ///
    /// A record that fails validation aborts the load with `Error::Record`.
    pub fn load_pending(&self) -> Result<Vec<QueuedInstruction>> {
        let mut items = Vec::new();
        for path in record_paths(&self.pending_dir())? {
            let content = std::fs::read_to_string(&path)?;
            let raw: RawInstruction = serde_json::from_str(&content)?;
            let instruction = CorrectionInstruction::try_from(raw).map_err(|source| Error::Record {
                path: path.clone(),
                source,
            })?;
            items.push(QueuedInstruction {
                id: record_id(&path),
                path,
                instruction,
            });
        }
        tracing::debug!(count = items.len(), queue = %self.root.display(), "Loaded pending instructions");
        Ok(items)
    }

    /// Ids already moved to `completed/`
    pub fn completed_ids(&self) -> Result<Vec<String>> {
        Ok(record_paths(&self.completed_dir())?
            .iter()
            .map(|p| record_id(p))
            .collect())
    }

    /// Move a record into `completed/`
    ///
    /// Completing a record that was already moved is a no-op.
    pub fn mark_completed(&self, item: &QueuedInstruction) -> Result<PathBuf> {
        let completed = self.completed_dir();
        std::fs::create_dir_all(&completed)?;

        let file_name = item
            .path
            .file_name()
            .ok_or_else(|| Error::Other(format!("Invalid queue record path: {}", item.path.display())))?;
        let dest = completed.join(file_name);

        if !item.path.exists() && dest.exists() {
            return Ok(dest);
        }
        std::fs::rename(&item.path, &dest)?;
        tracing::debug!(id = %item.id, "Marked instruction completed");
        Ok(dest)
    }

    /// Persist new instructions, high priority first
    ///
    /// Ids continue after the highest id in either partition, so sort
    /// order stays processing order. Returns the new ids.
    pub fn enqueue(&self, mut instructions: Vec<CorrectionInstruction>) -> Result<Vec<String>> {
        let pending = self.pending_dir();
        std::fs::create_dir_all(&pending)?;

        instructions.sort_by_key(|i| i.priority());

        let mut next = self.highest_id()?.map_or(1, |n| n + 1);
        let mut ids = Vec::with_capacity(instructions.len());
        for instruction in &instructions {
            let id = format!("{:04}", next);
            let json = serde_json::to_string_pretty(instruction)?;
            std::fs::write(pending.join(format!("{}.json", id)), json)?;
            ids.push(id);
            next += 1;
        }

        tracing::info!(count = ids.len(), queue = %self.root.display(), "Queued instructions");
        Ok(ids)
    }

    fn highest_id(&self) -> Result<Option<u64>> {
        let mut highest = None;
        for dir in [self.pending_dir(), self.completed_dir()] {
            for path in record_paths(&dir)? {
                if let Some(n) = record_number(&path) {
                    highest = highest.max(Some(n));
                }
            }
        }
        Ok(highest)
    }
}

/// `*.json` files in `dir`, sorted by numeric id; a missing dir is empty
fn record_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    // 10000.json must come after 9999.json
    paths.sort_by_key(|p| (record_number(p).unwrap_or(u64::MAX), p.clone()));
    Ok(paths)
}

fn record_number(path: &Path) -> Option<u64> {
    let id = record_id(path);
    let digits: String = id.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn record_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
