use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::utils::atomic::write_atomic;

use super::{Checkpoint, QueueError, TaskPacket, TaskSpec, TaskStatus};

#[derive(Serialize, Debug, Clone, Copy)]
pub struct QueueStats {
    pub total_tasks: usize,
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

/// Durable task queue under `<workspace>/queue/`.
///
/// Three artifacts: `tasks.jsonl` (one line per task, rewritten wholesale on
/// state changes), `checkpoints/<task_id>.md`, and `active_task.json` (the
/// pointer to the one running task, absent when the worker is idle).
pub struct TaskQueue {
    queue_dir: PathBuf,
    tasks_file: PathBuf,
    checkpoints_dir: PathBuf,
    active_task_file: PathBuf,
    tasks: BTreeMap<String, TaskPacket>,
}

impl TaskQueue {
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, QueueError> {
        let queue_dir = workspace_root.as_ref().join("queue");
        let checkpoints_dir = queue_dir.join("checkpoints");
        fs::create_dir_all(&checkpoints_dir)?;

        let mut queue = Self {
            tasks_file: queue_dir.join("tasks.jsonl"),
            active_task_file: queue_dir.join("active_task.json"),
            queue_dir,
            checkpoints_dir,
            tasks: BTreeMap::new(),
        };
        queue.load_tasks()?;
        Ok(queue)
    }

    pub fn queue_dir(&self) -> &Path {
        &self.queue_dir
    }

    fn load_tasks(&mut self) -> Result<(), QueueError> {
        if !self.tasks_file.exists() {
            log::info!("No existing tasks file found");
            return Ok(());
        }
        let raw = fs::read_to_string(&self.tasks_file)?;
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TaskPacket>(line) {
                Ok(task) => {
                    self.tasks.insert(task.task_id.clone(), task);
                }
                Err(e) => log::warn!("Skipping malformed task line: {}", e),
            }
        }
        log::info!("Loaded {} tasks from queue", self.tasks.len());
        Ok(())
    }

    /// Add a task. Ids are assigned by position: `task_0001`, `task_0002`, …
    /// The new packet is appended as one JSONL line.
    pub fn add_task(&mut self, spec: TaskSpec) -> Result<String, QueueError> {
        let task_id = format!("task_{:04}", self.tasks.len() + 1);
        let now = Utc::now().to_rfc3339();

        let task = TaskPacket {
            task_id: task_id.clone(),
            parent_id: spec.parent_id,
            objective: spec.objective,
            inputs: spec.inputs,
            acceptance: spec.acceptance,
            budget: spec.budget,
            status: TaskStatus::Queued,
            created_at: now.clone(),
            updated_at: now,
            metadata: spec.metadata,
        };

        let mut line = serde_json::to_string(&task)?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.tasks_file)?
            .write_all(line.as_bytes())?;

        log::info!("Added task {}: {}", task_id, truncated(&task.objective));
        self.tasks.insert(task_id.clone(), task);
        Ok(task_id)
    }

    /// Pop the first queued task in insertion order: flip it to running,
    /// rewrite the log, and write the active-task pointer. `None` when the
    /// queue is empty.
    pub fn get_next(&mut self) -> Result<Option<TaskPacket>, QueueError> {
        let next_id = self
            .tasks
            .values()
            .find(|t| t.status == TaskStatus::Queued)
            .map(|t| t.task_id.clone());

        let Some(task_id) = next_id else {
            log::info!("No queued tasks available");
            return Ok(None);
        };

        let Some(task) = self.tasks.get_mut(&task_id) else {
            return Err(QueueError::TaskNotFound(task_id));
        };
        task.status = TaskStatus::Running;
        task.updated_at = Utc::now().to_rfc3339();
        let snapshot = task.clone();

        self.rewrite_log()?;
        write_atomic(
            &self.active_task_file,
            &serde_json::to_vec_pretty(&snapshot)?,
        )?;

        log::info!("Starting task {}", task_id);
        Ok(Some(snapshot))
    }

    pub fn mark_done(
        &mut self,
        task_id: &str,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<(), QueueError> {
        self.finish(task_id, TaskStatus::Done, None, checkpoint)
    }

    pub fn mark_failed(
        &mut self,
        task_id: &str,
        error: &str,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<(), QueueError> {
        self.finish(task_id, TaskStatus::Failed, Some(error), checkpoint)
    }

    fn finish(
        &mut self,
        task_id: &str,
        status: TaskStatus,
        error: Option<&str>,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<(), QueueError> {
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| QueueError::TaskNotFound(task_id.to_string()))?;

        if task.status.is_terminal() {
            return Err(QueueError::AlreadyTerminal {
                task_id: task_id.to_string(),
                status: task.status,
            });
        }

        task.status = status;
        task.updated_at = Utc::now().to_rfc3339();
        if let Some(error) = error {
            task.metadata
                .insert("error".into(), Value::String(error.to_string()));
        }
        self.rewrite_log()?;

        if let Some(checkpoint) = checkpoint {
            self.save_checkpoint(checkpoint)?;
        }

        self.clear_active_if(task_id);

        match error {
            Some(error) => log::info!("Marked task {} as failed: {}", task_id, error),
            None => log::info!("Marked task {} as done", task_id),
        }
        Ok(())
    }

    /// Delete the active pointer only when it names this task.
    fn clear_active_if(&self, task_id: &str) {
        if !self.active_task_file.exists() {
            return;
        }
        let matches = fs::read(&self.active_task_file)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<TaskPacket>(&bytes).ok())
            .map(|active| active.task_id == task_id)
            .unwrap_or(true);
        if matches {
            let _ = fs::remove_file(&self.active_task_file);
        }
    }

    /// Rewrite `tasks.jsonl` wholesale so readers observe the transition.
    fn rewrite_log(&self) -> Result<(), QueueError> {
        let mut out = String::new();
        for task in self.tasks.values() {
            out.push_str(&serde_json::to_string(task)?);
            out.push('\n');
        }
        write_atomic(&self.tasks_file, out.as_bytes())?;
        Ok(())
    }

    /// Write a checkpoint markdown file; also usable mid-task.
    pub fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<PathBuf, QueueError> {
        let path = self.checkpoints_dir.join(format!("{}.md", checkpoint.task_id));
        fs::write(&path, checkpoint.to_markdown())?;
        log::info!("Saved checkpoint for task {}", checkpoint.task_id);
        Ok(path)
    }

    pub fn checkpoint_path(&self, task_id: &str) -> PathBuf {
        self.checkpoints_dir.join(format!("{}.md", task_id))
    }

    /// The task named by the active pointer, reconstructible from the log if
    /// the pointer is missing.
    pub fn active_task(&self) -> Option<TaskPacket> {
        if let Ok(bytes) = fs::read(&self.active_task_file) {
            if let Ok(task) = serde_json::from_slice::<TaskPacket>(&bytes) {
                return Some(task);
            }
        }
        self.tasks
            .values()
            .find(|t| t.status == TaskStatus::Running)
            .cloned()
    }

    pub fn get_task(&self, task_id: &str) -> Option<&TaskPacket> {
        self.tasks.get(task_id)
    }

    pub fn list_tasks(&self, status: Option<TaskStatus>) -> Vec<&TaskPacket> {
        self.tasks
            .values()
            .filter(|t| status.map(|s| t.status == s).unwrap_or(true))
            .collect()
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total_tasks: self.tasks.len(),
            queued: 0,
            running: 0,
            done: 0,
            failed: 0,
        };
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Queued => stats.queued += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Done => stats.done += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

fn truncated(s: &str) -> String {
    crate::utils::helper::truncate(s, 50)
}
