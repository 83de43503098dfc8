use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
    Arc,
  },
  thread,
  time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
  engine::CoreError,
  models::{FileId, Task, TaskInfo, TaskKind},
};

const RUNNING: u8 = 0;
const DONE: u8 = 1;
const FAILED: u8 = 2;
const CANCELLED: u8 = 3;

/// Finished jobs kept around for polling; older ones are dropped when new jobs start.
const KEEP_FINISHED: usize = 64;

/// Shared record of one background job.
#[derive(Debug)]
struct Job {
  id: String,
  kind: TaskKind,
  started_at_ms: i64,
  progress: AtomicU8,
  status: AtomicU8,
  cancel_requested: AtomicBool,
  error: Mutex<Option<String>>,
  opened: Mutex<Vec<FileId>>,
}

impl Job {
  fn snapshot(&self) -> Task {
    let status = self.status.load(Ordering::SeqCst);
    Task {
      id: self.id.clone(),
      kind: self.kind.clone(),
      started_at_ms: self.started_at_ms,
      progress_0_100: self.progress.load(Ordering::SeqCst),
      cancellable: status == RUNNING,
      finished: status != RUNNING,
      cancelled: status == CANCELLED,
      error: self.error.lock().clone(),
      opened: self.opened.lock().clone(),
    }
  }

  fn finish(&self, result: Result<(), CoreError>) {
    let status = match result {
      Ok(()) => DONE,
      Err(CoreError::Cancelled) => CANCELLED,
      Err(e) => {
        warn!(task = %self.id, error = %e, "background task failed");
        *self.error.lock() = Some(e.to_string());
        FAILED
      }
    };
    self.progress.store(100, Ordering::SeqCst);
    self.status.store(status, Ordering::SeqCst);
  }
}

/// What a running job sees of its own task.
pub struct TaskHandle {
  job: Arc<Job>,
}

impl TaskHandle {
  pub fn id(&self) -> &str {
    &self.job.id
  }

  /// Progress stays below 100 until the job returns.
  pub fn set_progress(&self, pct: u8) {
    self.job.progress.store(pct.min(99), Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.job.cancel_requested.load(Ordering::SeqCst)
  }

  pub fn record_opened(&self, file_id: FileId) {
    self.job.opened.lock().push(file_id);
  }
}

/// Holds one of the limited worker slots until dropped.
struct Slot(Arc<AtomicUsize>);

impl Slot {
  fn acquire(running: &Arc<AtomicUsize>, limit: usize) -> Option<Slot> {
    running
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
      .ok()
      .map(|_| Slot(running.clone()))
  }
}

impl Drop for Slot {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

/// Registry of background jobs with a cap on how many run at once.
#[derive(Clone)]
pub(crate) struct TaskRegistry {
  limit: usize,
  keep_finished: usize,
  jobs: Arc<Mutex<HashMap<String, Arc<Job>>>>,
  running: Arc<AtomicUsize>,
}

impl TaskRegistry {
  pub(crate) fn new(max_concurrent: usize) -> Self {
    Self::with_retention(max_concurrent, KEEP_FINISHED)
  }

  pub(crate) fn with_retention(max_concurrent: usize, keep_finished: usize) -> Self {
    Self {
      limit: max_concurrent.max(1),
      keep_finished,
      jobs: Arc::default(),
      running: Arc::default(),
    }
  }

  /// Run `work` on its own thread and track it under a fresh task id.
  pub(crate) fn spawn<F>(&self, kind: TaskKind, work: F) -> Result<TaskInfo, CoreError>
  where
    F: FnOnce(&TaskHandle) -> Result<(), CoreError> + Send + 'static,
  {
    let slot = Slot::acquire(&self.running, self.limit)
      .ok_or_else(|| CoreError::Task(format!("{} tasks already running", self.limit)))?;

    let job = Arc::new(Job {
      id: Uuid::new_v4().to_string(),
      kind: kind.clone(),
      started_at_ms: now_ms(),
      progress: AtomicU8::new(0),
      status: AtomicU8::new(RUNNING),
      cancel_requested: AtomicBool::new(false),
      error: Mutex::new(None),
      opened: Mutex::new(Vec::new()),
    });
    {
      let mut jobs = self.jobs.lock();
      prune_finished(&mut jobs, self.keep_finished);
      jobs.insert(job.id.clone(), job.clone());
    }
    let info = TaskInfo {
      id: job.id.clone(),
      kind,
      cancellable: true,
    };

    let handle = TaskHandle { job };
    thread::spawn(move || {
      let _slot = slot;
      let result = work(&handle);
      handle.job.finish(result);
      debug!(task = %handle.job.id, status = handle.job.status.load(Ordering::SeqCst), "task finished");
    });
    Ok(info)
  }

  pub(crate) fn get(&self, task_id: &str) -> Result<Task, CoreError> {
    Ok(self.job(task_id)?.snapshot())
  }

  /// Ask a running job to stop. Finished jobs cannot be cancelled.
  pub(crate) fn cancel(&self, task_id: &str) -> Result<(), CoreError> {
    let job = self.job(task_id)?;
    if job.status.load(Ordering::SeqCst) != RUNNING {
      return Err(CoreError::Task(format!("task {task_id} already finished")));
    }
    job.cancel_requested.store(true, Ordering::SeqCst);
    Ok(())
  }

  fn job(&self, task_id: &str) -> Result<Arc<Job>, CoreError> {
    self
      .jobs
      .lock()
      .get(task_id)
      .cloned()
      .ok_or_else(|| CoreError::Task(format!("unknown task {task_id}")))
  }
}

/// Drop the oldest finished jobs until at most `keep` remain. Running jobs are never dropped.
fn prune_finished(jobs: &mut HashMap<String, Arc<Job>>, keep: usize) {
  let mut finished: Vec<(i64, String)> = jobs
    .values()
    .filter(|j| j.status.load(Ordering::SeqCst) != RUNNING)
    .map(|j| (j.started_at_ms, j.id.clone()))
    .collect();
  if finished.len() <= keep {
    return;
  }
  finished.sort();
  let excess = finished.len() - keep;
  for (_, id) in finished.into_iter().take(excess) {
    jobs.remove(&id);
  }
  debug!(dropped = excess, "pruned finished tasks");
}

fn now_ms() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}
