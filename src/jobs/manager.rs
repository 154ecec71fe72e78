// JobManager - background work with cooperative cancellation

use crate::jobs::status::{AtomicJobStatus, JobStatus};
use chrono::{DateTime, Utc};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::thread;
use uuid::Uuid;

/// Handed to the unit of work while it runs
///
/// Work is expected to poll [`JobMonitor::is_canceled`] before it publishes a
/// result; nothing interrupts it forcibly.
#[derive(Debug, Clone)]
pub struct JobMonitor {
    name: Arc<str>,
    status: AtomicJobStatus,
    task: Arc<Mutex<String>>,
}

impl JobMonitor {
    /// Describe what the job is doing right now
    pub fn begin_task(&self, task: impl Into<String>) {
        let task = task.into();
        tracing::debug!(job = %self.name, task = %task, "Job task");
        if let Ok(mut current) = self.task.lock() {
            *current = task;
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.status.is_cancel_requested()
    }
}

/// Handle on a scheduled job
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: Uuid,
    name: Arc<str>,
    started: DateTime<Utc>,
    status: AtomicJobStatus,
    task: Arc<Mutex<String>>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> JobStatus {
        self.status.get()
    }

    /// Request cancellation; the work notices on its next check
    pub fn cancel(&self) {
        if !self.status.is_cancel_requested() {
            tracing::debug!(job = %self.name, id = %self.id, "Cancel requested");
        }
        self.status.request_cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.status.is_cancel_requested()
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_done()
    }

    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            name: self.name.to_string(),
            task: self.task.lock().map(|task| task.clone()).unwrap_or_default(),
            status: self.status.get(),
            canceled: self.status.is_cancel_requested(),
            started: self.started,
        }
    }
}

/// Snapshot of a job for display
#[derive(Debug, Clone, PartialEq)]
pub struct JobInfo {
    pub id: Uuid,
    pub name: String,
    pub task: String,
    pub status: JobStatus,
    pub canceled: bool,
    pub started: DateTime<Utc>,
}

/// Runs each scheduled unit of work on its own named worker thread
///
/// Cloning the manager shares the list of active jobs.
#[derive(Debug, Clone, Default)]
pub struct JobManager {
    jobs: Arc<Mutex<Vec<JobHandle>>>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `work` in the background
    ///
    /// # Errors
    /// Returns an error if the worker thread cannot be spawned.
    pub fn schedule<F>(&self, name: impl Into<String>, work: F) -> std::io::Result<JobHandle>
    where
        F: FnOnce(&JobMonitor) + Send + 'static,
    {
        let name: Arc<str> = Arc::from(name.into());
        let handle = JobHandle {
            id: Uuid::new_v4(),
            name: name.clone(),
            started: Utc::now(),
            status: AtomicJobStatus::new(JobStatus::Scheduled),
            task: Arc::new(Mutex::new(String::new())),
        };
        let monitor = JobMonitor {
            name: name.clone(),
            status: handle.status.clone(),
            task: handle.task.clone(),
        };

        thread::Builder::new()
            .name(format!("job: {}", name))
            .spawn(move || {
                monitor.status.set(JobStatus::Running);
                match catch_unwind(AssertUnwindSafe(|| work(&monitor))) {
                    Ok(()) => monitor.status.set(JobStatus::Finished),
                    Err(_) => {
                        tracing::error!(job = %monitor.name, "Job panicked");
                        monitor.status.set(JobStatus::Failed);
                    }
                }
            })?;

        tracing::debug!(job = %name, id = %handle.id, "Job scheduled");
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.retain(|job| !job.is_finished());
            jobs.push(handle.clone());
        }
        Ok(handle)
    }

    /// Jobs that have not finished yet
    pub fn active_jobs(&self) -> Vec<JobInfo> {
        match self.jobs.lock() {
            Ok(mut jobs) => {
                jobs.retain(|job| !job.is_finished());
                jobs.iter().map(JobHandle::info).collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Request cancellation of every active job
    pub fn cancel_all(&self) {
        if let Ok(jobs) = self.jobs.lock() {
            for job in jobs.iter() {
                job.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_job_runs_and_finishes() {
        let manager = JobManager::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let handle = manager
            .schedule("Set flag", move |monitor| {
                monitor.begin_task("Setting");
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap();

        assert!(wait_until(|| handle.is_finished()));
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(handle.status(), JobStatus::Finished);
        assert_eq!(handle.info().task, "Setting");
    }

    #[test]
    fn test_cancel_is_visible_to_work() {
        let manager = JobManager::new();
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let seen = saw_cancel.clone();

        let handle = manager
            .schedule("Wait for cancel", move |monitor| {
                let deadline = Instant::now() + Duration::from_secs(5);
                while !monitor.is_canceled() && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(1));
                }
                seen.store(monitor.is_canceled(), Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(manager.active_jobs().len(), 1);
        handle.cancel();
        assert!(wait_until(|| handle.is_finished()));
        assert!(saw_cancel.load(Ordering::SeqCst));
        assert!(handle.is_canceled());
        assert!(manager.active_jobs().is_empty());
    }

    #[test]
    fn test_panicking_job_is_marked_failed() {
        let manager = JobManager::new();
        let handle = manager
            .schedule("Explode", |_| panic!("boom"))
            .unwrap();

        assert!(wait_until(|| handle.is_finished()));
        assert_eq!(handle.status(), JobStatus::Failed);
    }
}
