// Job status shared between the scheduling side and the worker thread

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Scheduled = 0,
    Running = 1,
    Finished = 2,
    Failed = 3,
}

impl From<u8> for JobStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => JobStatus::Scheduled,
            1 => JobStatus::Running,
            2 => JobStatus::Finished,
            3 => JobStatus::Failed,
            _ => JobStatus::Failed,
        }
    }
}

/// Atomic wrapper to share the status and cancel request between threads
#[derive(Debug, Clone)]
pub struct AtomicJobStatus {
    status: Arc<AtomicU8>,
    cancel_requested: Arc<AtomicBool>,
}

impl AtomicJobStatus {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status: Arc::new(AtomicU8::new(status as u8)),
            cancel_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn get(&self) -> JobStatus {
        JobStatus::from(self.status.load(Ordering::Acquire))
    }

    pub fn set(&self, status: JobStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    pub fn is_done(&self) -> bool {
        matches!(self.get(), JobStatus::Finished | JobStatus::Failed)
    }
}

impl Default for AtomicJobStatus {
    fn default() -> Self {
        Self::new(JobStatus::Scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_shared_between_clones() {
        let status = AtomicJobStatus::default();
        let worker = status.clone();

        worker.set(JobStatus::Running);
        assert_eq!(status.get(), JobStatus::Running);
        assert!(!status.is_done());

        status.request_cancel();
        assert!(worker.is_cancel_requested());

        worker.set(JobStatus::Finished);
        assert!(status.is_done());
    }

    #[test]
    fn test_unknown_value_maps_to_failed() {
        assert_eq!(JobStatus::from(42), JobStatus::Failed);
    }
}
