// Background jobs
//
// `JobManager::schedule(description, work)` runs a unit of work on a worker
// thread and returns a `JobHandle` supporting cooperative cancellation.

pub mod manager;
pub mod status;

pub use manager::{JobHandle, JobInfo, JobManager, JobMonitor};
pub use status::{AtomicJobStatus, JobStatus};
