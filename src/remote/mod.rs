// Remote scan service
//
// The scan server executes submitted command sequences and knows them by a
// numeric id. `ScanService` is the client-side contract; `ScanClient` talks
// to a real server over HTTP, `MemoryScanService` keeps everything in
// process for offline editing and tests.
//
// Implementations hold no per-call state and are shared between documents
// through `Arc<dyn ScanService>`. All calls block; concurrency is added by
// the document controller.

pub mod client;
pub mod memory;
pub mod protocol;

pub use client::ScanClient;
pub use memory::MemoryScanService;

use crate::scan::ScanCommand;
use crate::xml::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identity the scan server assigns to a submitted scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScanId(pub u64);

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution state of a scan on the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    Idle,
    Running,
    Paused,
    Aborted,
    Failed,
    Finished,
    Logged,
}

impl ScanState {
    pub fn parse(text: &str) -> Option<Self> {
        let state = match text.trim() {
            "Idle" => ScanState::Idle,
            "Running" => ScanState::Running,
            "Paused" => ScanState::Paused,
            "Aborted" => ScanState::Aborted,
            "Failed" => ScanState::Failed,
            "Finished" => ScanState::Finished,
            "Logged" => ScanState::Logged,
            _ => return None,
        };
        Some(state)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScanState::Idle => "Idle",
            ScanState::Running => "Running",
            ScanState::Paused => "Paused",
            ScanState::Aborted => "Aborted",
            ScanState::Failed => "Failed",
            ScanState::Finished => "Finished",
            ScanState::Logged => "Logged",
        }
    }

    /// Still queued or executing
    pub fn is_active(self) -> bool {
        matches!(self, ScanState::Idle | ScanState::Running | ScanState::Paused)
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status snapshot of one scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanInfo {
    pub id: ScanId,
    pub name: String,
    pub state: ScanState,
    /// Progress 0..=100 when the server reports it
    pub percentage: Option<u8>,
    pub error: Option<String>,
}

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Scan server unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Scan server rejected the commands: {0}")]
    RejectedCommand(String),

    #[error("Unknown scan #{0}")]
    NotFound(ScanId),

    #[error("Invalid scan server address: {0}")]
    InvalidAddress(String),

    #[error("Invalid response from scan server: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Client-side contract of the scan server
pub trait ScanService: Send + Sync {
    /// Submit commands for execution; every call allocates a new id
    fn submit(&self, name: &str, commands: &[ScanCommand]) -> RemoteResult<ScanId>;

    /// Commands of a previously submitted scan
    fn fetch(&self, id: ScanId) -> RemoteResult<Vec<ScanCommand>>;

    /// One-shot status query, there is no progress subscription
    fn query_status(&self, id: ScanId) -> RemoteResult<ScanInfo>;
}
