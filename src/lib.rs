// Scan Editor - Library exports for the CLI, tests and benchmarks

pub mod config;
pub mod document;
pub mod jobs;
pub mod logging;
pub mod messaging;
pub mod remote;
pub mod scan;
pub mod undo;
pub mod xml;

// Re-export commonly used types for convenience
pub use config::{ConfigError, EditorConfig, ServerConfig};
pub use document::{
    Completion, DocumentController, DocumentError, DocumentState, Operation, OperationSuccess,
    ScanResource, Session,
};
pub use jobs::{JobHandle, JobManager, JobMonitor};
pub use messaging::{Notification, create_notification_channel};
pub use remote::{MemoryScanService, ScanClient, ScanId, ScanInfo, ScanService, ScanState};
pub use scan::{CommandKind, Comparison, ScanCommand, ScanModel, Value};
pub use undo::UndoLog;
pub use xml::CodecError;
