// Scan command model
//
// ScanCommand is a tree-shaped value type; ScanModel holds the ordered
// top-level list of one document and is only ever changed by replacing the
// whole list.

pub mod model;
pub mod types;

pub use model::{ListenerId, ScanModel, SequenceChange};
pub use types::{CommandKind, Comparison, ScanCommand, Value, devices, outline, total_count};
