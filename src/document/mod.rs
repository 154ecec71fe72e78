// Scan documents
//
// A `DocumentController` owns one open document: its command model, undo
// log, dirty flag and the file or remote scan it is bound to. Controllers of
// one editor share a `Session` (scan service, job manager, registry of open
// resources, notification channel).

pub mod controller;
pub mod error;
pub mod resource;
pub mod state;

pub use controller::{Completion, DocumentController, OperationSuccess, Session};
pub use error::{DocumentError, DocumentResult, Operation};
pub use resource::{DocumentId, DocumentRegistry, ResourceError, ScanResource};
pub use state::{DocumentState, ScanDocument};

use std::path::Path;

/// File chooser filters as (label, pattern)
pub const FILE_FILTERS: [(&str, &str); 2] = [("All", "*.*"), ("Scan", "*.scn")];

/// Extension of scan files
pub const SCAN_EXTENSION: &str = "scn";

pub fn is_scan_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SCAN_EXTENSION))
}
