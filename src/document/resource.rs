// Backing resources of scan documents and the registry of open ones

use crate::remote::ScanId;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Identity of one open document within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        DocumentId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "document {}", self.0)
    }
}

/// Where a document is loaded from and saved to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScanResource {
    File(PathBuf),
    Remote(ScanId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    #[error("Empty resource descriptor")]
    Empty,

    #[error("Invalid scan id in '{0}'")]
    InvalidScanId(String),
}

impl ScanResource {
    pub const SCAN_SCHEME: &'static str = "scan:";
    pub const FILE_SCHEME: &'static str = "file://";

    /// Resolve a textual descriptor
    ///
    /// `scan://42` or `scan:42` name a remote scan, `file:///path` or a plain
    /// path a local file.
    pub fn parse(descriptor: &str) -> Result<Self, ResourceError> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(ResourceError::Empty);
        }
        if let Some(rest) = descriptor.strip_prefix(Self::SCAN_SCHEME) {
            let id = rest.trim_start_matches('/');
            return id
                .parse::<u64>()
                .map(|id| ScanResource::Remote(ScanId(id)))
                .map_err(|_| ResourceError::InvalidScanId(descriptor.to_string()));
        }
        let path = descriptor
            .strip_prefix(Self::FILE_SCHEME)
            .unwrap_or(descriptor);
        Ok(ScanResource::File(PathBuf::from(path)))
    }

    /// Short name for titles and scan submission
    pub fn display_name(&self) -> String {
        match self {
            ScanResource::File(path) => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            ScanResource::Remote(id) => format!("Scan #{}", id),
        }
    }

    pub fn as_file(&self) -> Option<&Path> {
        match self {
            ScanResource::File(path) => Some(path),
            ScanResource::Remote(_) => None,
        }
    }

    pub fn as_remote(&self) -> Option<ScanId> {
        match self {
            ScanResource::Remote(id) => Some(*id),
            ScanResource::File(_) => None,
        }
    }
}

impl fmt::Display for ScanResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanResource::File(path) => write!(f, "{}{}", Self::FILE_SCHEME, path.display()),
            ScanResource::Remote(id) => write!(f, "scan://{}", id),
        }
    }
}

/// Absolute form of a path so that two spellings of the same file match
///
/// Files that do not exist yet are resolved through their parent directory.
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            match std::fs::canonicalize(parent) {
                Ok(parent) => parent.join(name),
                Err(_) => path.to_path_buf(),
            }
        }
        _ => path.to_path_buf(),
    }
}

/// Which document holds which resource
///
/// Shared by all documents of a session so that a second request to open a
/// resource finds the document that already has it, even while that
/// document is still loading.
#[derive(Debug, Clone, Default)]
pub struct DocumentRegistry {
    open: Arc<Mutex<HashMap<ScanResource, DocumentId>>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `resource` to `document`
    ///
    /// Returns the current owner if another document already holds it.
    pub fn claim(&self, resource: &ScanResource, document: DocumentId) -> Result<(), DocumentId> {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        match open.get(resource) {
            Some(owner) if *owner != document => Err(*owner),
            _ => {
                open.insert(resource.clone(), document);
                Ok(())
            }
        }
    }

    /// Release `resource` if `document` holds it
    pub fn release(&self, resource: &ScanResource, document: DocumentId) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if open.get(resource) == Some(&document) {
            open.remove(resource);
        }
    }

    pub fn release_all(&self, document: DocumentId) {
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, owner| *owner != document);
    }

    pub fn lookup(&self, resource: &ScanResource) -> Option<DocumentId> {
        self.open.lock().ok()?.get(resource).copied()
    }

    pub fn len(&self) -> usize {
        self.open.lock().map(|open| open.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_descriptors() {
        assert_eq!(
            ScanResource::parse("scan://42").unwrap(),
            ScanResource::Remote(ScanId(42))
        );
        assert_eq!(
            ScanResource::parse("scan:7").unwrap(),
            ScanResource::Remote(ScanId(7))
        );
        assert_eq!(
            ScanResource::parse("file:///tmp/a.scn").unwrap(),
            ScanResource::File(PathBuf::from("/tmp/a.scn"))
        );
        assert_eq!(
            ScanResource::parse("relative/b.scn").unwrap(),
            ScanResource::File(PathBuf::from("relative/b.scn"))
        );
        assert_eq!(ScanResource::parse("  "), Err(ResourceError::Empty));
        assert!(matches!(
            ScanResource::parse("scan://abc"),
            Err(ResourceError::InvalidScanId(_))
        ));
    }

    #[test]
    fn test_display_round_trip() {
        for resource in [
            ScanResource::Remote(ScanId(12)),
            ScanResource::File(PathBuf::from("/data/scans/align.scn")),
        ] {
            assert_eq!(ScanResource::parse(&resource.to_string()).unwrap(), resource);
        }
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            ScanResource::File(PathBuf::from("/data/align.scn")).display_name(),
            "align"
        );
        assert_eq!(ScanResource::Remote(ScanId(3)).display_name(), "Scan #3");
    }

    #[test]
    fn test_registry_claims() {
        let registry = DocumentRegistry::new();
        let first = DocumentId::next();
        let second = DocumentId::next();
        let resource = ScanResource::Remote(ScanId(1));

        assert_eq!(registry.claim(&resource, first), Ok(()));
        // Re-claim by the owner is fine
        assert_eq!(registry.claim(&resource, first), Ok(()));
        assert_eq!(registry.claim(&resource, second), Err(first));
        assert_eq!(registry.lookup(&resource), Some(first));

        // Only the owner can release
        registry.release(&resource, second);
        assert_eq!(registry.lookup(&resource), Some(first));
        registry.release_all(first);
        assert!(registry.is_empty());
        assert_eq!(registry.claim(&resource, second), Ok(()));
    }

    #[test]
    fn test_normalize_path_of_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.scn");
        let normalized = normalize_path(&path);
        assert_eq!(normalized.file_name().unwrap(), "new.scn");
        assert_eq!(
            normalized.parent().unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }
}
