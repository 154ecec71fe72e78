// Errors of document operations

use crate::document::resource::{DocumentId, ScanResource};
use crate::remote::{RemoteError, ScanId};
use crate::xml::CodecError;
use std::fmt;

/// Background operation on a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Save,
    Submit,
    /// One-shot status query of the bound remote scan
    Query,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Load => f.write_str("load"),
            Operation::Save => f.write_str("save"),
            Operation::Submit => f.write_str("submit"),
            Operation::Query => f.write_str("status query"),
        }
    }
}

pub type DocumentResult<T> = Result<T, DocumentError>;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Malformed scan document: {0}")]
    MalformedDocument(String),

    #[error("Scan server unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Scan server rejected the commands: {0}")]
    RejectedCommand(String),

    #[error("Unknown scan #{0}")]
    NotFound(ScanId),

    #[error("Document has no file or scan to save to")]
    NoDestination,

    #[error("A {0} is already in progress")]
    OperationInProgress(Operation),

    #[error("IO error: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("{0} is already open in {1}")]
    AlreadyOpen(ScanResource, DocumentId),

    #[error("Document is closed")]
    Closed,
}

impl From<CodecError> for DocumentError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(io) => DocumentError::IoFailure(io),
            malformed => DocumentError::MalformedDocument(malformed.to_string()),
        }
    }
}

impl From<RemoteError> for DocumentError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::ServiceUnavailable(message) => DocumentError::ServiceUnavailable(message),
            RemoteError::RejectedCommand(message) => DocumentError::RejectedCommand(message),
            RemoteError::NotFound(id) => DocumentError::NotFound(id),
            RemoteError::Codec(codec) => DocumentError::from(codec),
            other @ (RemoteError::InvalidAddress(_) | RemoteError::MalformedResponse(_)) => {
                DocumentError::ServiceUnavailable(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_errors() {
        let malformed = DocumentError::from(CodecError::UnknownCommand("warp".to_string()));
        assert!(matches!(malformed, DocumentError::MalformedDocument(ref m) if m.contains("warp")));

        let io = DocumentError::from(CodecError::Io(std::io::Error::other("disk")));
        assert!(matches!(io, DocumentError::IoFailure(_)));
    }

    #[test]
    fn test_remote_errors() {
        assert!(matches!(
            DocumentError::from(RemoteError::NotFound(ScanId(4))),
            DocumentError::NotFound(ScanId(4))
        ));
        assert!(matches!(
            DocumentError::from(RemoteError::RejectedCommand("no".to_string())),
            DocumentError::RejectedCommand(_)
        ));
        assert!(matches!(
            DocumentError::from(RemoteError::MalformedResponse("junk".to_string())),
            DocumentError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            DocumentError::from(RemoteError::Codec(CodecError::Malformed("x".to_string()))),
            DocumentError::MalformedDocument(_)
        ));
    }
}
