// XML codec for scan documents
//
// Durable format of `.scn` files and the wire body exchanged with the scan
// server:
//
// <?xml version="1.0" encoding="UTF-8"?>
// <commands>
//   <move><device>x</device><value>5</value></move>
//   <loop>
//     <device>y</device><start>0</start><end>10</end><step>1</step>
//     <body>
//       <wait><seconds>2</seconds></wait>
//     </body>
//   </loop>
// </commands>

pub mod reader;
pub mod writer;

pub use reader::{decode, decode_str};
pub use writer::{encode, encode_string};

/// Name of the document root element
pub const ROOT_ELEMENT: &str = "commands";

/// Name of the element holding the children of a block command
pub const BODY_ELEMENT: &str = "body";

/// Deepest element nesting read or written, the root element being level 1
///
/// Each block command takes two levels (command and body), so this allows
/// about 125 nested blocks.
pub const MAX_DEPTH: usize = 256;

pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while decoding or encoding a scan document
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed scan document: {0}")]
    Malformed(String),

    #[error("Unknown scan command <{0}>")]
    UnknownCommand(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// True for every error caused by the document content rather than I/O
    pub fn is_malformed(&self) -> bool {
        matches!(self, CodecError::Malformed(_) | CodecError::UnknownCommand(_))
    }
}

impl From<quick_xml::Error> for CodecError {
    fn from(err: quick_xml::Error) -> Self {
        match err {
            quick_xml::Error::Io(io) => CodecError::Io(std::io::Error::new(io.kind(), io.to_string())),
            other => CodecError::Malformed(other.to_string()),
        }
    }
}
