//! Reader Errors
//!
//! One error type for the whole crate. Pool and chunk operations favor
//! `Option` sentinels in hot paths; the cursor turns misuse and malformed
//! input into an [`XmlError`].

use std::fmt;
use std::io;

use crate::stream::EventType;

/// Position in the source document
///
/// Lines and columns are 1-based; `offset` is the byte offset into the
/// (UTF-8 converted) input. Tree-backed sources report [`Location::UNKNOWN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl Location {
    /// Location for sources without positional information
    pub const UNKNOWN: Location = Location {
        line: 0,
        column: 0,
        offset: 0,
    };

    pub const fn new(line: u32, column: u32, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    #[inline]
    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "line {}, column {}", self.line, self.column)
        } else {
            f.write_str("unknown location")
        }
    }
}

/// Errors surfaced by the reader
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("malformed XML at {location}: {message}")]
    Malformed { message: String, location: Location },

    #[error("duplicate attribute '{name}'{} at {location}", namespace_suffix(.namespace))]
    DuplicateAttribute {
        name: String,
        namespace: Option<String>,
        location: Location,
    },

    #[error("unexpected {found} while {context} at {location}")]
    UnexpectedEvent {
        found: EventType,
        context: &'static str,
        location: Location,
    },

    #[error("required {expected} but found {found}")]
    Mismatch { expected: String, found: String },

    #[error("{operation} is not valid on {state}")]
    InvalidState {
        operation: &'static str,
        state: EventType,
    },

    #[error("index {index} out of bounds for {what} (count {count})")]
    IndexOutOfBounds {
        what: &'static str,
        index: usize,
        count: usize,
    },

    #[error("no more events: the reader is at END_DOCUMENT")]
    NoMoreEvents,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("reader failed earlier and cannot advance")]
    Failed,

    #[error("reader is closed")]
    Closed,

    #[error("parse worker was interrupted")]
    Interrupted,

    #[error("parse worker panicked")]
    WorkerPanicked,
}

fn namespace_suffix(namespace: &Option<String>) -> String {
    match namespace {
        Some(uri) => format!(" in namespace '{uri}'"),
        None => String::new(),
    }
}

impl XmlError {
    /// Create a malformed-input error at a location
    pub fn malformed(message: impl Into<String>, location: Location) -> Self {
        XmlError::Malformed {
            message: message.into(),
            location,
        }
    }

    /// Location attached to the error, if any
    pub fn location(&self) -> Option<Location> {
        match self {
            XmlError::Malformed { location, .. }
            | XmlError::DuplicateAttribute { location, .. }
            | XmlError::UnexpectedEvent { location, .. } => Some(*location),
            _ => None,
        }
    }
}

/// Crate result alias
pub type Result<T, E = XmlError> = std::result::Result<T, E>;
