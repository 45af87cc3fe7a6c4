//! Pull Cursor
//!
//! A [`StreamReader`] turns a push [`EventSource`](crate::source::EventSource)
//! into a cursor: each `next()` runs the source on its worker thread until
//! exactly one event has been produced, then parks it again.

mod adapter;
pub mod config;
mod events;
pub mod reader;

use std::fmt;

pub use config::{DiagnosticReporter, EntityResolver, InputFactory, ReaderConfig};
pub use reader::{NamespaceScope, StreamReader};

/// Event kinds reported by the cursor
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    START_DOCUMENT,
    START_ELEMENT,
    CHARACTERS,
    CDATA,
    SPACE,
    COMMENT,
    PROCESSING_INSTRUCTION,
    END_ELEMENT,
    END_DOCUMENT,
    ENTITY_REFERENCE,
    DTD,
    ATTRIBUTE,
    NAMESPACE,
    NOTATION_DECLARATION,
    ENTITY_DECLARATION,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::START_DOCUMENT => "START_DOCUMENT",
            EventType::START_ELEMENT => "START_ELEMENT",
            EventType::CHARACTERS => "CHARACTERS",
            EventType::CDATA => "CDATA",
            EventType::SPACE => "SPACE",
            EventType::COMMENT => "COMMENT",
            EventType::PROCESSING_INSTRUCTION => "PROCESSING_INSTRUCTION",
            EventType::END_ELEMENT => "END_ELEMENT",
            EventType::END_DOCUMENT => "END_DOCUMENT",
            EventType::ENTITY_REFERENCE => "ENTITY_REFERENCE",
            EventType::DTD => "DTD",
            EventType::ATTRIBUTE => "ATTRIBUTE",
            EventType::NAMESPACE => "NAMESPACE",
            EventType::NOTATION_DECLARATION => "NOTATION_DECLARATION",
            EventType::ENTITY_DECLARATION => "ENTITY_DECLARATION",
        }
    }

    /// Text-carrying events that contribute to element text
    #[inline]
    pub fn is_character_data(self) -> bool {
        matches!(
            self,
            EventType::CHARACTERS | EventType::CDATA | EventType::SPACE
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
