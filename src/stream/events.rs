//! Owned events passed from the worker to the cursor

use crate::error::Location;
use crate::source::{DoctypeDeclaration, XmlDeclaration};

use super::EventType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawAttribute {
    pub name: String,
    pub value: String,
    pub att_type: &'static str,
    pub specified: bool,
    pub enumeration: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RawEvent {
    StartDocument(XmlDeclaration),
    EndDocument,
    StartElement {
        name: String,
        attributes: Vec<RawAttribute>,
    },
    EndElement {
        name: String,
    },
    /// CHARACTERS, CDATA, SPACE or COMMENT
    Text {
        kind: EventType,
        text: String,
    },
    ProcessingInstruction {
        target: String,
        data: String,
    },
    EntityReference {
        name: String,
        replacement: Option<String>,
    },
    Dtd(Box<DoctypeDeclaration>),
}

impl RawEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            RawEvent::StartDocument(_) => EventType::START_DOCUMENT,
            RawEvent::EndDocument => EventType::END_DOCUMENT,
            RawEvent::StartElement { .. } => EventType::START_ELEMENT,
            RawEvent::EndElement { .. } => EventType::END_ELEMENT,
            RawEvent::Text { kind, .. } => *kind,
            RawEvent::ProcessingInstruction { .. } => EventType::PROCESSING_INSTRUCTION,
            RawEvent::EntityReference { .. } => EventType::ENTITY_REFERENCE,
            RawEvent::Dtd(_) => EventType::DTD,
        }
    }
}

/// One handshake step's payload
#[derive(Debug)]
pub(crate) struct Delivered {
    pub event: RawEvent,
    pub location: Location,
}
