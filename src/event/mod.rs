//! Event Objects
//!
//! Owned snapshots of cursor events. An [`EventReader`] wraps a
//! [`StreamReader`] and hands out one [`XmlEvent`] per step, which makes
//! the stream usable with iterator adapters and lookahead.

use std::fmt;

use crate::error::{Result, XmlError};
use crate::stream::{EventType, StreamReader};

/// Element or attribute name with its resolved namespace
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QualifiedName {
    pub local_name: String,
    pub prefix: Option<String>,
    pub namespace: Option<String>,
}

impl QualifiedName {
    /// Unprefixed name in no namespace
    pub fn local(name: impl Into<String>) -> Self {
        QualifiedName {
            local_name: name.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{prefix}:{}", self.local_name),
            None => f.write_str(&self.local_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedAttribute {
    pub name: QualifiedName,
    pub value: String,
    pub att_type: &'static str,
    /// False when the value was defaulted from the DTD
    pub specified: bool,
}

/// A namespace declared on a start tag; `prefix` is `None` for the default namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub prefix: Option<String>,
    pub uri: String,
}

/// One parsing event, detached from the reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    StartDocument {
        version: Option<String>,
        encoding: Option<String>,
        standalone: Option<bool>,
    },
    EndDocument,
    StartElement {
        name: QualifiedName,
        attributes: Vec<OwnedAttribute>,
        namespaces: Vec<Namespace>,
    },
    EndElement {
        name: QualifiedName,
    },
    Characters(String),
    CData(String),
    Space(String),
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
    EntityReference {
        name: String,
        text: Option<String>,
    },
    /// Full text of the DOCTYPE declaration
    Dtd(String),
}

impl XmlEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            XmlEvent::StartDocument { .. } => EventType::START_DOCUMENT,
            XmlEvent::EndDocument => EventType::END_DOCUMENT,
            XmlEvent::StartElement { .. } => EventType::START_ELEMENT,
            XmlEvent::EndElement { .. } => EventType::END_ELEMENT,
            XmlEvent::Characters(_) => EventType::CHARACTERS,
            XmlEvent::CData(_) => EventType::CDATA,
            XmlEvent::Space(_) => EventType::SPACE,
            XmlEvent::Comment(_) => EventType::COMMENT,
            XmlEvent::ProcessingInstruction { .. } => EventType::PROCESSING_INSTRUCTION,
            XmlEvent::EntityReference { .. } => EventType::ENTITY_REFERENCE,
            XmlEvent::Dtd(_) => EventType::DTD,
        }
    }

    #[inline]
    pub fn is_start_element(&self) -> bool {
        matches!(self, XmlEvent::StartElement { .. })
    }

    #[inline]
    pub fn is_end_element(&self) -> bool {
        matches!(self, XmlEvent::EndElement { .. })
    }

    /// Text-only events made of XML whitespace
    pub fn is_white_space(&self) -> bool {
        match self {
            XmlEvent::Space(_) => true,
            XmlEvent::Characters(text) | XmlEvent::CData(text) => {
                text.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
            }
            _ => false,
        }
    }
}

/// Iterator-style reader producing owned events
///
/// ```
/// use xmlcursor::{EventReader, StreamReader, XmlEvent};
///
/// let reader = EventReader::new(StreamReader::from_str("<a>hi</a>").unwrap());
/// let texts: Vec<String> = reader
///     .filter_map(|event| match event.unwrap() {
///         XmlEvent::Characters(text) => Some(text),
///         _ => None,
///     })
///     .collect();
/// assert_eq!(texts, vec!["hi"]);
/// ```
pub struct EventReader {
    reader: StreamReader,
    peeked: Option<XmlEvent>,
    /// START_DOCUMENT is the cursor's initial state and has not been handed out
    started: bool,
    /// Type of the last event returned by `next_event`
    last: Option<EventType>,
    /// Set after an error so iteration stops
    done: bool,
}

impl EventReader {
    pub fn new(reader: StreamReader) -> Self {
        EventReader {
            reader,
            peeked: None,
            started: false,
            last: None,
            done: false,
        }
    }

    pub fn has_next(&self) -> bool {
        self.peeked.is_some() || !self.started || self.reader.has_next()
    }

    /// The next event; START_DOCUMENT comes first
    pub fn next_event(&mut self) -> Result<XmlEvent> {
        let event = match self.peeked.take() {
            Some(event) => event,
            None => self.advance()?,
        };
        self.last = Some(event.event_type());
        Ok(event)
    }

    /// Look at the next event without consuming it
    pub fn peek(&mut self) -> Result<Option<&XmlEvent>> {
        if self.peeked.is_none() && self.has_next() {
            self.peeked = Some(self.advance()?);
        }
        Ok(self.peeked.as_ref())
    }

    /// Text content of the element whose START_ELEMENT was just returned
    pub fn element_text(&mut self) -> Result<String> {
        if self.last != Some(EventType::START_ELEMENT) {
            return Err(XmlError::InvalidState {
                operation: "element_text",
                state: self.last.unwrap_or(EventType::START_DOCUMENT),
            });
        }

        let mut text = String::new();
        loop {
            match self.next_event()? {
                XmlEvent::Characters(t) | XmlEvent::CData(t) | XmlEvent::Space(t) => text.push_str(&t),
                XmlEvent::EntityReference { text: Some(t), .. } => text.push_str(&t),
                XmlEvent::EntityReference { text: None, .. }
                | XmlEvent::Comment(_)
                | XmlEvent::ProcessingInstruction { .. } => {}
                XmlEvent::EndElement { .. } => return Ok(text),
                other => {
                    return Err(XmlError::UnexpectedEvent {
                        found: other.event_type(),
                        context: "reading element text",
                        location: self.reader.location(),
                    })
                }
            }
        }
    }

    /// Skip whitespace, comments and processing instructions up to the next tag
    ///
    /// START_DOCUMENT is skipped too, so a fresh reader goes straight to the root.
    pub fn next_tag(&mut self) -> Result<XmlEvent> {
        loop {
            let event = self.next_event()?;
            match event {
                XmlEvent::StartElement { .. } | XmlEvent::EndElement { .. } => return Ok(event),
                XmlEvent::StartDocument { .. } | XmlEvent::Comment(_) | XmlEvent::ProcessingInstruction { .. } => {}
                ref text if text.is_white_space() => {}
                other => {
                    return Err(XmlError::UnexpectedEvent {
                        found: other.event_type(),
                        context: "looking for a start or end tag",
                        location: self.reader.location(),
                    })
                }
            }
        }
    }

    pub fn close(&mut self) -> Result<()> {
        self.peeked = None;
        self.reader.close()
    }

    /// The underlying cursor
    pub fn reader(&self) -> &StreamReader {
        &self.reader
    }

    fn advance(&mut self) -> Result<XmlEvent> {
        if !self.started {
            self.started = true;
        } else {
            self.reader.next()?;
        }
        snapshot(&mut self.reader)
    }
}

impl Iterator for EventReader {
    type Item = Result<XmlEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || !self.has_next() {
            return None;
        }
        let event = self.next_event();
        self.done = event.is_err();
        Some(event)
    }
}

fn element_name(reader: &StreamReader) -> Result<QualifiedName> {
    Ok(QualifiedName {
        local_name: reader.local_name()?.to_string(),
        prefix: reader.prefix()?.map(str::to_string),
        namespace: reader.namespace_uri()?.map(str::to_string),
    })
}

/// Copy the cursor's current event
fn snapshot(reader: &mut StreamReader) -> Result<XmlEvent> {
    let event = match reader.event_type() {
        EventType::START_DOCUMENT => XmlEvent::StartDocument {
            version: reader.version().map(str::to_string),
            encoding: reader.encoding().map(str::to_string),
            standalone: reader.standalone_set().then(|| reader.is_standalone()),
        },
        EventType::END_DOCUMENT => XmlEvent::EndDocument,
        EventType::START_ELEMENT => {
            let attributes = (0..reader.attribute_count()?)
                .map(|i| -> Result<OwnedAttribute> {
                    Ok(OwnedAttribute {
                        name: QualifiedName {
                            local_name: reader.attribute_local_name(i)?.to_string(),
                            prefix: reader.attribute_prefix(i)?.map(str::to_string),
                            namespace: reader.attribute_namespace(i)?.map(str::to_string),
                        },
                        value: reader.attribute_value(i)?.to_string(),
                        att_type: reader.attribute_type(i)?,
                        specified: reader.is_attribute_specified(i)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let namespaces = (0..reader.namespace_count()?)
                .map(|i| -> Result<Namespace> {
                    Ok(Namespace {
                        prefix: reader.namespace_prefix(i)?.map(str::to_string),
                        uri: reader.namespace_uri_at(i)?.to_string(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            XmlEvent::StartElement {
                name: element_name(reader)?,
                attributes,
                namespaces,
            }
        }
        EventType::END_ELEMENT => XmlEvent::EndElement {
            name: element_name(reader)?,
        },
        EventType::CHARACTERS => XmlEvent::Characters(reader.text()?.to_string()),
        EventType::CDATA => XmlEvent::CData(reader.text()?.to_string()),
        EventType::SPACE => XmlEvent::Space(reader.text()?.to_string()),
        EventType::COMMENT => XmlEvent::Comment(reader.text()?.to_string()),
        EventType::DTD => XmlEvent::Dtd(reader.text()?.to_string()),
        EventType::PROCESSING_INSTRUCTION => XmlEvent::ProcessingInstruction {
            target: reader.pi_target()?.to_string(),
            data: reader.pi_data()?.to_string(),
        },
        EventType::ENTITY_REFERENCE => XmlEvent::EntityReference {
            name: reader.name()?.to_string(),
            text: reader.entity_replacement()?.map(str::to_string),
        },
        other => {
            return Err(XmlError::UnexpectedEvent {
                found: other,
                context: "reading an event",
                location: reader.location(),
            })
        }
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::TreeNode;
    use crate::stream::InputFactory;

    fn events(xml: &str) -> Vec<XmlEvent> {
        let reader = EventReader::new(StreamReader::from_str(xml).unwrap());
        reader.collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_event_sequence() {
        let events = events("<a x=\"1\"><b>text</b></a>");
        assert_eq!(
            events,
            vec![
                XmlEvent::StartDocument {
                    version: None,
                    encoding: None,
                    standalone: None,
                },
                XmlEvent::StartElement {
                    name: QualifiedName::local("a"),
                    attributes: vec![OwnedAttribute {
                        name: QualifiedName::local("x"),
                        value: "1".to_string(),
                        att_type: "CDATA",
                        specified: true,
                    }],
                    namespaces: vec![],
                },
                XmlEvent::StartElement {
                    name: QualifiedName::local("b"),
                    attributes: vec![],
                    namespaces: vec![],
                },
                XmlEvent::Characters("text".to_string()),
                XmlEvent::EndElement {
                    name: QualifiedName::local("b"),
                },
                XmlEvent::EndElement {
                    name: QualifiedName::local("a"),
                },
                XmlEvent::EndDocument,
            ]
        );
    }

    #[test]
    fn test_namespaced_start_element() {
        let events = events("<p:a xmlns:p=\"urn:p\" p:x=\"1\"/>");
        match &events[1] {
            XmlEvent::StartElement {
                name,
                attributes,
                namespaces,
            } => {
                assert_eq!(name.to_string(), "p:a");
                assert_eq!(name.namespace.as_deref(), Some("urn:p"));
                assert_eq!(attributes[0].name.namespace.as_deref(), Some("urn:p"));
                assert_eq!(
                    namespaces,
                    &vec![Namespace {
                        prefix: Some("p".to_string()),
                        uri: "urn:p".to_string(),
                    }]
                );
            }
            other => panic!("expected a start element, got {other:?}"),
        }
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut reader = EventReader::new(StreamReader::from_str("<a/>").unwrap());
        assert_eq!(reader.peek().unwrap().map(XmlEvent::event_type), Some(EventType::START_DOCUMENT));
        assert_eq!(reader.peek().unwrap().map(XmlEvent::event_type), Some(EventType::START_DOCUMENT));
        assert_eq!(reader.next_event().unwrap().event_type(), EventType::START_DOCUMENT);
        assert!(reader.next_event().unwrap().is_start_element());
        assert!(reader.peek().unwrap().is_some_and(XmlEvent::is_end_element));
        assert!(reader.next_event().unwrap().is_end_element());
        assert_eq!(reader.next_event().unwrap(), XmlEvent::EndDocument);
        assert!(!reader.has_next());
        assert!(reader.peek().unwrap().is_none());
    }

    #[test]
    fn test_element_text_and_next_tag() {
        let mut reader = EventReader::new(StreamReader::from_str("<r>\n <a>one<!--x-->two</a>\n <b/>\n</r>").unwrap());
        assert!(reader.next_tag().unwrap().is_start_element());
        assert!(reader.next_tag().unwrap().is_start_element());
        assert_eq!(reader.element_text().unwrap(), "onetwo");
        match reader.next_tag().unwrap() {
            XmlEvent::StartElement { name, .. } => assert_eq!(name.local_name, "b"),
            other => panic!("expected <b>, got {other:?}"),
        }
        assert!(matches!(reader.element_text(), Ok(text) if text.is_empty()));
    }

    #[test]
    fn test_element_text_after_peek() {
        let mut reader = EventReader::new(StreamReader::from_str("<a>x<![CDATA[y]]></a>").unwrap());
        reader.next_tag().unwrap();
        assert!(reader.peek().unwrap().is_some());
        assert_eq!(reader.element_text().unwrap(), "xy");
    }

    #[test]
    fn test_next_tag_from_fresh_reader() {
        let xml = "<?xml version=\"1.0\"?>\n<!--prolog--><?pi data?>\n<root>\n</root>";
        let mut reader = EventReader::new(StreamReader::from_str(xml).unwrap());
        match reader.next_tag().unwrap() {
            XmlEvent::StartElement { name, .. } => assert_eq!(name.local_name, "root"),
            other => panic!("expected <root>, got {other:?}"),
        }
        assert!(reader.next_tag().unwrap().is_end_element());

        // After a peek of START_DOCUMENT the peeked event is skipped as well
        let mut reader = EventReader::new(StreamReader::from_str("<a/>").unwrap());
        assert!(reader.peek().unwrap().is_some());
        assert!(reader.next_tag().unwrap().is_start_element());
    }

    #[test]
    fn test_next_tag_rejects_text() {
        let mut reader = EventReader::new(StreamReader::from_str("<a>text<b/></a>").unwrap());
        reader.next_tag().unwrap();
        assert!(matches!(
            reader.next_tag(),
            Err(XmlError::UnexpectedEvent {
                found: EventType::CHARACTERS,
                ..
            })
        ));
    }

    #[test]
    fn test_element_text_requires_start_element() {
        let mut reader = EventReader::new(StreamReader::from_str("<a/>").unwrap());
        assert!(matches!(reader.element_text(), Err(XmlError::InvalidState { .. })));
    }

    #[test]
    fn test_iteration_stops_after_error() {
        let reader = EventReader::new(StreamReader::from_str("<a></b>").unwrap());
        let results: Vec<_> = reader.collect();
        assert_eq!(results.len(), 3);
        assert!(results[2].is_err());
    }

    #[test]
    fn test_entity_reference_events() {
        let xml = "<!DOCTYPE a [<!ENTITY e \"E\">]><a>&e;&u;</a>";
        let reader = InputFactory::new()
            .replace_entity_references(false)
            .create_event_reader_from_str(xml)
            .unwrap();
        let refs: Vec<XmlEvent> = reader
            .map(|event| event.unwrap())
            .filter(|event| event.event_type() == EventType::ENTITY_REFERENCE)
            .collect();
        assert_eq!(
            refs,
            vec![
                XmlEvent::EntityReference {
                    name: "e".to_string(),
                    text: Some("E".to_string()),
                },
                XmlEvent::EntityReference {
                    name: "u".to_string(),
                    text: None,
                },
            ]
        );
    }

    #[test]
    fn test_tree_event_reader() {
        let tree = TreeNode::element("a")
            .with_child(TreeNode::ProcessingInstruction {
                target: "t".to_string(),
                data: "d".to_string(),
            })
            .with_child(TreeNode::CData("c".to_string()));
        let reader = InputFactory::new().create_tree_event_reader(tree).unwrap();
        let kinds: Vec<EventType> = reader.map(|event| event.unwrap().event_type()).collect();
        assert_eq!(
            kinds,
            vec![
                EventType::START_DOCUMENT,
                EventType::START_ELEMENT,
                EventType::PROCESSING_INSTRUCTION,
                EventType::CDATA,
                EventType::END_ELEMENT,
                EventType::END_DOCUMENT,
            ]
        );
    }
}
