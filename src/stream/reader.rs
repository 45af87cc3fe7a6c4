//! Stream Reader
//!
//! The pull cursor. Each [`StreamReader::next`] takes one raw event from the
//! adapter and moves it into pool handles: names are interned as symbols,
//! text is stored as a produced range and only turned into a `String` when
//! someone asks for it. The previous event's strings are released first.
//!
//! Namespace scoping is applied here rather than in the source: `xmlns`
//! attributes become bindings (they are not reported as attributes), and
//! the scope of an element is popped on the call after its END_ELEMENT so
//! its bindings are still visible while the cursor sits on it.

use tracing::debug;

use super::adapter::PullAdapter;
use super::events::{RawAttribute, RawEvent};
use super::{EventType, ReaderConfig};
use crate::buffer::{ChunkyCharArray, LineEndings, ProducedRange, Producer};
use crate::error::{Location, Result, XmlError};
use crate::namespace::{NamespaceBinding, NamespaceContext};
use crate::pool::{Handle, ListHandle, StringPool};
use crate::source::{DoctypeDeclaration, EventSource, TreeNode, TreeSource, XmlDeclaration, XmlSource};

/// Interned parts of an element or attribute name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QName {
    qname: Handle,
    prefix: Handle,
    local: Handle,
    /// `Handle::EMPTY` when the name has no namespace
    uri: Handle,
}

#[derive(Debug)]
struct AttributeSlot {
    name: QName,
    value: Handle,
    att_type: &'static str,
    specified: bool,
    enumeration: Option<ListHandle>,
}

/// Key two attributes must not share
#[derive(Debug, PartialEq, Eq)]
enum AttributeIdentity {
    Namespaced { uri: Handle, local: Handle },
    Unresolved { prefix: Handle, local: Handle },
}

#[derive(Debug)]
enum Current {
    StartDocument,
    StartElement(QName),
    EndElement(QName),
    Text {
        kind: EventType,
        text: Handle,
        whitespace: bool,
    },
    ProcessingInstruction {
        target: Handle,
        data: Handle,
    },
    EntityReference {
        name: Handle,
        text: Option<Handle>,
    },
    Dtd {
        text: Handle,
    },
    EndDocument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Active,
    Failed,
    Closed,
}

/// Pull cursor over an XML document or tree
///
/// ```
/// use xmlcursor::{EventType, StreamReader};
///
/// let mut reader = StreamReader::from_str("<a><b>text</b></a>").unwrap();
/// assert_eq!(reader.event_type(), EventType::START_DOCUMENT);
/// assert_eq!(reader.next_tag().unwrap(), EventType::START_ELEMENT);
/// assert_eq!(reader.local_name().unwrap(), "a");
/// reader.next_tag().unwrap();
/// assert_eq!(reader.element_text().unwrap(), "text");
/// ```
pub struct StreamReader {
    adapter: PullAdapter,
    pool: StringPool,
    namespaces: NamespaceContext,
    producer: Producer,
    current: Current,
    location: Location,
    attributes: Vec<AttributeSlot>,
    /// Open elements, for matching end tags
    open: Vec<QName>,
    /// The element just closed still owns a namespace scope
    scope_to_pop: bool,
    declaration: XmlDeclaration,
    doctype: Option<Box<DoctypeDeclaration>>,
    state: Lifecycle,
    text_buffer: ChunkyCharArray,
}

impl StreamReader {
    /// Reader over a document with default options
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(xml: &str) -> Result<Self> {
        Self::with_config(XmlSource::from_text(xml), ReaderConfig::default())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        Self::with_config(XmlSource::from_bytes(bytes)?, ReaderConfig::default())
    }

    pub fn from_reader<R: std::io::Read>(input: R) -> Result<Self> {
        Self::with_config(XmlSource::from_reader(input)?, ReaderConfig::default())
    }

    pub fn from_tree(root: TreeNode) -> Result<Self> {
        Self::with_config(TreeSource::new(root), ReaderConfig::default())
    }

    /// Start the worker and position the cursor on START_DOCUMENT
    pub fn with_config<S: EventSource>(source: S, config: ReaderConfig) -> Result<Self> {
        let mut pool = StringPool::with_chunk_shift(config.chunk_shift);
        // Sources fold line breaks before decoding references; a CR reaching
        // the pool came from `&#13;` and must survive
        pool.utf8_mut().set_line_endings(LineEndings::Preserve);
        let namespaces = NamespaceContext::new(&mut pool);
        let adapter = PullAdapter::spawn(source, config)?;

        let mut reader = StreamReader {
            adapter,
            pool,
            namespaces,
            producer: S::PRODUCER,
            current: Current::StartDocument,
            location: Location::UNKNOWN,
            attributes: Vec::new(),
            open: Vec::with_capacity(32),
            scope_to_pop: false,
            declaration: XmlDeclaration::default(),
            doctype: None,
            state: Lifecycle::Active,
            text_buffer: ChunkyCharArray::new(),
        };

        let first = reader.adapter.next_event()?;
        reader.location = first.location;
        match first.event {
            RawEvent::StartDocument(declaration) => reader.declaration = declaration,
            other => {
                return Err(XmlError::UnexpectedEvent {
                    found: other.event_type(),
                    context: "starting a document",
                    location: first.location,
                })
            }
        }
        Ok(reader)
    }

    /// Current event kind
    pub fn event_type(&self) -> EventType {
        match &self.current {
            Current::StartDocument => EventType::START_DOCUMENT,
            Current::StartElement(_) => EventType::START_ELEMENT,
            Current::EndElement(_) => EventType::END_ELEMENT,
            Current::Text { kind, .. } => *kind,
            Current::ProcessingInstruction { .. } => EventType::PROCESSING_INSTRUCTION,
            Current::EntityReference { .. } => EventType::ENTITY_REFERENCE,
            Current::Dtd { .. } => EventType::DTD,
            Current::EndDocument => EventType::END_DOCUMENT,
        }
    }

    /// False once the cursor is on END_DOCUMENT
    pub fn has_next(&self) -> bool {
        !matches!(self.current, Current::EndDocument)
    }

    /// Advance to the next event
    pub fn next(&mut self) -> Result<EventType> {
        match self.state {
            Lifecycle::Closed => return Err(XmlError::Closed),
            Lifecycle::Failed => return Err(XmlError::Failed),
            Lifecycle::Active => {}
        }
        if !self.has_next() {
            return Err(XmlError::NoMoreEvents);
        }

        self.release_current();
        if self.scope_to_pop {
            self.namespaces.on_end_element();
            self.scope_to_pop = false;
        }

        let step = self
            .adapter
            .next_event()
            .and_then(|delivered| {
                self.location = delivered.location;
                self.apply(delivered.event)
            });
        match step {
            Ok(()) => Ok(self.event_type()),
            Err(error) => {
                self.fail();
                Err(error)
            }
        }
    }

    /// Check the current event's type and, when given, its name
    pub fn require(
        &self,
        event_type: EventType,
        namespace_uri: Option<&str>,
        local_name: Option<&str>,
    ) -> Result<()> {
        let current = self.event_type();
        if current != event_type {
            return Err(XmlError::Mismatch {
                expected: event_type.to_string(),
                found: current.to_string(),
            });
        }
        if namespace_uri.is_none() && local_name.is_none() {
            return Ok(());
        }

        let Some(name) = self.element_name() else {
            return Err(XmlError::Mismatch {
                expected: format!("{event_type} with a name"),
                found: current.to_string(),
            });
        };
        if let Some(expected) = namespace_uri {
            let found = self.text_of(name.uri);
            if found != expected {
                return Err(XmlError::Mismatch {
                    expected: format!("namespace '{expected}'"),
                    found: format!("namespace '{found}'"),
                });
            }
        }
        if let Some(expected) = local_name {
            let found = self.text_of(name.local);
            if found != expected {
                return Err(XmlError::Mismatch {
                    expected: format!("local name '{expected}'"),
                    found: format!("local name '{found}'"),
                });
            }
        }
        Ok(())
    }

    /// Concatenated text content of a text-only element
    ///
    /// Must be called on START_ELEMENT; leaves the cursor on the matching
    /// END_ELEMENT. Comments and processing instructions are skipped.
    pub fn element_text(&mut self) -> Result<String> {
        if !matches!(self.current, Current::StartElement(_)) {
            return Err(self.invalid_state("element_text"));
        }

        self.text_buffer.clear();
        loop {
            let event = self.next()?;
            match &self.current {
                Current::Text { text, .. } if event.is_character_data() => {
                    self.pool.append_units(*text, &mut self.text_buffer);
                }
                Current::EntityReference { text, .. } => {
                    if let Some(text) = text {
                        self.pool.append_units(*text, &mut self.text_buffer);
                    }
                }
                Current::Text { .. } | Current::ProcessingInstruction { .. } => {}
                Current::EndElement(_) => break,
                _ => {
                    return Err(XmlError::UnexpectedEvent {
                        found: event,
                        context: "reading element text",
                        location: self.location,
                    })
                }
            }
        }
        Ok(self.text_buffer.to_string_lossy())
    }

    /// Skip whitespace, comments and processing instructions up to the next tag
    pub fn next_tag(&mut self) -> Result<EventType> {
        loop {
            let event = self.next()?;
            match event {
                EventType::START_ELEMENT | EventType::END_ELEMENT => return Ok(event),
                EventType::CHARACTERS | EventType::CDATA if self.is_white_space() => {}
                EventType::SPACE | EventType::COMMENT | EventType::PROCESSING_INSTRUCTION => {}
                other => {
                    return Err(XmlError::UnexpectedEvent {
                        found: other,
                        context: "looking for a start or end tag",
                        location: self.location,
                    })
                }
            }
        }
    }

    /// Stop the worker; the underlying input is not touched
    ///
    /// Idempotent. The current event's data stays readable.
    pub fn close(&mut self) -> Result<()> {
        if self.state != Lifecycle::Closed {
            debug!("closing stream reader");
            self.state = Lifecycle::Closed;
        }
        self.adapter.close()
    }

    pub fn is_closed(&self) -> bool {
        self.state == Lifecycle::Closed
    }

    // ---- names ----

    pub fn is_start_element(&self) -> bool {
        matches!(self.current, Current::StartElement(_))
    }

    pub fn is_end_element(&self) -> bool {
        matches!(self.current, Current::EndElement(_))
    }

    pub fn is_characters(&self) -> bool {
        self.event_type() == EventType::CHARACTERS
    }

    /// Whether the current text event is all XML whitespace
    pub fn is_white_space(&self) -> bool {
        match self.current {
            Current::Text {
                kind: EventType::SPACE,
                ..
            } => true,
            Current::Text {
                kind: EventType::CHARACTERS | EventType::CDATA,
                whitespace,
                ..
            } => whitespace,
            _ => false,
        }
    }

    /// True on START_ELEMENT, END_ELEMENT and ENTITY_REFERENCE
    pub fn has_name(&self) -> bool {
        matches!(
            self.current,
            Current::StartElement(_) | Current::EndElement(_) | Current::EntityReference { .. }
        )
    }

    /// Qualified name of an element, or the name of an entity reference
    pub fn name(&self) -> Result<&str> {
        match &self.current {
            Current::StartElement(name) | Current::EndElement(name) => Ok(self.text_of(name.qname)),
            Current::EntityReference { name, .. } => Ok(self.text_of(*name)),
            _ => Err(self.invalid_state("name")),
        }
    }

    pub fn local_name(&self) -> Result<&str> {
        match &self.current {
            Current::StartElement(name) | Current::EndElement(name) => Ok(self.text_of(name.local)),
            Current::EntityReference { name, .. } => Ok(self.text_of(*name)),
            _ => Err(self.invalid_state("local_name")),
        }
    }

    pub fn prefix(&self) -> Result<Option<&str>> {
        let name = self.element_name().ok_or_else(|| self.invalid_state("prefix"))?;
        Ok(self.optional_text(name.prefix))
    }

    /// Namespace of the current element, `None` when it has none
    pub fn namespace_uri(&self) -> Result<Option<&str>> {
        let name = self.element_name().ok_or_else(|| self.invalid_state("namespace_uri"))?;
        Ok(self.optional_text(name.uri))
    }

    // ---- text ----

    pub fn has_text(&self) -> bool {
        matches!(
            self.current,
            Current::Text { .. } | Current::EntityReference { .. } | Current::Dtd { .. }
        )
    }

    /// Text of CHARACTERS, CDATA, SPACE, COMMENT, ENTITY_REFERENCE or DTD
    ///
    /// Takes `&mut self` because text is materialized on first access.
    pub fn text(&mut self) -> Result<&str> {
        let handle = match &self.current {
            Current::Text { text, .. } | Current::Dtd { text } => *text,
            Current::EntityReference { text, .. } => text.unwrap_or(Handle::EMPTY),
            _ => return Err(self.invalid_state("text")),
        };
        self.pool.to_str(handle).ok_or(XmlError::Failed)
    }

    /// Replacement text of an ENTITY_REFERENCE, `None` when it is unknown
    pub fn entity_replacement(&mut self) -> Result<Option<&str>> {
        match &self.current {
            Current::EntityReference { text: Some(text), .. } => {
                let text = *text;
                Ok(self.pool.to_str(text))
            }
            Current::EntityReference { text: None, .. } => Ok(None),
            _ => Err(self.invalid_state("entity_replacement")),
        }
    }

    pub fn pi_target(&self) -> Result<&str> {
        match &self.current {
            Current::ProcessingInstruction { target, .. } => Ok(self.text_of(*target)),
            _ => Err(self.invalid_state("pi_target")),
        }
    }

    pub fn pi_data(&mut self) -> Result<&str> {
        match &self.current {
            Current::ProcessingInstruction { data, .. } => {
                let data = *data;
                self.pool.to_str(data).ok_or(XmlError::Failed)
            }
            _ => Err(self.invalid_state("pi_data")),
        }
    }

    // ---- attributes ----

    pub fn attribute_count(&self) -> Result<usize> {
        self.require_start_element("attribute_count")?;
        Ok(self.attributes.len())
    }

    pub fn attribute_name(&self, index: usize) -> Result<&str> {
        let slot = self.attribute("attribute_name", index)?;
        Ok(self.text_of(slot.name.qname))
    }

    pub fn attribute_local_name(&self, index: usize) -> Result<&str> {
        let slot = self.attribute("attribute_local_name", index)?;
        Ok(self.text_of(slot.name.local))
    }

    pub fn attribute_namespace(&self, index: usize) -> Result<Option<&str>> {
        let slot = self.attribute("attribute_namespace", index)?;
        Ok(self.optional_text(slot.name.uri))
    }

    pub fn attribute_prefix(&self, index: usize) -> Result<Option<&str>> {
        let slot = self.attribute("attribute_prefix", index)?;
        Ok(self.optional_text(slot.name.prefix))
    }

    /// Declared type: `CDATA` unless an ATTLIST says otherwise
    pub fn attribute_type(&self, index: usize) -> Result<&'static str> {
        Ok(self.attribute("attribute_type", index)?.att_type)
    }

    pub fn attribute_value(&self, index: usize) -> Result<&str> {
        let slot = self.attribute("attribute_value", index)?;
        Ok(self.text_of(slot.value))
    }

    /// False for values defaulted from the DTD
    pub fn is_attribute_specified(&self, index: usize) -> Result<bool> {
        Ok(self.attribute("is_attribute_specified", index)?.specified)
    }

    /// Allowed values of an enumerated or NOTATION attribute
    pub fn attribute_enumeration(&self, index: usize) -> Result<Vec<&str>> {
        let slot = self.attribute("attribute_enumeration", index)?;
        Ok(match slot.enumeration {
            Some(list) => self
                .pool
                .string_list(list)
                .map(|handle| self.text_of(handle))
                .collect(),
            None => Vec::new(),
        })
    }

    /// Value of the attribute with this local name (and namespace, if given)
    pub fn attribute_value_by_name(&self, namespace_uri: Option<&str>, local_name: &str) -> Result<Option<&str>> {
        self.require_start_element("attribute_value_by_name")?;
        let found = self.attributes.iter().find(|slot| {
            self.text_of(slot.name.local) == local_name
                && namespace_uri.is_none_or(|uri| self.text_of(slot.name.uri) == uri)
        });
        Ok(found.map(|slot| self.text_of(slot.value)))
    }

    // ---- namespaces ----

    /// Namespaces declared on the current element
    pub fn namespace_count(&self) -> Result<usize> {
        self.require_element("namespace_count")?;
        Ok(self.namespaces.declared_in_current().len())
    }

    /// Declared prefix, `None` for the default namespace
    pub fn namespace_prefix(&self, index: usize) -> Result<Option<&str>> {
        let binding = self.namespace_binding("namespace_prefix", index)?;
        Ok(self.optional_text(binding.prefix))
    }

    pub fn namespace_uri_at(&self, index: usize) -> Result<&str> {
        let binding = self.namespace_binding("namespace_uri_at", index)?;
        Ok(self.text_of(binding.uri))
    }

    /// URI bound to `prefix` in the current scope; `""` is the default namespace
    pub fn namespace_uri_for_prefix(&self, prefix: &str) -> Option<&str> {
        let prefix = self.pool.lookup_symbol_str(prefix)?;
        let uri = self.namespaces.namespace_uri(prefix)?;
        self.optional_text(uri)
    }

    /// Read-only view of the bindings in scope
    pub fn namespace_context(&self) -> NamespaceScope<'_> {
        NamespaceScope {
            context: &self.namespaces,
            pool: &self.pool,
        }
    }

    // ---- document ----

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn version(&self) -> Option<&str> {
        self.declaration.version.as_deref()
    }

    /// Encoding named by the XML declaration
    pub fn encoding(&self) -> Option<&str> {
        self.declaration.encoding.as_deref()
    }

    pub fn is_standalone(&self) -> bool {
        self.declaration.standalone == Some(true)
    }

    pub fn standalone_set(&self) -> bool {
        self.declaration.standalone.is_some()
    }

    /// The DOCTYPE declaration, once the cursor has passed it
    pub fn doctype(&self) -> Option<&DoctypeDeclaration> {
        self.doctype.as_deref()
    }

    /// The reader's string pool
    pub fn pool(&self) -> &StringPool {
        &self.pool
    }

    // ---- internals ----

    fn fail(&mut self) {
        self.state = Lifecycle::Failed;
        if self.adapter.close().is_err() {
            debug!("parse worker panicked");
        }
    }

    fn invalid_state(&self, operation: &'static str) -> XmlError {
        XmlError::InvalidState {
            operation,
            state: self.event_type(),
        }
    }

    fn require_start_element(&self, operation: &'static str) -> Result<()> {
        if self.is_start_element() {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn require_element(&self, operation: &'static str) -> Result<()> {
        if self.is_start_element() || self.is_end_element() {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn attribute(&self, operation: &'static str, index: usize) -> Result<&AttributeSlot> {
        self.require_start_element(operation)?;
        self.attributes.get(index).ok_or(XmlError::IndexOutOfBounds {
            what: "attributes",
            index,
            count: self.attributes.len(),
        })
    }

    fn namespace_binding(
        &self,
        operation: &'static str,
        index: usize,
    ) -> Result<NamespaceBinding> {
        self.require_element(operation)?;
        let declared = self.namespaces.declared_in_current();
        declared.get(index).copied().ok_or(XmlError::IndexOutOfBounds {
            what: "namespaces",
            index,
            count: declared.len(),
        })
    }

    fn element_name(&self) -> Option<QName> {
        match self.current {
            Current::StartElement(name) | Current::EndElement(name) => Some(name),
            _ => None,
        }
    }

    /// Text of a symbol or materialized string
    fn text_of(&self, handle: Handle) -> &str {
        self.pool.symbol_str(handle).unwrap_or("")
    }

    fn optional_text(&self, handle: Handle) -> Option<&str> {
        if handle.is_empty() {
            None
        } else {
            Some(self.text_of(handle))
        }
    }

    /// Give back the strings owned by the current event
    fn release_current(&mut self) {
        match std::mem::replace(&mut self.current, Current::StartDocument) {
            Current::Text { text, .. } | Current::Dtd { text } => self.pool.release_string(text),
            Current::ProcessingInstruction { data, .. } => self.pool.release_string(data),
            Current::EntityReference { text: Some(text), .. } => self.pool.release_string(text),
            _ => {}
        }
        for slot in self.attributes.drain(..) {
            self.pool.release_string(slot.value);
        }
        match self.producer {
            Producer::Utf8 => self.pool.utf8_mut().clear_previous(),
            Producer::Chars => self.pool.chars_mut().clear_previous(),
        }
    }

    fn produce(&mut self, text: &str) -> (ProducedRange, u32) {
        match self.producer {
            Producer::Utf8 => self.pool.utf8_mut().append(text.as_bytes()),
            Producer::Chars => self.pool.chars_mut().append_str(text),
        }
    }

    fn intern(&mut self, text: &str) -> Handle {
        let (range, hash) = self.produce(text);
        self.pool.add_symbol_from_producer(range, hash)
    }

    /// Store text lazily; it is decoded only if read
    fn store(&mut self, text: &str) -> Handle {
        let (range, _) = self.produce(text);
        self.pool.add_string_produced(range)
    }

    /// Store text and decode it right away, for accessors taking `&self`
    fn store_materialized(&mut self, text: &str) -> Handle {
        let handle = self.store(text);
        let _ = self.pool.to_str(handle);
        handle
    }

    fn split(&mut self, name: &str) -> (Handle, Handle, Handle) {
        let qname = self.intern(name);
        match name.split_once(':') {
            Some((prefix, local)) => (qname, self.intern(prefix), self.intern(local)),
            None => (qname, Handle::EMPTY, qname),
        }
    }

    fn apply(&mut self, event: RawEvent) -> Result<()> {
        self.current = match event {
            RawEvent::StartDocument(declaration) => {
                self.declaration = declaration;
                Current::StartDocument
            }
            RawEvent::StartElement { name, attributes } => {
                Current::StartElement(self.start_element(&name, attributes)?)
            }
            RawEvent::EndElement { name } => Current::EndElement(self.end_element(&name)?),
            RawEvent::Text { kind, text } => Current::Text {
                kind,
                whitespace: text.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r')),
                text: self.store(&text),
            },
            RawEvent::ProcessingInstruction { target, data } => Current::ProcessingInstruction {
                target: self.intern(&target),
                data: self.store(&data),
            },
            RawEvent::EntityReference { name, replacement } => Current::EntityReference {
                name: self.intern(&name),
                text: replacement.map(|text| self.store(&text)),
            },
            RawEvent::Dtd(declaration) => {
                let text = self.store(&declaration.text);
                self.doctype = Some(declaration);
                Current::Dtd { text }
            }
            RawEvent::EndDocument => Current::EndDocument,
        };
        Ok(())
    }

    fn start_element(&mut self, name: &str, attributes: Vec<RawAttribute>) -> Result<QName> {
        let mut plain = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            let declared = match attribute.name.split_once(':') {
                Some(("xmlns", prefix)) => Some(prefix),
                None if attribute.name == "xmlns" => Some(""),
                _ => None,
            };
            match declared {
                Some(prefix) => {
                    let prefix = self.intern(prefix);
                    let uri = self.intern(&attribute.value);
                    if !self.namespaces.add_namespace(prefix, uri) {
                        debug!(attribute = %attribute.name, "ignoring rebinding of a reserved prefix");
                    }
                }
                None => plain.push(attribute),
            }
        }
        self.namespaces.on_start_element();

        let (qname, prefix, local) = self.split(name);
        let element = QName {
            qname,
            prefix,
            local,
            uri: self.namespaces.namespace_uri(prefix).unwrap_or(Handle::EMPTY),
        };

        for attribute in plain {
            let (qname, prefix, local) = self.split(&attribute.name);
            // Unprefixed attributes are in no namespace
            let uri = if prefix.is_empty() {
                Handle::EMPTY
            } else {
                self.namespaces.namespace_uri(prefix).unwrap_or(Handle::EMPTY)
            };
            let value = self.store_materialized(&attribute.value);
            let enumeration = self.enumeration(&attribute.enumeration);
            self.attributes.push(AttributeSlot {
                name: QName {
                    qname,
                    prefix,
                    local,
                    uri,
                },
                value,
                att_type: attribute.att_type,
                specified: attribute.specified,
                enumeration,
            });
        }

        self.open.push(element);
        self.check_duplicate_attributes()?;
        Ok(element)
    }

    fn enumeration(&mut self, values: &[String]) -> Option<ListHandle> {
        if values.is_empty() || !self.pool.start_string_list() {
            return None;
        }
        for value in values {
            let handle = self.intern(value);
            self.pool.add_string_to_list(handle);
        }
        self.pool.finish_string_list()
    }

    fn identity(slot: &AttributeSlot) -> AttributeIdentity {
        if slot.name.uri.is_empty() {
            AttributeIdentity::Unresolved {
                prefix: slot.name.prefix,
                local: slot.name.local,
            }
        } else {
            AttributeIdentity::Namespaced {
                uri: slot.name.uri,
                local: slot.name.local,
            }
        }
    }

    fn check_duplicate_attributes(&self) -> Result<()> {
        for (i, first) in self.attributes.iter().enumerate() {
            let identity = Self::identity(first);
            if self.attributes[i + 1..].iter().any(|other| Self::identity(other) == identity) {
                return Err(XmlError::DuplicateAttribute {
                    name: self.text_of(first.name.local).to_string(),
                    namespace: self.optional_text(first.name.uri).map(str::to_string),
                    location: self.location,
                });
            }
        }
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> Result<QName> {
        let Some(open) = self.open.pop() else {
            return Err(XmlError::malformed(
                format!("end tag </{name}> without a start tag"),
                self.location,
            ));
        };

        let (range, hash) = self.produce(name);
        let matches = self.pool.lookup_symbol(&range, hash) == Some(open.qname);
        self.pool.release_range(range);
        if !matches {
            return Err(XmlError::malformed(
                format!("end tag </{name}> does not match <{}>", self.text_of(open.qname)),
                self.location,
            ));
        }

        self.scope_to_pop = true;
        Ok(open)
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        if self.state == Lifecycle::Active {
            debug!("stream reader dropped without close");
        }
    }
}

/// Namespace bindings in scope at the cursor's position
pub struct NamespaceScope<'r> {
    context: &'r NamespaceContext,
    pool: &'r StringPool,
}

impl<'r> NamespaceScope<'r> {
    /// URI bound to `prefix`; `""` asks for the default namespace
    pub fn namespace_uri(&self, prefix: &str) -> Option<&'r str> {
        let prefix = self.pool.lookup_symbol_str(prefix)?;
        let uri = self.context.namespace_uri(prefix)?;
        self.pool.symbol_str(uri)
    }

    /// A prefix bound to `uri`; `Some("")` for the default namespace
    pub fn prefix(&self, uri: &str) -> Option<&'r str> {
        let uri = self.pool.lookup_symbol_str(uri)?;
        let prefix = self.context.prefix_for(uri)?;
        self.pool.symbol_str(prefix)
    }

    /// (prefix, URI) pairs in scope, innermost first
    pub fn bindings(&self) -> Vec<(&'r str, &'r str)> {
        self.context
            .active_bindings()
            .filter_map(|b| Some((self.pool.symbol_str(b.prefix)?, self.pool.symbol_str(b.uri)?)))
            .collect()
    }
}
