//! XML Byte Source
//!
//! Push parser over a whole document held in memory. Input is converted to
//! UTF-8 up front (BOM / UTF-16 detection) and its line breaks folded to LF,
//! then scanned with the memchr
//! [`Scanner`]: markup is dispatched on the byte after `<`, text runs to the
//! next `<`.
//!
//! Well-formedness is checked as the scan goes: tags must nest, markup must
//! be terminated and only whitespace, comments and processing instructions
//! may appear outside the root element. Problems that do not stop the parse
//! (undeclared entities, malformed references) go to the reporter.

use std::borrow::Cow;
use std::io::Read;

use memchr::{memchr, memchr3};

use super::{
    ContentHandler, Diagnostic, DoctypeDeclaration, EntityDeclaration, EventSource, ExternalId,
    NotationDeclaration, Severity, XmlDeclaration,
};
use crate::buffer::ChunkyByteArray;
use crate::core::dtd::Doctype;
use crate::core::scanner::is_name_start_char;
use crate::core::{
    convert_to_utf8, normalize_line_endings, parse_attributes, parse_attributes_with, parse_doctype,
    segments, Attribute, DtdDeclarations, LineTracker, Scanner, Segment, XmlEncoding,
};
use crate::error::{Location, Result, XmlError};
use crate::stream::ReaderConfig;

/// Entities nested deeper than this are treated as recursive
const MAX_ENTITY_DEPTH: usize = 16;

/// An XML document ready to be pushed through a handler
#[derive(Debug, Clone)]
pub struct XmlSource {
    input: Vec<u8>,
    encoding: XmlEncoding,
}

impl XmlSource {
    /// Source over raw bytes in UTF-8 or UTF-16 (BOM or `<` pattern detected)
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let (input, encoding) = convert_to_utf8(bytes.into())?;
        if let Err(e) = std::str::from_utf8(&input) {
            return Err(XmlError::Encoding(format!(
                "invalid UTF-8 sequence at byte {}",
                e.valid_up_to()
            )));
        }
        Ok(XmlSource {
            input: normalize_line_endings(input),
            encoding,
        })
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        let mut input = text.into().into_bytes();
        if input.starts_with("\u{FEFF}".as_bytes()) {
            input.drain(..3);
        }
        XmlSource {
            input: normalize_line_endings(input),
            encoding: XmlEncoding::Utf8,
        }
    }

    /// Source over a byte stream, which is read to its end
    ///
    /// The stream is not closed; dropping it is up to the caller.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut bytes = ChunkyByteArray::new(reader);
        if let (Some(first), Some(second)) = (bytes.byte_at(0)?, bytes.byte_at(1)?) {
            tracing::debug!(
                encoding = XmlEncoding::detect(&[first, second]).label(),
                "sniffed input encoding"
            );
        }
        let mut input = Vec::with_capacity(bytes.buffered());
        bytes.read_to_end(&mut input)?;
        Self::from_bytes(input)
    }

    /// Encoding the input was converted from
    pub fn encoding(&self) -> XmlEncoding {
        self.encoding
    }

    /// The document as UTF-8 with LF line breaks; locations index into it
    pub fn as_bytes(&self) -> &[u8] {
        &self.input
    }
}

impl EventSource for XmlSource {
    fn parse<H: ContentHandler>(self, handler: &mut H, config: &ReaderConfig) -> Result<()> {
        tracing::debug!(
            bytes = self.input.len(),
            encoding = self.encoding.label(),
            "parsing XML source"
        );
        Parser::new(&self.input, handler, config).run()
    }
}

#[inline]
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

#[inline]
fn str_of(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

fn opt_string(bytes: &Option<Vec<u8>>) -> Option<String> {
    bytes.as_deref().map(|b| str_of(b).into_owned())
}

/// Attribute value normalization: each line break and tab becomes a space
fn push_normalized(out: &mut Vec<u8>, bytes: &[u8]) {
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        i += 1;
        if b == b'\r' && bytes.get(i) == Some(&b'\n') {
            continue;
        }
        out.push(if matches!(b, b'\t' | b'\n' | b'\r') { b' ' } else { b });
    }
}

struct Parser<'a, 'h, H> {
    input: &'a [u8],
    scanner: Scanner<'a>,
    lines: LineTracker,
    handler: &'h mut H,
    config: &'h ReaderConfig,
    dtd: DtdDeclarations,
    /// Names of the open elements
    open: Vec<&'a [u8]>,
    seen_root: bool,
    seen_doctype: bool,
    /// Entities whose replacement text is being expanded
    expanding: Vec<Vec<u8>>,
}

impl<'a, 'h, H: ContentHandler> Parser<'a, 'h, H> {
    fn new(input: &'a [u8], handler: &'h mut H, config: &'h ReaderConfig) -> Self {
        Parser {
            input,
            scanner: Scanner::new(input),
            lines: LineTracker::new(),
            handler,
            config,
            dtd: DtdDeclarations::new(),
            open: Vec::with_capacity(32),
            seen_root: false,
            seen_doctype: false,
            expanding: Vec::new(),
        }
    }

    fn run(mut self) -> Result<()> {
        let declaration = self.declaration()?;
        self.mark(0);
        self.handler.start_document(declaration)?;

        while let Some(b) = self.scanner.peek() {
            if b == b'<' {
                self.markup()?;
            } else {
                self.text()?;
            }
        }

        let end = self.input.len();
        if let Some(&name) = self.open.last() {
            return Err(self.error(end, format!("unclosed element <{}>", str_of(name))));
        }
        if !self.seen_root {
            return Err(self.error(end, "no root element"));
        }
        self.mark(end);
        self.handler.end_document()
    }

    fn locate(&mut self, offset: usize) -> Location {
        self.lines.locate(self.input, offset)
    }

    /// Tell the handler where the next event starts
    fn mark(&mut self, offset: usize) {
        let location = self.locate(offset);
        self.handler.set_location(location);
    }

    fn error(&mut self, offset: usize, message: impl Into<String>) -> XmlError {
        XmlError::malformed(message, self.locate(offset))
    }

    fn report(&self, severity: Severity, message: impl Into<String>, location: Location) {
        self.config.report(Diagnostic {
            severity,
            message: message.into(),
            location,
        });
    }

    /// Parse `<?xml ...?>` if the document starts with one
    fn declaration(&mut self) -> Result<XmlDeclaration> {
        let mut declaration = XmlDeclaration::default();
        if !self.scanner.starts_with(b"<?xml") || !self.scanner.peek_at(5).is_some_and(is_space) {
            return Ok(declaration);
        }

        self.scanner.advance(5);
        let start = self.scanner.position();
        let Some(end) = self.scanner.find_sequence(b"?>") else {
            return Err(self.error(0, "unterminated XML declaration"));
        };

        for attr in parse_attributes(self.scanner.slice(start, end)) {
            let value = str_of(&attr.value).into_owned();
            match attr.name.as_ref() {
                b"version" => declaration.version = Some(value),
                b"encoding" => declaration.encoding = Some(value),
                b"standalone" => {
                    declaration.standalone = match value.as_str() {
                        "yes" => Some(true),
                        "no" => Some(false),
                        _ => {
                            return Err(self.error(start, format!("invalid standalone value '{value}'")))
                        }
                    }
                }
                other => {
                    let message = format!("unknown XML declaration attribute '{}'", str_of(other));
                    return Err(self.error(start, message));
                }
            }
        }

        self.scanner.set_position(end + 2);
        Ok(declaration)
    }

    fn markup(&mut self) -> Result<()> {
        let start = self.scanner.position();
        match self.scanner.peek_at(1) {
            Some(b'/') => self.end_tag(start),
            Some(b'?') => self.processing_instruction(start),
            Some(b'!') => {
                if self.scanner.starts_with(b"<!--") {
                    self.comment(start)
                } else if self.scanner.starts_with(b"<![CDATA[") {
                    self.cdata(start)
                } else if self.scanner.starts_with(b"<!DOCTYPE") {
                    self.doctype(start)
                } else {
                    Err(self.error(start, "unrecognized markup declaration"))
                }
            }
            Some(c) if is_name_start_char(c) => self.start_tag(start),
            _ => Err(self.error(start, "'<' not followed by a name")),
        }
    }

    fn start_tag(&mut self, start: usize) -> Result<()> {
        if self.seen_root && self.open.is_empty() {
            return Err(self.error(start, "content after the root element"));
        }

        self.scanner.advance(1);
        let Some(name) = self.scanner.read_name() else {
            return Err(self.error(start, "malformed start tag"));
        };
        let attrs_start = self.scanner.position();
        let Some(end) = self.scanner.find_tag_end_quoted() else {
            return Err(self.error(start, format!("unterminated start tag <{}>", str_of(name))));
        };

        let mut body = self.scanner.slice(attrs_start, end);
        let empty = body.last() == Some(&b'/');
        if empty {
            body = &body[..body.len() - 1];
        }
        if body.first().is_some_and(|&b| !is_space(b)) {
            return Err(self.error(start, format!("malformed start tag <{}>", str_of(name))));
        }
        self.scanner.set_position(end + 1);

        let location = self.locate(start);
        let mut attributes = parse_attributes_with(body, |raw| self.attribute_value(raw, location));
        self.apply_attribute_declarations(name, &mut attributes, location);
        self.seen_root = true;

        let name_str = str_of(name);
        self.handler.set_location(location);
        self.handler.start_element(&name_str, &attributes)?;
        if empty {
            self.handler.end_element(&name_str)?;
        } else {
            self.open.push(name);
        }
        Ok(())
    }

    /// Set declared types and add defaulted attributes
    fn apply_attribute_declarations(
        &self,
        element: &[u8],
        attributes: &mut Vec<Attribute<'_>>,
        location: Location,
    ) {
        for def in self.dtd.attributes_for(element) {
            match attributes.iter_mut().find(|a| a.name.as_ref() == def.name.as_slice()) {
                Some(attr) => {
                    attr.att_type = def.att_type.as_str();
                    attr.enumeration = def.att_type.values().to_vec();
                }
                None => {
                    let Some(value) = def.default.value() else {
                        continue;
                    };
                    let value = self.attribute_value(value, location).into_owned();
                    let mut attr = Attribute::owned(def.name.clone(), value);
                    attr.specified = false;
                    attr.att_type = def.att_type.as_str();
                    attr.enumeration = def.att_type.values().to_vec();
                    attributes.push(attr);
                }
            }
        }
    }

    fn attribute_value<'v>(&self, raw: &'v [u8], location: Location) -> Cow<'v, [u8]> {
        if memchr3(b'&', b'\t', b'\n', raw).is_none() && memchr(b'\r', raw).is_none() {
            return Cow::Borrowed(raw);
        }
        let mut value = Vec::with_capacity(raw.len());
        self.expand_attribute_value(raw, location, &mut value, 0);
        Cow::Owned(value)
    }

    fn expand_attribute_value(&self, raw: &[u8], location: Location, out: &mut Vec<u8>, depth: usize) {
        let mut utf8 = [0u8; 4];
        for segment in segments(raw) {
            match segment {
                Segment::Literal(bytes) => push_normalized(out, bytes),
                Segment::Char(c) => out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes()),
                Segment::Malformed(bytes) => {
                    self.report(
                        Severity::Error,
                        format!("malformed reference '{}' in attribute value", str_of(bytes)),
                        location,
                    );
                    out.extend_from_slice(bytes);
                }
                Segment::Entity(name) => {
                    let internal = self
                        .dtd
                        .entities
                        .get(name)
                        .filter(|decl| !decl.is_external)
                        .and_then(|decl| decl.value.as_deref());
                    match internal {
                        Some(value) if depth < MAX_ENTITY_DEPTH => {
                            self.expand_attribute_value(value, location, out, depth + 1)
                        }
                        _ => {
                            self.report(
                                Severity::Error,
                                format!("cannot expand entity '{}' in attribute value", str_of(name)),
                                location,
                            );
                            out.push(b'&');
                            out.extend_from_slice(name);
                            out.push(b';');
                        }
                    }
                }
            }
        }
    }

    fn end_tag(&mut self, start: usize) -> Result<()> {
        self.scanner.advance(2);
        let Some(name) = self.scanner.read_name() else {
            return Err(self.error(start, "malformed end tag"));
        };
        self.scanner.skip_whitespace();
        if self.scanner.peek() != Some(b'>') {
            return Err(self.error(start, format!("expected '>' to close </{}>", str_of(name))));
        }
        self.scanner.advance(1);

        match self.open.pop() {
            Some(open) if open == name => {}
            Some(open) => {
                let message = format!(
                    "mismatched end tag: expected </{}>, found </{}>",
                    str_of(open),
                    str_of(name)
                );
                return Err(self.error(start, message));
            }
            None => {
                return Err(self.error(start, format!("unexpected end tag </{}>", str_of(name))));
            }
        }

        self.mark(start);
        self.handler.end_element(&str_of(name))
    }

    fn comment(&mut self, start: usize) -> Result<()> {
        self.scanner.advance(4);
        let content_start = self.scanner.position();
        let Some(end) = self.scanner.find_sequence(b"-->") else {
            return Err(self.error(start, "unterminated comment"));
        };
        let content = self.scanner.slice(content_start, end);
        self.scanner.set_position(end + 3);

        self.mark(start);
        self.handler.comment(&str_of(content))
    }

    fn cdata(&mut self, start: usize) -> Result<()> {
        if self.open.is_empty() {
            return Err(self.error(start, "CDATA section outside the root element"));
        }
        self.scanner.advance(9);
        let content_start = self.scanner.position();
        let Some(end) = self.scanner.find_sequence(b"]]>") else {
            return Err(self.error(start, "unterminated CDATA section"));
        };
        let content = self.scanner.slice(content_start, end);
        self.scanner.set_position(end + 3);

        self.mark(start);
        self.handler.cdata(&str_of(content))
    }

    fn processing_instruction(&mut self, start: usize) -> Result<()> {
        self.scanner.advance(2);
        let Some(target) = self.scanner.read_name() else {
            return Err(self.error(start, "processing instruction without a target"));
        };
        if target.eq_ignore_ascii_case(b"xml") {
            return Err(self.error(start, "XML declaration allowed only at the start of the document"));
        }

        self.scanner.skip_whitespace();
        let data_start = self.scanner.position();
        let Some(end) = self.scanner.find_sequence(b"?>") else {
            return Err(self.error(start, "unterminated processing instruction"));
        };
        let data = self.scanner.slice(data_start, end);
        self.scanner.set_position(end + 2);

        self.mark(start);
        self.handler.processing_instruction(&str_of(target), &str_of(data))
    }

    fn doctype(&mut self, start: usize) -> Result<()> {
        if self.seen_doctype || self.seen_root {
            return Err(self.error(start, "DOCTYPE must appear once, before the root element"));
        }
        let Some(end) = self.doctype_end(start + 2) else {
            return Err(self.error(start, "unterminated DOCTYPE declaration"));
        };
        let location = self.locate(start);
        let doctype = parse_doctype(self.scanner.slice(start + 2, end));
        if let Err(message) = doctype.declarations.validate() {
            self.report(Severity::Error, message, location);
        }
        self.scanner.set_position(end + 1);
        self.seen_doctype = true;

        let declaration = doctype_declaration(&self.input[start..=end], &doctype);
        self.dtd = doctype.declarations;
        self.handler.set_location(location);
        self.handler.doctype(declaration)
    }

    /// Closing `>` of a DOCTYPE, skipping the internal subset
    fn doctype_end(&self, from: usize) -> Option<usize> {
        let input = self.input;
        let mut depth = 0usize;
        let mut quote = None;
        let mut i = from;
        while i < input.len() {
            let b = input[i];
            match quote {
                Some(q) if b == q => quote = None,
                Some(_) => {}
                None => match b {
                    b'"' | b'\'' => quote = Some(b),
                    b'[' => depth += 1,
                    b']' => depth = depth.saturating_sub(1),
                    b'<' if input[i..].starts_with(b"<!--") => {
                        let mut comment = Scanner::new(input);
                        comment.set_position(i + 4);
                        i = comment.find_sequence(b"-->")? + 2;
                    }
                    b'>' if depth == 0 => return Some(i),
                    _ => {}
                },
            }
            i += 1;
        }
        None
    }

    fn text(&mut self) -> Result<()> {
        let start = self.scanner.position();
        let end = self.scanner.find_byte(b'<').unwrap_or(self.input.len());
        let raw = self.scanner.slice(start, end);
        self.scanner.set_position(end);

        if self.open.is_empty() {
            if raw.iter().all(|&b| is_space(b)) {
                self.mark(start);
                return self.handler.whitespace(&str_of(raw));
            }
            let offset = start + raw.iter().take_while(|&&b| is_space(b)).count();
            let message = if self.seen_root {
                "text after the root element"
            } else {
                "text before the root element"
            };
            return Err(self.error(offset, message));
        }

        self.mark(start);
        if memchr(b'&', raw).is_none() {
            return self.handler.characters(&str_of(raw));
        }
        self.content_text(raw, start)
    }

    /// Text with references: built-in and character references are decoded
    /// inline, each general entity is delivered on its own
    fn content_text(&mut self, raw: &'a [u8], start: usize) -> Result<()> {
        let mut pending = Vec::with_capacity(raw.len());
        let mut utf8 = [0u8; 4];

        for segment in segments(raw) {
            match segment {
                Segment::Literal(bytes) => pending.extend_from_slice(bytes),
                Segment::Char(c) => pending.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes()),
                Segment::Malformed(bytes) => {
                    let location = self.locate(start);
                    self.report(
                        Severity::Error,
                        format!("malformed reference '{}'", str_of(bytes)),
                        location,
                    );
                    pending.extend_from_slice(bytes);
                }
                Segment::Entity(name) => {
                    if !pending.is_empty() {
                        self.handler.characters(&str_of(&pending))?;
                        pending.clear();
                    }
                    self.entity(name, start)?;
                }
            }
        }

        if !pending.is_empty() {
            self.handler.characters(&str_of(&pending))?;
        }
        Ok(())
    }

    fn entity(&mut self, name: &[u8], offset: usize) -> Result<()> {
        let replacement = self.replacement_text(name, offset, 0)?;
        let name = str_of(name);
        self.mark(offset);
        match replacement {
            Some(text) if self.config.replace_entity_references => self.handler.entity_text(&name, &text),
            replacement => self.handler.entity_reference(&name, replacement.as_deref()),
        }
    }

    /// Fully expanded replacement text, `None` when it cannot be obtained
    fn replacement_text(&mut self, name: &[u8], offset: usize, depth: usize) -> Result<Option<String>> {
        let location = self.locate(offset);
        let Some(decl) = self.dtd.entities.get(name) else {
            self.report(
                Severity::Error,
                format!("undeclared entity '{}'", str_of(name)),
                location,
            );
            return Ok(None);
        };
        if decl.ndata.is_some() {
            self.report(
                Severity::Error,
                format!("reference to unparsed entity '{}'", str_of(name)),
                location,
            );
            return Ok(None);
        }

        let raw = match &decl.value {
            Some(value) if !decl.is_external => value.clone(),
            _ => {
                let id = ExternalId {
                    name: str_of(name).into_owned(),
                    public_id: opt_string(&decl.public_id),
                    system_id: opt_string(&decl.system_id),
                };
                match self.config.resolve(&id) {
                    Some(bytes) => normalize_line_endings(bytes),
                    None => {
                        self.report(
                            Severity::Warning,
                            format!("unresolved external entity '{}'", id.name),
                            location,
                        );
                        return Ok(None);
                    }
                }
            }
        };

        if depth >= MAX_ENTITY_DEPTH || self.expanding.iter().any(|open| open == name) {
            return Err(XmlError::malformed(
                format!("recursive reference to entity '{}'", str_of(name)),
                location,
            ));
        }

        self.expanding.push(name.to_vec());
        let expanded = self.expand(&raw, offset, depth);
        self.expanding.pop();
        expanded.map(Some)
    }

    fn expand(&mut self, raw: &[u8], offset: usize, depth: usize) -> Result<String> {
        let mut out = Vec::with_capacity(raw.len());
        let mut utf8 = [0u8; 4];
        for segment in segments(raw) {
            match segment {
                Segment::Literal(bytes) | Segment::Malformed(bytes) => out.extend_from_slice(bytes),
                Segment::Char(c) => out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes()),
                Segment::Entity(inner) => match self.replacement_text(inner, offset, depth + 1)? {
                    Some(text) => out.extend_from_slice(text.as_bytes()),
                    None => {
                        out.push(b'&');
                        out.extend_from_slice(inner);
                        out.push(b';');
                    }
                },
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

fn doctype_declaration(text: &[u8], doctype: &Doctype) -> DoctypeDeclaration {
    let declarations = &doctype.declarations;

    let mut entities: Vec<EntityDeclaration> = declarations
        .entities
        .iter()
        .map(|(name, decl)| EntityDeclaration {
            name: str_of(name).into_owned(),
            value: opt_string(&decl.value),
            public_id: opt_string(&decl.public_id),
            system_id: opt_string(&decl.system_id),
            notation: opt_string(&decl.ndata),
        })
        .collect();
    entities.sort_by(|a, b| a.name.cmp(&b.name));

    let mut notations: Vec<NotationDeclaration> = declarations
        .notations
        .iter()
        .map(|(name, decl)| NotationDeclaration {
            name: str_of(name).into_owned(),
            public_id: opt_string(&decl.public_id),
            system_id: opt_string(&decl.system_id),
        })
        .collect();
    notations.sort_by(|a, b| a.name.cmp(&b.name));

    DoctypeDeclaration {
        text: str_of(text).into_owned(),
        root: str_of(&doctype.root).into_owned(),
        public_id: opt_string(&doctype.public_id),
        system_id: opt_string(&doctype.system_id),
        entities,
        notations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Handler that records every callback as a line of text
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        locations: Vec<Location>,
        doctype: Option<DoctypeDeclaration>,
    }

    impl ContentHandler for Recorder {
        fn set_location(&mut self, location: Location) {
            self.locations.push(location);
        }

        fn start_document(&mut self, declaration: XmlDeclaration) -> Result<()> {
            self.events.push(format!(
                "start-doc {:?} {:?} {:?}",
                declaration.version, declaration.encoding, declaration.standalone
            ));
            Ok(())
        }

        fn end_document(&mut self) -> Result<()> {
            self.events.push("end-doc".to_string());
            Ok(())
        }

        fn doctype(&mut self, declaration: DoctypeDeclaration) -> Result<()> {
            self.events.push(format!("doctype {}", declaration.root));
            self.doctype = Some(declaration);
            Ok(())
        }

        fn start_element(&mut self, name: &str, attributes: &[Attribute<'_>]) -> Result<()> {
            let attrs: Vec<String> = attributes
                .iter()
                .map(|a| {
                    let marker = if a.specified { "" } else { "?" };
                    format!(
                        "{}{}={}:{}",
                        marker,
                        a.name_str().unwrap_or_default(),
                        a.value_str().unwrap_or_default(),
                        a.att_type
                    )
                })
                .collect();
            self.events.push(format!("start {} [{}]", name, attrs.join(" ")));
            Ok(())
        }

        fn end_element(&mut self, name: &str) -> Result<()> {
            self.events.push(format!("end {name}"));
            Ok(())
        }

        fn characters(&mut self, text: &str) -> Result<()> {
            self.events.push(format!("chars {text:?}"));
            Ok(())
        }

        fn cdata(&mut self, text: &str) -> Result<()> {
            self.events.push(format!("cdata {text:?}"));
            Ok(())
        }

        fn whitespace(&mut self, text: &str) -> Result<()> {
            self.events.push(format!("space {text:?}"));
            Ok(())
        }

        fn comment(&mut self, text: &str) -> Result<()> {
            self.events.push(format!("comment {text:?}"));
            Ok(())
        }

        fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
            self.events.push(format!("pi {target} {data:?}"));
            Ok(())
        }

        fn entity_text(&mut self, name: &str, text: &str) -> Result<()> {
            self.events.push(format!("entity-text {name} {text:?}"));
            Ok(())
        }

        fn entity_reference(&mut self, name: &str, replacement: Option<&str>) -> Result<()> {
            self.events.push(format!("entity-ref {name} {replacement:?}"));
            Ok(())
        }
    }

    fn run_with(xml: &str, config: &ReaderConfig) -> (Recorder, Result<()>) {
        let mut recorder = Recorder::default();
        let result = XmlSource::from_text(xml).parse(&mut recorder, config);
        (recorder, result)
    }

    fn events(xml: &str) -> Vec<String> {
        let (recorder, result) = run_with(xml, &ReaderConfig::default());
        result.unwrap();
        recorder.events
    }

    fn parse_error(xml: &str) -> String {
        let (_, result) = run_with(xml, &ReaderConfig::default());
        result.unwrap_err().to_string()
    }

    fn collecting_config() -> (ReaderConfig, Arc<Mutex<Vec<Diagnostic>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let config = ReaderConfig {
            reporter: Some(Arc::new(move |d: &Diagnostic| sink.lock().unwrap().push(d.clone()))),
            ..ReaderConfig::default()
        };
        (config, seen)
    }

    #[test]
    fn test_simple_document() {
        assert_eq!(
            events("<a><b>text</b><c/></a>"),
            vec![
                "start-doc None None None",
                "start a []",
                "start b []",
                "chars \"text\"",
                "end b",
                "start c []",
                "end c",
                "end a",
                "end-doc",
            ]
        );
    }

    #[test]
    fn test_declaration() {
        let events = events("<?xml version=\"1.0\" encoding='UTF-8' standalone=\"yes\"?><r/>");
        assert_eq!(events[0], "start-doc Some(\"1.0\") Some(\"UTF-8\") Some(true)");

        let error = parse_error("<?xml version=\"1.0\" standalone=\"maybe\"?><r/>");
        assert!(error.contains("invalid standalone value"));
    }

    #[test]
    fn test_misc_outside_root() {
        assert_eq!(
            events("<?pi data?>\n<!-- c -->\n<r/>\n"),
            vec![
                "start-doc None None None",
                "pi pi \"data\"",
                "space \"\\n\"",
                "comment \" c \"",
                "space \"\\n\"",
                "start r []",
                "end r",
                "space \"\\n\"",
                "end-doc",
            ]
        );
    }

    #[test]
    fn test_cdata_and_references() {
        assert_eq!(
            events("<r>&lt;x&#65;&#x42;<![CDATA[<raw>&amp;]]></r>"),
            vec![
                "start-doc None None None",
                "start r []",
                "chars \"<xAB\"",
                "cdata \"<raw>&amp;\"",
                "end r",
                "end-doc",
            ]
        );
    }

    #[test]
    fn test_attribute_normalization() {
        let events = events("<r a=\"x&#10;y\" b='1\t2\r\n3' c=\"&quot;q&quot;\"/>");
        assert_eq!(events[1], "start r [a=x\ny:CDATA b=1 2 3:CDATA c=\"q\":CDATA]");
    }

    #[test]
    fn test_line_breaks_folded_before_references() {
        let xml = "<r a=\"1&#13;2\r3\"><!--c\r\n-->x\r\ny&#13;&#10;z</r>";
        assert_eq!(XmlSource::from_text(xml).as_bytes().iter().filter(|&&b| b == b'\r').count(), 0);
        let events = events(xml);
        assert_eq!(events[1], "start r [a=1\r2 3:CDATA]");
        assert_eq!(events[2], "comment \"c\\n\"");
        assert_eq!(events[3], "chars \"x\\ny\\r\\nz\"");
    }

    #[test]
    fn test_mismatched_end_tag() {
        let error = parse_error("<a>\n  <b></c>\n</a>");
        assert!(error.contains("mismatched end tag: expected </b>, found </c>"));
        assert!(error.contains("line 2, column 6"));
    }

    #[test]
    fn test_structure_errors() {
        assert!(parse_error("<a><b></b>").contains("unclosed element <a>"));
        assert!(parse_error("<a></a><b/>").contains("content after the root element"));
        assert!(parse_error("<a></a>text").contains("text after the root element"));
        assert!(parse_error("  hello<a/>").contains("text before the root element"));
        assert!(parse_error("<!-- only -->").contains("no root element"));
        assert!(parse_error("</a>").contains("unexpected end tag"));
        assert!(parse_error("<a><1/></a>").contains("not followed by a name"));
    }

    #[test]
    fn test_unterminated_constructs() {
        assert!(parse_error("<a><!-- never closed</a>").contains("unterminated comment"));
        assert!(parse_error("<a><![CDATA[x</a>").contains("unterminated CDATA"));
        assert!(parse_error("<a><?pi x</a>").contains("unterminated processing instruction"));
        assert!(parse_error("<a b=\"1\"").contains("unterminated start tag"));
        assert!(parse_error("<a/><?xml version=\"1.0\"?>").contains("XML declaration"));
    }

    #[test]
    fn test_events_before_error_are_delivered() {
        let (recorder, result) = run_with("<a><b>x</c></a>", &ReaderConfig::default());
        assert!(result.is_err());
        assert_eq!(recorder.events.last().map(String::as_str), Some("chars \"x\""));
    }

    #[test]
    fn test_internal_entity_replaced() {
        let xml = "<!DOCTYPE r [<!ENTITY who \"wor&amp;ld\"><!ENTITY greet \"hello &who;\">]><r>say &greet;!</r>";
        assert_eq!(
            events(xml),
            vec![
                "start-doc None None None",
                "doctype r",
                "start r []",
                "chars \"say \"",
                "entity-text greet \"hello wor&ld\"",
                "chars \"!\"",
                "end r",
                "end-doc",
            ]
        );
    }

    #[test]
    fn test_entity_reference_kept() {
        let config = ReaderConfig {
            replace_entity_references: false,
            ..ReaderConfig::default()
        };
        let (recorder, result) = run_with("<!DOCTYPE r [<!ENTITY e \"text\">]><r>&e;</r>", &config);
        result.unwrap();
        assert!(recorder.events.contains(&"entity-ref e Some(\"text\")".to_string()));
    }

    #[test]
    fn test_undeclared_entity_reported() {
        let (config, seen) = collecting_config();
        let (recorder, result) = run_with("<r>a&nope;b</r>", &config);
        result.unwrap();
        assert!(recorder.events.contains(&"entity-ref nope None".to_string()));

        let diagnostics = seen.lock().unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert!(diagnostics[0].message.contains("undeclared entity 'nope'"));
    }

    #[test]
    fn test_external_entity_resolved() {
        let (mut config, seen) = collecting_config();
        config.resolver = Some(Arc::new(|id: &ExternalId| {
            (id.system_id.as_deref() == Some("chapter.xml")).then(|| b"re\r\nsolved".to_vec())
        }));
        let xml = "<!DOCTYPE r [<!ENTITY ch SYSTEM \"chapter.xml\"><!ENTITY gone SYSTEM \"x.xml\">]><r>&ch;&gone;</r>";
        let (recorder, result) = run_with(xml, &config);
        result.unwrap();
        assert!(recorder.events.contains(&"entity-text ch \"re\\nsolved\"".to_string()));
        assert!(recorder.events.contains(&"entity-ref gone None".to_string()));
        assert_eq!(seen.lock().unwrap()[0].severity, Severity::Warning);
    }

    #[test]
    fn test_recursive_entity_fails() {
        let (config, seen) = collecting_config();
        let xml = "<!DOCTYPE r [<!ENTITY a \"&b;\"><!ENTITY b \"&a;\">]><r>&a;</r>";
        let (_, result) = run_with(xml, &config);
        assert!(result.unwrap_err().to_string().contains("recursive reference"));
        // The declarations were already flagged when the DOCTYPE was read
        assert!(seen.lock().unwrap()[0].message.contains("references itself"));
    }

    #[test]
    fn test_attribute_defaults_and_types() {
        let xml = "<!DOCTYPE r [\
            <!ATTLIST r id ID #REQUIRED kind (big|small) \"small\" note CDATA #IMPLIED>\
            ]><r id=\"r1\"/>";
        let events = events(xml);
        assert_eq!(events[2], "start r [id=r1:ID ?kind=small:ENUMERATION]");
    }

    #[test]
    fn test_doctype_declaration_contents() {
        let xml = "<!DOCTYPE doc PUBLIC \"-//X//EN\" \"doc.dtd\" [\
            <!-- ] > inside comment -->\
            <!ENTITY b \"two\"><!ENTITY a \"one\">\
            <!NOTATION png SYSTEM \"image/png\">\
            ]><doc/>";
        let (recorder, result) = run_with(xml, &ReaderConfig::default());
        result.unwrap();
        let doctype = recorder.doctype.unwrap();
        assert_eq!(doctype.root, "doc");
        assert_eq!(doctype.public_id.as_deref(), Some("-//X//EN"));
        assert_eq!(doctype.system_id.as_deref(), Some("doc.dtd"));
        assert!(doctype.text.starts_with("<!DOCTYPE doc"));
        assert!(doctype.text.ends_with("]>"));
        let names: Vec<&str> = doctype.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(doctype.notations[0].system_id.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_second_doctype_rejected() {
        assert!(parse_error("<!DOCTYPE a><!DOCTYPE a><a/>").contains("DOCTYPE must appear once"));
    }

    #[test]
    fn test_locations_reported() {
        let (recorder, result) = run_with("<a>\n  <b/>\n</a>", &ReaderConfig::default());
        result.unwrap();
        assert!(recorder.locations.contains(&Location::new(2, 3, 6)));
    }

    #[test]
    fn test_utf16_input() {
        let bytes: Vec<u8> = std::iter::once(0xFEFFu16)
            .chain("<r>é</r>".encode_utf16())
            .flat_map(|u| u.to_le_bytes())
            .collect();
        let source = XmlSource::from_bytes(bytes).unwrap();
        assert_eq!(source.encoding(), XmlEncoding::Utf16Le);
        assert_eq!(source.as_bytes(), "<r>é</r>".as_bytes());
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let error = XmlSource::from_bytes(vec![b'<', b'r', b'>', 0xFF, b'<', b'/', b'r', b'>']).unwrap_err();
        assert!(matches!(error, XmlError::Encoding(_)));
    }

    #[test]
    fn test_from_reader_with_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"<r/>");
        let source = XmlSource::from_reader(std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(source.as_bytes(), b"<r/>");
        assert_eq!(source.encoding(), XmlEncoding::Utf8);
    }

    #[test]
    fn test_handler_error_stops_parse() {
        struct StopAtB(usize);
        impl ContentHandler for StopAtB {
            fn start_document(&mut self, _: XmlDeclaration) -> Result<()> {
                Ok(())
            }
            fn end_document(&mut self) -> Result<()> {
                Ok(())
            }
            fn start_element(&mut self, name: &str, _: &[Attribute<'_>]) -> Result<()> {
                self.0 += 1;
                if name == "b" {
                    return Err(XmlError::Interrupted);
                }
                Ok(())
            }
            fn end_element(&mut self, _: &str) -> Result<()> {
                Ok(())
            }
            fn characters(&mut self, _: &str) -> Result<()> {
                Ok(())
            }
        }

        let mut handler = StopAtB(0);
        let result = XmlSource::from_text("<a><b/><c/></a>").parse(&mut handler, &ReaderConfig::default());
        assert!(matches!(result, Err(XmlError::Interrupted)));
        assert_eq!(handler.0, 2);
    }
}
