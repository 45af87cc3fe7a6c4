//! Push Event Sources
//!
//! A source drives a [`ContentHandler`] through one whole document. The
//! handler's callbacks return `Result` so a consumer can stop the parse
//! early; sources propagate handler errors unchanged.
//!
//! - [`XmlSource`]: scans XML bytes
//! - [`TreeSource`]: walks an in-memory [`TreeNode`] tree

pub mod tree;
pub mod xml;

use crate::buffer::Producer;
use crate::core::Attribute;
use crate::error::{Location, Result};
use crate::stream::ReaderConfig;

pub use tree::{TreeNode, TreeSource};
pub use xml::XmlSource;

/// Contents of the `<?xml ...?>` declaration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlDeclaration {
    pub version: Option<String>,
    pub encoding: Option<String>,
    /// `None` when the declaration has no `standalone` pseudo-attribute
    pub standalone: Option<bool>,
}

/// Identifiers of an external entity, passed to the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalId {
    /// Entity name
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Non-fatal problem found while parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Location,
}

/// A general entity declared in the internal subset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDeclaration {
    pub name: String,
    /// Replacement text of an internal entity
    pub value: Option<String>,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// Notation of an unparsed entity
    pub notation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotationDeclaration {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

/// A `<!DOCTYPE ...>` declaration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoctypeDeclaration {
    /// The whole declaration as written
    pub text: String,
    pub root: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub entities: Vec<EntityDeclaration>,
    pub notations: Vec<NotationDeclaration>,
}

/// Receiver of push events
///
/// Text callbacks may be split arbitrarily: one run of character data can
/// arrive as several `characters` calls.
pub trait ContentHandler {
    /// Position of the construct the next callback reports
    fn set_location(&mut self, _location: Location) {}

    fn start_document(&mut self, declaration: XmlDeclaration) -> Result<()>;

    fn end_document(&mut self) -> Result<()>;

    fn doctype(&mut self, _declaration: DoctypeDeclaration) -> Result<()> {
        Ok(())
    }

    /// `attributes` holds every attribute as written, namespace
    /// declarations included, followed by DTD defaults
    fn start_element(&mut self, name: &str, attributes: &[Attribute<'_>]) -> Result<()>;

    fn end_element(&mut self, name: &str) -> Result<()>;

    fn characters(&mut self, text: &str) -> Result<()>;

    fn cdata(&mut self, text: &str) -> Result<()> {
        self.characters(text)
    }

    /// Whitespace that is not character data (outside the root element)
    fn whitespace(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    fn comment(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    fn processing_instruction(&mut self, _target: &str, _data: &str) -> Result<()> {
        Ok(())
    }

    /// Replacement text of an entity reference that was expanded in place
    fn entity_text(&mut self, _name: &str, text: &str) -> Result<()> {
        self.characters(text)
    }

    /// An entity reference left unexpanded; `replacement` is its text when known
    fn entity_reference(&mut self, _name: &str, _replacement: Option<&str>) -> Result<()> {
        Ok(())
    }
}

/// A document that can be pushed through a handler once
pub trait EventSource: Send + 'static {
    /// Chunk chain the cursor stores this source's text in
    const PRODUCER: Producer = Producer::Utf8;

    fn parse<H: ContentHandler>(self, handler: &mut H, config: &ReaderConfig) -> Result<()>;
}
