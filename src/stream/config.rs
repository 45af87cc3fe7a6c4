//! Reader Configuration
//!
//! Options are fixed when a reader is created. `InputFactory` is the builder
//! that carries them to every reader it makes.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use crate::buffer::DEFAULT_CHUNK_SHIFT;
use crate::error::Result;
use crate::event::EventReader;
use crate::source::{Diagnostic, ExternalId, Severity, TreeNode, TreeSource, XmlSource};

use super::StreamReader;

/// Callback resolving an external entity to its replacement bytes
pub type EntityResolver = Arc<dyn Fn(&ExternalId) -> Option<Vec<u8>> + Send + Sync>;

/// Callback receiving non-fatal diagnostics
pub type DiagnosticReporter = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

#[derive(Clone)]
pub struct ReaderConfig {
    /// Merge adjacent character callbacks into one CHARACTERS event
    pub coalescing: bool,
    /// Replace general entity references with their text
    pub replace_entity_references: bool,
    pub resolver: Option<EntityResolver>,
    pub reporter: Option<DiagnosticReporter>,
    /// log2 of the code units per pool chunk
    pub chunk_shift: u32,
}

impl ReaderConfig {
    /// Hand a diagnostic to the reporter, or log it when there is none
    pub fn report(&self, diagnostic: Diagnostic) {
        match &self.reporter {
            Some(reporter) => reporter(&diagnostic),
            None => match diagnostic.severity {
                Severity::Warning => tracing::warn!(
                    location = %diagnostic.location,
                    "{}",
                    diagnostic.message
                ),
                Severity::Error => tracing::error!(
                    location = %diagnostic.location,
                    "{}",
                    diagnostic.message
                ),
            },
        }
    }

    /// Replacement bytes for an external entity, if a resolver knows it
    pub fn resolve(&self, id: &ExternalId) -> Option<Vec<u8>> {
        self.resolver.as_ref().and_then(|resolver| resolver(id))
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            coalescing: false,
            replace_entity_references: true,
            resolver: None,
            reporter: None,
            chunk_shift: DEFAULT_CHUNK_SHIFT,
        }
    }
}

impl fmt::Debug for ReaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderConfig")
            .field("coalescing", &self.coalescing)
            .field("replace_entity_references", &self.replace_entity_references)
            .field("resolver", &self.resolver.is_some())
            .field("reporter", &self.reporter.is_some())
            .field("chunk_shift", &self.chunk_shift)
            .finish()
    }
}

/// Builder for readers sharing one configuration
///
/// ```
/// use xmlcursor::InputFactory;
///
/// let mut reader = InputFactory::new()
///     .coalescing(true)
///     .create_reader_from_str("<a>x<![CDATA[y]]></a>")
///     .unwrap();
/// reader.next().unwrap();
/// assert_eq!(reader.element_text().unwrap(), "xy");
/// ```
#[derive(Debug, Clone, Default)]
pub struct InputFactory {
    config: ReaderConfig,
}

impl InputFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ReaderConfig) -> Self {
        InputFactory { config }
    }

    pub fn coalescing(mut self, enabled: bool) -> Self {
        self.config.coalescing = enabled;
        self
    }

    pub fn replace_entity_references(mut self, enabled: bool) -> Self {
        self.config.replace_entity_references = enabled;
        self
    }

    pub fn resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&ExternalId) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.config.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn reporter<F>(mut self, reporter: F) -> Self
    where
        F: Fn(&Diagnostic) + Send + Sync + 'static,
    {
        self.config.reporter = Some(Arc::new(reporter));
        self
    }

    pub fn chunk_shift(mut self, shift: u32) -> Self {
        self.config.chunk_shift = shift;
        self
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Cursor over a byte stream; the stream is read to its end first
    pub fn create_reader<R: Read>(&self, reader: R) -> Result<StreamReader> {
        StreamReader::with_config(XmlSource::from_reader(reader)?, self.config.clone())
    }

    pub fn create_reader_from_bytes(&self, bytes: impl Into<Vec<u8>>) -> Result<StreamReader> {
        StreamReader::with_config(XmlSource::from_bytes(bytes)?, self.config.clone())
    }

    pub fn create_reader_from_str(&self, text: &str) -> Result<StreamReader> {
        StreamReader::with_config(XmlSource::from_text(text), self.config.clone())
    }

    /// Cursor over a materialized tree
    pub fn create_tree_reader(&self, root: TreeNode) -> Result<StreamReader> {
        StreamReader::with_config(TreeSource::new(root), self.config.clone())
    }

    pub fn create_event_reader<R: Read>(&self, reader: R) -> Result<EventReader> {
        Ok(EventReader::new(self.create_reader(reader)?))
    }

    pub fn create_event_reader_from_str(&self, text: &str) -> Result<EventReader> {
        Ok(EventReader::new(self.create_reader_from_str(text)?))
    }

    pub fn create_tree_event_reader(&self, root: TreeNode) -> Result<EventReader> {
        Ok(EventReader::new(self.create_tree_reader(root)?))
    }
}
