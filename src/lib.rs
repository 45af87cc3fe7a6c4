//! xmlcursor - Pull-cursor XML reading over push parsers
//!
//! Layers:
//! - `source`: push parsers (`XmlSource` for text, `TreeSource` for trees)
//! - `stream`: the background worker handshake and the `StreamReader` cursor
//! - `event`: owned `XmlEvent`s and an iterator-style `EventReader`
//! - `pool` / `buffer`: the interning string pool and its chunked storage
//! - `namespace`: scoped prefix bindings
//!
//! ```
//! use xmlcursor::{EventType, StreamReader};
//!
//! let mut reader = StreamReader::from_str("<list><item>a</item><item>b</item></list>").unwrap();
//! let mut items = Vec::new();
//! while reader.has_next() {
//!     if reader.next().unwrap() == EventType::START_ELEMENT && reader.local_name().unwrap() == "item" {
//!         items.push(reader.element_text().unwrap());
//!     }
//! }
//! assert_eq!(items, vec!["a", "b"]);
//! ```

pub mod buffer;
pub mod core;
pub mod error;
pub mod event;
pub mod namespace;
pub mod pool;
pub mod source;
pub mod stream;

pub use error::{Location, Result, XmlError};
pub use event::{EventReader, Namespace, OwnedAttribute, QualifiedName, XmlEvent};
pub use namespace::NamespaceContext;
pub use pool::{Handle, StringPool};
pub use source::{
    ContentHandler, Diagnostic, DoctypeDeclaration, EventSource, ExternalId, Severity, TreeNode, TreeSource,
    XmlDeclaration, XmlSource,
};
pub use stream::{EventType, InputFactory, NamespaceScope, ReaderConfig, StreamReader};

// ============================================================================
// Allocator Configuration
// ============================================================================

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;
