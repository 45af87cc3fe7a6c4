//! Core XML scanning primitives
//!
//! Byte-level building blocks shared by the push sources:
//! - `scanner`: memchr-accelerated delimiter search and line tracking
//! - `entities`: character/entity reference decoding
//! - `encoding`: BOM detection and UTF-16 conversion
//! - `attributes`: attribute list parsing
//! - `dtd`: DOCTYPE internal subset declarations

pub mod attributes;
pub mod dtd;
pub mod encoding;
pub mod entities;
pub mod scanner;

pub use attributes::{parse_attributes, parse_attributes_with, Attribute};
pub use dtd::{parse_doctype, DtdDeclarations};
pub use encoding::{convert_to_utf8, normalize_line_endings, XmlEncoding};
pub use entities::{decode_text, segments, Segment};
pub use scanner::{LineTracker, Scanner};
