//! Tree Source
//!
//! Walks an in-memory element tree and reports it as push events, the same
//! events [`XmlSource`](super::XmlSource) would report for the serialized
//! document. Namespace declarations are ordinary `xmlns` attributes.
//!
//! The walk uses an explicit stack, so tree depth is not limited by the
//! worker thread's stack size.

use super::{ContentHandler, EventSource, XmlDeclaration};
use crate::buffer::Producer;
use crate::core::Attribute;
use crate::error::{Location, Result, XmlError};
use crate::stream::ReaderConfig;

/// A node of a materialized document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    Element {
        name: String,
        attributes: Vec<(String, String)>,
        children: Vec<TreeNode>,
    },
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

impl TreeNode {
    pub fn element(name: impl Into<String>) -> Self {
        TreeNode::Element {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        TreeNode::Text(text.into())
    }

    /// Add an attribute to an element; other nodes are returned unchanged
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let TreeNode::Element { attributes, .. } = &mut self {
            attributes.push((name.into(), value.into()));
        }
        self
    }

    /// Append a child to an element; other nodes are returned unchanged
    pub fn with_child(mut self, child: TreeNode) -> Self {
        if let TreeNode::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    /// Shorthand for appending a text child
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(TreeNode::Text(text.into()))
    }
}

/// A document made of one root element plus surrounding comments and PIs
#[derive(Debug, Clone)]
pub struct TreeSource {
    prolog: Vec<TreeNode>,
    root: TreeNode,
}

impl TreeSource {
    pub fn new(root: TreeNode) -> Self {
        TreeSource {
            prolog: Vec::new(),
            root,
        }
    }

    /// Comments and processing instructions reported before the root
    pub fn with_prolog(mut self, prolog: Vec<TreeNode>) -> Self {
        self.prolog = prolog;
        self
    }
}

enum Step<'t> {
    Enter(&'t TreeNode),
    Leave(&'t str),
}

impl EventSource for TreeSource {
    const PRODUCER: Producer = Producer::Chars;

    fn parse<H: ContentHandler>(self, handler: &mut H, _config: &ReaderConfig) -> Result<()> {
        if !matches!(self.root, TreeNode::Element { .. }) {
            return Err(XmlError::malformed(
                "the root of a tree document must be an element",
                Location::UNKNOWN,
            ));
        }
        if let Some(node) = self
            .prolog
            .iter()
            .find(|node| !matches!(node, TreeNode::Comment(_) | TreeNode::ProcessingInstruction { .. }))
        {
            return Err(XmlError::malformed(
                format!("only comments and processing instructions may precede the root, found {node:?}"),
                Location::UNKNOWN,
            ));
        }

        handler.set_location(Location::UNKNOWN);
        handler.start_document(XmlDeclaration {
            version: Some("1.0".to_string()),
            ..XmlDeclaration::default()
        })?;

        let mut stack: Vec<Step<'_>> = vec![Step::Enter(&self.root)];
        stack.extend(self.prolog.iter().rev().map(Step::Enter));
        let mut attributes = Vec::new();

        while let Some(step) = stack.pop() {
            let node = match step {
                Step::Leave(name) => {
                    handler.end_element(name)?;
                    continue;
                }
                Step::Enter(node) => node,
            };
            match node {
                TreeNode::Element {
                    name,
                    attributes: attrs,
                    children,
                } => {
                    attributes.clear();
                    attributes.extend(
                        attrs
                            .iter()
                            .map(|(n, v)| Attribute::new(n.as_bytes(), v.as_bytes().into())),
                    );
                    handler.start_element(name, &attributes)?;
                    stack.push(Step::Leave(name));
                    stack.extend(children.iter().rev().map(Step::Enter));
                }
                TreeNode::Text(text) => handler.characters(text)?,
                TreeNode::CData(text) => handler.cdata(text)?,
                TreeNode::Comment(text) => handler.comment(text)?,
                TreeNode::ProcessingInstruction { target, data } => {
                    handler.processing_instruction(target, data)?
                }
            }
        }

        handler.end_document()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl ContentHandler for Recorder {
        fn start_document(&mut self, declaration: XmlDeclaration) -> Result<()> {
            self.0.push(format!("start-doc {:?}", declaration.version));
            Ok(())
        }
        fn end_document(&mut self) -> Result<()> {
            self.0.push("end-doc".to_string());
            Ok(())
        }
        fn start_element(&mut self, name: &str, attributes: &[Attribute<'_>]) -> Result<()> {
            let attrs: Vec<&str> = attributes.iter().filter_map(|a| a.name_str()).collect();
            self.0.push(format!("start {name} {attrs:?}"));
            Ok(())
        }
        fn end_element(&mut self, name: &str) -> Result<()> {
            self.0.push(format!("end {name}"));
            Ok(())
        }
        fn characters(&mut self, text: &str) -> Result<()> {
            self.0.push(format!("chars {text}"));
            Ok(())
        }
        fn comment(&mut self, text: &str) -> Result<()> {
            self.0.push(format!("comment {text}"));
            Ok(())
        }
    }

    #[test]
    fn test_walk_order() {
        let root = TreeNode::element("a")
            .with_attribute("xmlns:p", "urn:p")
            .with_child(TreeNode::element("p:b").with_text("x"))
            .with_child(TreeNode::Comment("c".to_string()))
            .with_child(TreeNode::element("c"));
        let mut recorder = Recorder::default();
        TreeSource::new(root)
            .with_prolog(vec![TreeNode::Comment("lead".to_string())])
            .parse(&mut recorder, &ReaderConfig::default())
            .unwrap();
        assert_eq!(
            recorder.0,
            vec![
                "start-doc Some(\"1.0\")",
                "comment lead",
                "start a [\"xmlns:p\"]",
                "start p:b []",
                "chars x",
                "end p:b",
                "comment c",
                "start c []",
                "end c",
                "end a",
                "end-doc",
            ]
        );
    }

    #[test]
    fn test_cdata_defaults_to_characters() {
        let root = TreeNode::element("a").with_child(TreeNode::CData("raw".to_string()));
        let mut recorder = Recorder::default();
        TreeSource::new(root)
            .parse(&mut recorder, &ReaderConfig::default())
            .unwrap();
        assert!(recorder.0.contains(&"chars raw".to_string()));
    }

    #[test]
    fn test_non_element_root_rejected() {
        let mut recorder = Recorder::default();
        let result = TreeSource::new(TreeNode::text("x")).parse(&mut recorder, &ReaderConfig::default());
        assert!(matches!(result, Err(XmlError::Malformed { .. })));
        assert!(recorder.0.is_empty());

        let result = TreeSource::new(TreeNode::element("a"))
            .with_prolog(vec![TreeNode::element("b")])
            .parse(&mut recorder, &ReaderConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_deep_tree_walk() {
        let mut node = TreeNode::element("leaf");
        for _ in 0..2_000 {
            node = TreeNode::element("n").with_child(node);
        }
        let mut recorder = Recorder::default();
        TreeSource::new(node)
            .parse(&mut recorder, &ReaderConfig::default())
            .unwrap();
        assert_eq!(recorder.0.len(), 2 + 2 * 2_001);
    }
}
