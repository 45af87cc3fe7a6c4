//! Namespace Context
//!
//! Stack of (prefix, URI, level) bindings over pool handles. A binding is
//! pushed at level 0 while its element's start tag is processed; entering
//! the element raises every active binding one level and leaving it lowers
//! them again. The first binding that drops to level 0 or below is evicted
//! together with everything pushed after it.
//!
//! The empty handle as a prefix names the default namespace; as a URI it
//! means "no namespace" (`xmlns=""`).

use crate::pool::{Handle, StringPool};

/// Well-known namespace URIs
pub mod ns {
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";
}

/// Namespace binding (prefix -> URI)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceBinding {
    pub prefix: Handle,
    pub uri: Handle,
    level: i32,
}

impl NamespaceBinding {
    /// Number of open elements since the binding was declared
    pub fn level(&self) -> i32 {
        self.level
    }
}

/// Scoped namespace bindings for one cursor
#[derive(Debug)]
pub struct NamespaceContext {
    bindings: Vec<NamespaceBinding>,
    /// Per open element: the range of bindings it declared
    scopes: Vec<(usize, usize)>,
    /// Start of the declarations of the element being opened
    mark: usize,
    xml_prefix: Handle,
    xmlns_prefix: Handle,
    xml_uri: Handle,
    xmlns_uri: Handle,
}

impl NamespaceContext {
    /// Create a context with the reserved `xml` and `xmlns` prefixes interned
    pub fn new(pool: &mut StringPool) -> Self {
        NamespaceContext {
            bindings: Vec::with_capacity(16),
            scopes: Vec::with_capacity(16),
            mark: 0,
            xml_prefix: pool.add_symbol("xml"),
            xmlns_prefix: pool.add_symbol("xmlns"),
            xml_uri: pool.add_symbol(ns::XML),
            xmlns_uri: pool.add_symbol(ns::XMLNS),
        }
    }

    /// Bind `prefix` for the element about to be entered
    ///
    /// Returns false for the reserved prefixes, which cannot be rebound.
    pub fn add_namespace(&mut self, prefix: Handle, uri: Handle) -> bool {
        if prefix == self.xml_prefix || prefix == self.xmlns_prefix {
            return false;
        }
        self.bindings.push(NamespaceBinding {
            prefix,
            uri,
            level: 0,
        });
        true
    }

    /// Enter an element whose declarations have been added
    pub fn on_start_element(&mut self) {
        self.scopes.push((self.mark, self.bindings.len()));
        for binding in &mut self.bindings {
            binding.level += 1;
        }
        self.mark = self.bindings.len();
    }

    /// Leave the innermost element
    pub fn on_end_element(&mut self) {
        self.scopes.pop();
        for binding in &mut self.bindings {
            binding.level -= 1;
        }
        if let Some(expired) = self.bindings.iter().position(|b| b.level <= 0) {
            self.bindings.truncate(expired);
        }
        self.mark = self.bindings.len();
    }

    /// URI bound to `prefix`; the most recent binding wins
    pub fn namespace_uri(&self, prefix: Handle) -> Option<Handle> {
        if prefix == self.xml_prefix {
            return Some(self.xml_uri);
        }
        if prefix == self.xmlns_prefix {
            return Some(self.xmlns_uri);
        }
        self.bindings
            .iter()
            .rev()
            .find(|b| b.prefix == prefix)
            .map(|b| b.uri)
    }

    /// A prefix currently bound to `uri`, scanning from the innermost binding
    ///
    /// Prefixes already passed during the scan are shadowed and skipped, so a
    /// prefix rebound to another URI further in is never returned.
    pub fn prefix_for(&self, uri: Handle) -> Option<Handle> {
        if uri == self.xml_uri {
            return Some(self.xml_prefix);
        }
        if uri == self.xmlns_uri {
            return Some(self.xmlns_prefix);
        }
        let mut seen = Vec::new();
        for binding in self.bindings.iter().rev() {
            if seen.contains(&binding.prefix) {
                continue;
            }
            if binding.uri == uri {
                return Some(binding.prefix);
            }
            seen.push(binding.prefix);
        }
        None
    }

    /// Bindings declared by the innermost open element
    pub fn declared_in_current(&self) -> &[NamespaceBinding] {
        match self.scopes.last() {
            Some(&(start, end)) => self.bindings.get(start..end).unwrap_or(&[]),
            None => &[],
        }
    }

    /// In-scope bindings, most recent first, one per prefix
    pub fn active_bindings(&self) -> impl Iterator<Item = NamespaceBinding> + '_ {
        let mut seen = Vec::new();
        self.bindings.iter().rev().filter_map(move |b| {
            if seen.contains(&b.prefix) {
                None
            } else {
                seen.push(b.prefix);
                Some(*b)
            }
        })
    }

    /// Number of open elements
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_reserved_prefix(&self, prefix: Handle) -> bool {
        prefix == self.xml_prefix || prefix == self.xmlns_prefix
    }

    /// Handle of the `xmlns` prefix
    pub fn xmlns_prefix(&self) -> Handle {
        self.xmlns_prefix
    }

    pub fn reset(&mut self) {
        self.bindings.clear();
        self.scopes.clear();
        self.mark = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (StringPool, NamespaceContext) {
        let mut pool = StringPool::new();
        let context = NamespaceContext::new(&mut pool);
        (pool, context)
    }

    #[test]
    fn test_reserved_prefixes() {
        let (mut pool, mut context) = setup();
        let xml = pool.add_symbol("xml");
        let uri = pool.add_symbol(ns::XML);
        assert_eq!(context.namespace_uri(xml), Some(uri));
        assert_eq!(context.prefix_for(uri), Some(xml));

        let other = pool.add_symbol("urn:other");
        assert!(!context.add_namespace(xml, other));
        assert_eq!(context.namespace_uri(xml), Some(uri));
    }

    #[test]
    fn test_nested_shadowing() {
        let (mut pool, mut context) = setup();
        let p = pool.add_symbol("p");
        let uris: Vec<Handle> = (1..=3).map(|n| pool.add_symbol(&format!("urn:{n}"))).collect();

        for &uri in &uris {
            context.add_namespace(p, uri);
            context.on_start_element();
        }
        assert_eq!(context.namespace_uri(p), Some(uris[2]));

        context.on_end_element();
        assert_eq!(context.namespace_uri(p), Some(uris[1]));
        context.on_end_element();
        assert_eq!(context.namespace_uri(p), Some(uris[0]));
        context.on_end_element();
        assert_eq!(context.namespace_uri(p), None);
    }

    #[test]
    fn test_binding_survives_undeclaring_children() {
        let (mut pool, mut context) = setup();
        let p = pool.add_symbol("p");
        let uri = pool.add_symbol("urn:outer");

        context.add_namespace(p, uri);
        context.on_start_element();
        // Two plain children
        context.on_start_element();
        context.on_end_element();
        context.on_start_element();
        assert_eq!(context.namespace_uri(p), Some(uri));
        context.on_end_element();
        assert_eq!(context.namespace_uri(p), Some(uri));
        assert_eq!(context.declared_in_current().len(), 1);

        context.on_end_element();
        assert_eq!(context.namespace_uri(p), None);
        assert_eq!(context.depth(), 0);
    }

    #[test]
    fn test_declared_in_current() {
        let (mut pool, mut context) = setup();
        let a = pool.add_symbol("a");
        let b = pool.add_symbol("b");
        let uri = pool.add_symbol("urn:x");

        context.add_namespace(a, uri);
        context.on_start_element();
        assert_eq!(context.declared_in_current().len(), 1);

        context.on_start_element();
        assert!(context.declared_in_current().is_empty());
        context.on_end_element();

        context.add_namespace(b, uri);
        context.add_namespace(Handle::EMPTY, uri);
        context.on_start_element();
        let declared: Vec<Handle> = context.declared_in_current().iter().map(|b| b.prefix).collect();
        assert_eq!(declared, vec![b, Handle::EMPTY]);
    }

    #[test]
    fn test_prefix_for_skips_shadowed() {
        let (mut pool, mut context) = setup();
        let p = pool.add_symbol("p");
        let q = pool.add_symbol("q");
        let one = pool.add_symbol("urn:one");
        let two = pool.add_symbol("urn:two");

        context.add_namespace(q, one);
        context.add_namespace(p, one);
        context.on_start_element();
        assert_eq!(context.prefix_for(one), Some(p));

        // Inner element rebinds p elsewhere: p no longer maps to one
        context.add_namespace(p, two);
        context.on_start_element();
        assert_eq!(context.prefix_for(one), Some(q));
        assert_eq!(context.prefix_for(two), Some(p));

        context.on_end_element();
        assert_eq!(context.prefix_for(one), Some(p));
    }

    #[test]
    fn test_active_bindings_unique() {
        let (mut pool, mut context) = setup();
        let p = pool.add_symbol("p");
        let one = pool.add_symbol("urn:one");
        let two = pool.add_symbol("urn:two");
        context.add_namespace(p, one);
        context.on_start_element();
        context.add_namespace(p, two);
        context.on_start_element();
        let active: Vec<Handle> = context.active_bindings().map(|b| b.uri).collect();
        assert_eq!(active, vec![two]);
    }
}
