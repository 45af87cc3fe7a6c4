//! DOCTYPE internal subset
//!
//! Keeps the declarations the reader acts on: general entities (reference
//! replacement), attribute lists (defaults and reported types) and
//! notations. Element declarations and parameter entities are skipped; no
//! validation against content models takes place.

use std::collections::HashMap;

use super::entities::entity_references;
use super::scanner::{is_name_char, is_whitespace};

#[derive(Debug, Default, Clone)]
pub struct DtdDeclarations {
    /// Per element, attribute definitions in declaration order
    pub attlists: HashMap<Vec<u8>, Vec<AttDef>>,
    pub entities: HashMap<Vec<u8>, EntityDecl>,
    pub notations: HashMap<Vec<u8>, NotationDecl>,
}

#[derive(Debug, Clone)]
pub struct AttDef {
    pub name: Vec<u8>,
    pub att_type: AttType,
    pub default: AttDefault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Notation(Vec<Vec<u8>>),
    Enumeration(Vec<Vec<u8>>),
}

impl AttType {
    fn from_keyword(word: &[u8]) -> Self {
        match word {
            b"ID" => AttType::Id,
            b"IDREF" => AttType::IdRef,
            b"IDREFS" => AttType::IdRefs,
            b"ENTITY" => AttType::Entity,
            b"ENTITIES" => AttType::Entities,
            b"NMTOKEN" => AttType::NmToken,
            b"NMTOKENS" => AttType::NmTokens,
            _ => AttType::CData,
        }
    }

    /// Type name as reported by the cursor
    pub fn as_str(&self) -> &'static str {
        match self {
            AttType::CData => "CDATA",
            AttType::Id => "ID",
            AttType::IdRef => "IDREF",
            AttType::IdRefs => "IDREFS",
            AttType::Entity => "ENTITY",
            AttType::Entities => "ENTITIES",
            AttType::NmToken => "NMTOKEN",
            AttType::NmTokens => "NMTOKENS",
            AttType::Notation(_) => "NOTATION",
            AttType::Enumeration(_) => "ENUMERATION",
        }
    }

    /// Allowed values for NOTATION and enumerated types
    pub fn values(&self) -> &[Vec<u8>] {
        match self {
            AttType::Notation(values) | AttType::Enumeration(values) => values,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttDefault {
    Required,
    Implied,
    Fixed(Vec<u8>),
    Default(Vec<u8>),
}

impl AttDefault {
    /// Value to insert when the attribute is absent
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            AttDefault::Fixed(v) | AttDefault::Default(v) => Some(v),
            AttDefault::Required | AttDefault::Implied => None,
        }
    }
}

/// A general entity
///
/// Internal entities carry `value`; external ones carry identifiers and,
/// when unparsed, the `ndata` notation name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDecl {
    pub is_external: bool,
    pub value: Option<Vec<u8>>,
    pub system_id: Option<Vec<u8>>,
    pub public_id: Option<Vec<u8>>,
    pub ndata: Option<Vec<u8>>,
    /// Names of the entities referenced by `value`
    pub references: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotationDecl {
    pub system_id: Option<Vec<u8>>,
    pub public_id: Option<Vec<u8>>,
}

/// The parts of a `<!DOCTYPE ...>` declaration
#[derive(Debug, Clone, Default)]
pub struct Doctype {
    pub root: Vec<u8>,
    pub public_id: Option<Vec<u8>>,
    pub system_id: Option<Vec<u8>>,
    pub declarations: DtdDeclarations,
}

impl DtdDeclarations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a general entity; a later declaration of the same name is ignored
    pub fn add_entity(&mut self, name: Vec<u8>, decl: EntityDecl) {
        self.entities.entry(name).or_insert(decl);
    }

    /// Record attribute definitions; the first definition of a name wins
    pub fn add_attlist(&mut self, element: Vec<u8>, defs: Vec<AttDef>) {
        let list = self.attlists.entry(element).or_default();
        for def in defs {
            if list.iter().all(|d| d.name != def.name) {
                list.push(def);
            }
        }
    }

    /// Record a notation; returns false if the name was already declared
    pub fn add_notation(&mut self, name: Vec<u8>, decl: NotationDecl) -> bool {
        if self.notations.contains_key(&name) {
            return false;
        }
        self.notations.insert(name, decl);
        true
    }

    pub fn attributes_for(&self, element: &[u8]) -> &[AttDef] {
        self.attlists.get(element).map_or(&[], Vec::as_slice)
    }

    /// First problem that breaks entity expansion or attribute typing
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = self.entities.keys().find(|name| self.reaches_itself(name)) {
            return Err(format!(
                "entity '{}' references itself",
                String::from_utf8_lossy(name)
            ));
        }

        let undeclared = self
            .attlists
            .values()
            .flatten()
            .filter(|def| matches!(def.att_type, AttType::Notation(_)))
            .flat_map(|def| def.att_type.values())
            .find(|notation| !self.notations.contains_key(*notation));
        match undeclared {
            Some(notation) => Err(format!(
                "attribute type uses undeclared notation '{}'",
                String::from_utf8_lossy(notation)
            )),
            None => Ok(()),
        }
    }

    /// Depth-first walk over entity references starting at `name`
    fn reaches_itself(&self, name: &[u8]) -> bool {
        let mut seen: Vec<&[u8]> = Vec::new();
        let mut pending: Vec<&[u8]> = self.references_of(name).collect();
        while let Some(next) = pending.pop() {
            if next == name {
                return true;
            }
            if !seen.contains(&next) {
                seen.push(next);
                pending.extend(self.references_of(next));
            }
        }
        false
    }

    fn references_of<'s>(&'s self, name: &[u8]) -> impl Iterator<Item = &'s [u8]> + 's {
        self.entities
            .get(name)
            .into_iter()
            .flat_map(|decl| decl.references.iter().map(Vec::as_slice))
    }
}

/// Parse the content of a DOCTYPE declaration
///
/// `content` starts at the `DOCTYPE` keyword and ends before the closing `>`.
pub fn parse_doctype(content: &[u8]) -> Doctype {
    let mut doctype = Doctype::default();
    let body = content
        .strip_prefix(b"DOCTYPE")
        .or_else(|| content.strip_prefix(b"doctype"))
        .unwrap_or(content);

    let (head, subset) = match memchr::memchr(b'[', body) {
        Some(open) => {
            let close = memchr::memrchr(b']', body).filter(|&c| c > open).unwrap_or(body.len());
            (&body[..open], Some(&body[open + 1..close]))
        }
        None => (body, None),
    };

    let mut tokens = DeclTokens::new(head);
    if let Some(Token::Word(root)) = tokens.next() {
        doctype.root = root.to_vec();
    }
    let (public_id, system_id) = external_id(&mut tokens);
    doctype.public_id = public_id;
    doctype.system_id = system_id;

    if let Some(subset) = subset {
        doctype.declarations = parse_internal_subset(subset);
    }
    doctype
}

/// Parse the declarations of an internal subset
pub fn parse_internal_subset(subset: &[u8]) -> DtdDeclarations {
    let mut dtd = DtdDeclarations::new();
    let mut pos = 0;

    while pos < subset.len() {
        let rest = &subset[pos..];
        if rest.starts_with(b"<!--") {
            pos += find(rest, b"-->").map(|i| i + 3).unwrap_or(rest.len());
        } else if rest.starts_with(b"<?") {
            pos += find(rest, b"?>").map(|i| i + 2).unwrap_or(rest.len());
        } else if rest.starts_with(b"<!") {
            let end = find_decl_end(rest).unwrap_or(rest.len());
            parse_declaration(&rest[2..end], &mut dtd);
            pos += (end + 1).min(rest.len());
        } else {
            // Whitespace and parameter entity references between declarations
            pos += 1;
        }
    }

    dtd
}

fn parse_declaration(decl: &[u8], dtd: &mut DtdDeclarations) {
    if let Some(body) = decl.strip_prefix(b"ENTITY") {
        parse_entity(body, dtd);
    } else if let Some(body) = decl.strip_prefix(b"ATTLIST") {
        parse_attlist(body, dtd);
    } else if let Some(body) = decl.strip_prefix(b"NOTATION") {
        let mut tokens = DeclTokens::new(body);
        if let Some(Token::Word(name)) = tokens.next() {
            let (public_id, system_id) = external_id(&mut tokens);
            dtd.add_notation(name.to_vec(), NotationDecl { system_id, public_id });
        }
    }
}

fn parse_entity(body: &[u8], dtd: &mut DtdDeclarations) {
    let mut tokens = DeclTokens::new(body);
    let name = match tokens.next() {
        // Parameter entities only matter inside the DTD itself
        Some(Token::Word(b"%")) | None => return,
        Some(Token::Word(name)) => name,
        Some(_) => return,
    };

    let mut decl = EntityDecl::default();
    match tokens.peek() {
        Some(Token::Quoted(value)) => {
            tokens.next();
            decl.references = entity_references(value);
            decl.value = Some(value.to_vec());
        }
        _ => {
            let (public_id, system_id) = external_id(&mut tokens);
            decl.is_external = true;
            decl.public_id = public_id;
            decl.system_id = system_id;
            if let (Some(Token::Word(b"NDATA")), Some(Token::Word(notation))) = (tokens.next(), tokens.next()) {
                decl.ndata = Some(notation.to_vec());
            }
        }
    }
    dtd.add_entity(name.to_vec(), decl);
}

fn parse_attlist(body: &[u8], dtd: &mut DtdDeclarations) {
    let mut tokens = DeclTokens::new(body);
    let Some(Token::Word(element)) = tokens.next() else {
        return;
    };

    let mut defs = Vec::new();
    while let Some(Token::Word(name)) = tokens.next() {
        let att_type = match tokens.next() {
            Some(Token::Group(values)) => AttType::Enumeration(split_group(values)),
            Some(Token::Word(b"NOTATION")) => match tokens.next() {
                Some(Token::Group(values)) => AttType::Notation(split_group(values)),
                _ => break,
            },
            Some(Token::Word(word)) => AttType::from_keyword(word),
            _ => break,
        };

        let default = match tokens.next() {
            Some(Token::Word(b"#REQUIRED")) => AttDefault::Required,
            Some(Token::Word(b"#IMPLIED")) => AttDefault::Implied,
            Some(Token::Word(b"#FIXED")) => match tokens.next() {
                Some(Token::Quoted(value)) => AttDefault::Fixed(value.to_vec()),
                _ => break,
            },
            Some(Token::Quoted(value)) => AttDefault::Default(value.to_vec()),
            _ => break,
        };

        defs.push(AttDef {
            name: name.to_vec(),
            att_type,
            default,
        });
    }

    dtd.add_attlist(element.to_vec(), defs);
}

/// `SYSTEM "sys"` or `PUBLIC "pub" "sys"`, returned as (public, system)
fn external_id(tokens: &mut DeclTokens<'_>) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
    match tokens.peek() {
        Some(Token::Word(b"SYSTEM")) => {
            tokens.next();
            match tokens.next() {
                Some(Token::Quoted(system)) => (None, Some(system.to_vec())),
                _ => (None, None),
            }
        }
        Some(Token::Word(b"PUBLIC")) => {
            tokens.next();
            let public = match tokens.next() {
                Some(Token::Quoted(public)) => Some(public.to_vec()),
                _ => None,
            };
            let system = match tokens.peek() {
                Some(Token::Quoted(system)) => {
                    tokens.next();
                    Some(system.to_vec())
                }
                _ => None,
            };
            (public, system)
        }
        _ => (None, None),
    }
}

/// Split `a | b | c` (with or without parentheses) into names
fn split_group(group: &[u8]) -> Vec<Vec<u8>> {
    group
        .split(|&b| b == b'|')
        .map(|part| {
            part.iter()
                .copied()
                .filter(|&b| is_name_char(b) || b == b'#')
                .collect::<Vec<u8>>()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Position of the `>` closing a markup declaration, skipping quoted literals
fn find_decl_end(decl: &[u8]) -> Option<usize> {
    let mut quote = None;
    for (i, &b) in decl.iter().enumerate() {
        match (quote, b) {
            (None, b'"' | b'\'') => quote = Some(b),
            (Some(q), _) if q == b => quote = None,
            (None, b'>') => return Some(i),
            _ => {}
        }
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[inline]
fn skip_ws(content: &[u8]) -> &[u8] {
    let skipped = content.iter().take_while(|&&b| is_whitespace(b)).count();
    &content[skipped..]
}

/// Lexical tokens of a markup declaration body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Word(&'a [u8]),
    Quoted(&'a [u8]),
    Group(&'a [u8]),
}

struct DeclTokens<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> DeclTokens<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<Token<'a>> {
        let mut copy = DeclTokens {
            input: self.input,
            pos: self.pos,
        };
        copy.next()
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let rest = skip_ws(&self.input[self.pos..]);
        self.pos = self.input.len() - rest.len();
        let &first = rest.first()?;

        match first {
            b'"' | b'\'' => {
                let end = memchr::memchr(first, &rest[1..]).map(|i| i + 1).unwrap_or(rest.len());
                self.pos += (end + 1).min(rest.len());
                Some(Token::Quoted(&rest[1..end]))
            }
            b'(' => {
                let mut depth = 0usize;
                let mut end = rest.len();
                for (i, &b) in rest.iter().enumerate() {
                    match b {
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                end = i;
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                // Swallow an occurrence indicator after the group
                let mut consumed = (end + 1).min(rest.len());
                if matches!(rest.get(consumed), Some(b'*' | b'+' | b'?')) {
                    consumed += 1;
                }
                self.pos += consumed;
                Some(Token::Group(&rest[1..end.max(1)]))
            }
            _ => {
                let len = rest
                    .iter()
                    .position(|&b| matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'"' | b'\'' | b'('))
                    .unwrap_or(rest.len());
                self.pos += len;
                Some(Token::Word(&rest[..len]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn internal(name: &[u8], value: &[u8]) -> (Vec<u8>, EntityDecl) {
        (
            name.to_vec(),
            EntityDecl {
                value: Some(value.to_vec()),
                references: entity_references(value),
                ..EntityDecl::default()
            },
        )
    }

    fn declarations(entities: &[(&[u8], &[u8])]) -> DtdDeclarations {
        let mut dtd = DtdDeclarations::new();
        for (name, value) in entities {
            let (name, decl) = internal(name, value);
            dtd.add_entity(name, decl);
        }
        dtd
    }

    #[test]
    fn test_self_reference_detected() {
        let dtd = declarations(&[(b"loop", b"x &loop; y")]);
        let message = dtd.validate().unwrap_err();
        assert!(message.contains("'loop' references itself"));
    }

    #[test]
    fn test_reference_cycle_detected() {
        let dtd = declarations(&[(b"a", b"&b;"), (b"b", b"&c;"), (b"c", b"&a;")]);
        assert!(dtd.validate().is_err());
    }

    #[test]
    fn test_shared_references_are_not_cycles() {
        let dtd = declarations(&[(b"top", b"&l;&r;"), (b"l", b"&leaf;"), (b"r", b"&leaf;"), (b"leaf", b"!")]);
        assert!(dtd.validate().is_ok());
    }

    #[test]
    fn test_first_declaration_wins() {
        let dtd = parse_internal_subset(b"<!ENTITY e \"first\"><!ENTITY e \"second\">");
        assert_eq!(dtd.entities[b"e".as_slice()].value.as_deref(), Some(b"first" as &[u8]));
    }

    #[test]
    fn test_parse_doctype_with_subset() {
        let doctype = parse_doctype(
            b"DOCTYPE note SYSTEM \"note.dtd\" [\n\
              <!ENTITY writer \"Donald Duck\">\n\
              <!ENTITY logo SYSTEM \"logo.gif\" NDATA gif>\n\
              <!ENTITY % common \"x\">\n\
              <!-- a comment with <!ENTITY fake \"no\"> inside -->\n\
              <!ATTLIST note lang CDATA \"en\" kind (memo|letter) 'memo' id ID #IMPLIED>\n\
              <!ELEMENT note (#PCDATA|b)*>\n\
              <!NOTATION gif PUBLIC \"image/gif\">\n\
            ]",
        );
        assert_eq!(doctype.root, b"note");
        assert_eq!(doctype.system_id.as_deref(), Some(b"note.dtd" as &[u8]));

        let dtd = &doctype.declarations;
        assert_eq!(dtd.entities[b"writer".as_slice()].value.as_deref(), Some(b"Donald Duck" as &[u8]));
        let logo = &dtd.entities[b"logo".as_slice()];
        assert!(logo.is_external);
        assert_eq!(logo.ndata.as_deref(), Some(b"gif" as &[u8]));
        assert!(!dtd.entities.contains_key(b"common".as_slice()));
        assert!(!dtd.entities.contains_key(b"fake".as_slice()));

        let attrs = dtd.attributes_for(b"note");
        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[0].default.value(), Some(b"en" as &[u8]));
        assert_eq!(attrs[1].att_type.as_str(), "ENUMERATION");
        assert_eq!(attrs[1].att_type.values(), &[b"memo".to_vec(), b"letter".to_vec()]);
        assert_eq!(attrs[2].att_type, AttType::Id);
        assert_eq!(attrs[2].default, AttDefault::Implied);

        assert_eq!(dtd.notations[b"gif".as_slice()].public_id.as_deref(), Some(b"image/gif" as &[u8]));
        assert!(dtd.validate().is_ok());
    }

    #[test]
    fn test_parse_doctype_public() {
        let doctype = parse_doctype(b"DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0//EN\" \"xhtml1.dtd\"");
        assert_eq!(doctype.root, b"html");
        assert_eq!(doctype.public_id.as_deref(), Some(b"-//W3C//DTD XHTML 1.0//EN" as &[u8]));
        assert_eq!(doctype.system_id.as_deref(), Some(b"xhtml1.dtd" as &[u8]));
        assert!(doctype.declarations.entities.is_empty());
    }

    #[test]
    fn test_undeclared_notation_fails_validation() {
        let dtd = parse_internal_subset(b"<!ATTLIST img fmt NOTATION (png) #REQUIRED>");
        assert!(dtd.validate().is_err());
    }
}
