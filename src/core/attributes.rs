//! Start-tag attribute lists
//!
//! Splits the bytes between an element name and `>` into name/value pairs.
//! Names are kept whole; prefix resolution happens in the cursor, which
//! owns the namespace bindings.

use std::borrow::Cow;

use super::entities::decode_text;
use super::scanner::Scanner;

/// One attribute as reported to a content handler
#[derive(Debug, Clone)]
pub struct Attribute<'a> {
    /// Qualified name
    pub name: Cow<'a, [u8]>,
    /// Value with references decoded
    pub value: Cow<'a, [u8]>,
    /// False when the value was defaulted from an ATTLIST declaration
    pub specified: bool,
    /// Declared type, `CDATA` unless the DTD says otherwise
    pub att_type: &'static str,
    /// Allowed values of an enumerated or NOTATION type
    pub enumeration: Vec<Vec<u8>>,
}

impl<'a> Attribute<'a> {
    pub fn new(name: &'a [u8], value: Cow<'a, [u8]>) -> Self {
        Attribute {
            name: Cow::Borrowed(name),
            value,
            specified: true,
            att_type: "CDATA",
            enumeration: Vec::new(),
        }
    }

    /// Attribute built from owned bytes, e.g. a DTD default
    pub fn owned(name: Vec<u8>, value: Vec<u8>) -> Attribute<'static> {
        Attribute {
            name: Cow::Owned(name),
            value: Cow::Owned(value),
            specified: true,
            att_type: "CDATA",
            enumeration: Vec::new(),
        }
    }

    pub fn name_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.name).ok()
    }

    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// Parse an attribute list, decoding references in values
pub fn parse_attributes(input: &[u8]) -> Vec<Attribute<'_>> {
    parse_attributes_with(input, decode_text)
}

/// Parse an attribute list, turning each raw value into its final form with `decode`
///
/// Lenient about syntax the caller checks elsewhere: a name with no `=` gets
/// an empty value, an unquoted value runs to the next whitespace, and stray
/// bytes between attributes are skipped.
pub fn parse_attributes_with<'a, F>(input: &'a [u8], mut decode: F) -> Vec<Attribute<'a>>
where
    F: FnMut(&'a [u8]) -> Cow<'a, [u8]>,
{
    let mut attrs = Vec::new();
    let mut scanner = Scanner::new(input);

    loop {
        scanner.skip_whitespace();
        let Some(next) = scanner.peek() else { break };
        if next == b'/' || next == b'>' {
            break;
        }
        let Some(name) = scanner.read_name() else {
            scanner.advance(1);
            continue;
        };

        scanner.skip_whitespace();
        if scanner.peek() != Some(b'=') {
            attrs.push(Attribute::new(name, Cow::Borrowed(b"")));
            continue;
        }
        scanner.advance(1);
        scanner.skip_whitespace();

        let raw = match scanner.peek() {
            None => break,
            Some(quote @ (b'"' | b'\'')) => {
                let start = scanner.position() + 1;
                scanner.set_position(start);
                let end = scanner.find_byte(quote).unwrap_or(input.len());
                scanner.set_position(end + 1);
                &input[start..end]
            }
            Some(_) => {
                let start = scanner.position();
                let len = input[start..]
                    .iter()
                    .take_while(|&&b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'/' | b'>'))
                    .count();
                scanner.advance(len);
                &input[start..start + len]
            }
        };
        attrs.push(Attribute::new(name, decode(raw)));
    }

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(input: &[u8]) -> Vec<(String, String)> {
        parse_attributes(input)
            .iter()
            .map(|a| (a.name_str().unwrap().to_string(), a.value_str().unwrap().to_string()))
            .collect()
    }

    fn pair(name: &str, value: &str) -> (String, String) {
        (name.to_string(), value.to_string())
    }

    #[test]
    fn test_quoted_values() {
        assert_eq!(
            pairs(b" id=\"main\" class='wide'"),
            vec![pair("id", "main"), pair("class", "wide")]
        );
        let attrs = parse_attributes(b" id=\"main\"");
        assert!(attrs[0].specified);
        assert_eq!(attrs[0].att_type, "CDATA");
    }

    #[test]
    fn test_prefixed_names_stay_whole() {
        assert_eq!(
            pairs(b" xmlns:xl=\"urn:xl\" xl:href=\"#a\""),
            vec![pair("xmlns:xl", "urn:xl"), pair("xl:href", "#a")]
        );
    }

    #[test]
    fn test_references_decoded() {
        assert_eq!(pairs(b" t=\"&lt;b&gt; &#65;\""), vec![pair("t", "<b> A")]);
    }

    #[test]
    fn test_other_quote_inside_value() {
        assert_eq!(
            pairs(b" a='say \"hi\"' b=\"it's\""),
            vec![pair("a", "say \"hi\""), pair("b", "it's")]
        );
    }

    #[test]
    fn test_spacing_around_equals() {
        assert_eq!(pairs(b"  id  =\n \"x\"  "), vec![pair("id", "x")]);
        assert!(pairs(b"").is_empty());
        assert!(pairs(b"   ").is_empty());
    }

    #[test]
    fn test_lenient_forms() {
        assert_eq!(
            pairs(b" checked size=3 other=\"y\""),
            vec![pair("checked", ""), pair("size", "3"), pair("other", "y")]
        );
        assert_eq!(pairs(b" a=\"unterminated"), vec![pair("a", "unterminated")]);
    }

    #[test]
    fn test_custom_decoder() {
        let attrs = parse_attributes_with(b" a=\"x\ty\"", |raw| {
            Cow::Owned(raw.iter().map(|&b| if b == b'\t' { b' ' } else { b }).collect())
        });
        assert_eq!(attrs[0].value_str(), Some("x y"));
    }

    #[test]
    fn test_owned_attribute() {
        let attr = Attribute::owned(b"p:x".to_vec(), b"v".to_vec());
        assert_eq!(attr.name_str(), Some("p:x"));
        assert_eq!(attr.value_str(), Some("v"));
    }
}
