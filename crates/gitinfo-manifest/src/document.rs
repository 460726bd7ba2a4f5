use serde::de::IgnoredAny;
use serde_json::Value;

use crate::error::MalformedDocument;

const BOM: char = '\u{feff}';

/// Byte range `[start, end)` in the manifest source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn point(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn slice<'t>(&self, text: &'t str) -> &'t str {
        &text[self.start..self.end]
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Object(Vec<Member>),
    Array,
    String,
    Number,
    Bool,
    Null,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub span: Span,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_object(&self) -> bool {
        matches!(self.kind, NodeKind::Object(_))
    }

    pub fn members(&self) -> Option<&[Member]> {
        match &self.kind {
            NodeKind::Object(members) => Some(members),
            _ => None,
        }
    }

    /// Looks up `name` among this object's members. `None` for non-objects.
    pub fn find(&self, name: &str) -> Option<&Member> {
        self.members().and_then(|members| find_member(members, name))
    }
}

/// An object member: decoded key, the key's quoted source span and the value node.
#[derive(Debug, Clone)]
pub struct Member {
    pub key: String,
    pub key_span: Span,
    pub value: Node,
}

/// Finds the member named `name`; with duplicate keys the last one wins, as in
/// a regular JSON parse.
pub fn find_member<'m>(members: &'m [Member], name: &str) -> Option<&'m Member> {
    members.iter().rev().find(|m| m.key == name)
}

/// A span index over a manifest text whose root is a JSON object.
///
/// Built fresh from the current text for each edit and dropped afterwards.
#[derive(Debug, Clone)]
pub struct ManifestDocument<'a> {
    text: &'a str,
    root: Node,
}

impl<'a> ManifestDocument<'a> {
    pub fn parse(text: &'a str) -> Result<Self, MalformedDocument> {
        let body_start = if text.starts_with(BOM) {
            BOM.len_utf8()
        } else {
            0
        };

        // Syntax only: numbers are not range-checked and lone surrogates pass.
        serde_json::from_str::<IgnoredAny>(&text[body_start..])
            .map_err(|e| MalformedDocument::from_json(&e))?;
        let root_start = first_non_ws(text, body_start);
        if text.as_bytes().get(root_start) != Some(&b'{') {
            return Err(MalformedDocument::at(
                text,
                root_start,
                "expected the root to be an object",
            ));
        }

        let mut scanner = Scanner {
            text,
            bytes: text.as_bytes(),
            pos: body_start,
        };
        scanner.skip_ws();
        let root = scanner.value()?;
        Ok(Self { text, root })
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_members(&self) -> &[Member] {
        self.root.members().unwrap_or(&[])
    }

    /// The value of the top-level property `name`, if present.
    pub fn find_property(&self, name: &str) -> Option<&Node> {
        find_member(self.root_members(), name).map(|m| &m.value)
    }

    /// Decodes the source text of `node` into a JSON value.
    pub fn value_of(&self, node: &Node) -> Option<Value> {
        serde_json::from_str(node.span.slice(self.text)).ok()
    }
}

fn first_non_ws(text: &str, from: usize) -> usize {
    text.as_bytes()[from..]
        .iter()
        .position(|b| !is_ws(*b))
        .map(|i| from + i)
        .unwrap_or(text.len())
}

fn is_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

// Walks text that serde_json has already accepted, recording spans only.
struct Scanner<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl Scanner<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(is_ws) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), MalformedDocument> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {:?}", b as char)))
        }
    }

    fn unexpected(&self, message: &str) -> MalformedDocument {
        MalformedDocument::at(self.text, self.pos, message)
    }

    fn value(&mut self) -> Result<Node, MalformedDocument> {
        let start = self.pos;
        let kind = match self.peek() {
            Some(b'{') => NodeKind::Object(self.object()?),
            Some(b'[') => {
                self.array()?;
                NodeKind::Array
            }
            Some(b'"') => {
                self.string()?;
                NodeKind::String
            }
            Some(b't') => {
                self.literal("true")?;
                NodeKind::Bool
            }
            Some(b'f') => {
                self.literal("false")?;
                NodeKind::Bool
            }
            Some(b'n') => {
                self.literal("null")?;
                NodeKind::Null
            }
            Some(b'-' | b'0'..=b'9') => {
                self.number();
                NodeKind::Number
            }
            _ => return Err(self.unexpected("expected a value")),
        };
        Ok(Node {
            span: Span::new(start, self.pos),
            kind,
        })
    }

    fn object(&mut self) -> Result<Vec<Member>, MalformedDocument> {
        self.expect(b'{')?;
        self.skip_ws();
        let mut members = Vec::new();
        if self.eat(b'}') {
            return Ok(members);
        }
        loop {
            self.skip_ws();
            let key_start = self.pos;
            self.string()?;
            let key_span = Span::new(key_start, self.pos);
            let raw_key = key_span.slice(self.text);
            let key = serde_json::from_str::<String>(raw_key)
                .unwrap_or_else(|_| decode_key_lossy(raw_key));

            self.skip_ws();
            self.expect(b':')?;
            self.skip_ws();
            let value = self.value()?;
            members.push(Member {
                key,
                key_span,
                value,
            });

            self.skip_ws();
            if self.eat(b',') {
                continue;
            }
            self.expect(b'}')?;
            return Ok(members);
        }
    }

    fn array(&mut self) -> Result<(), MalformedDocument> {
        self.expect(b'[')?;
        self.skip_ws();
        if self.eat(b']') {
            return Ok(());
        }
        loop {
            self.skip_ws();
            self.value()?;
            self.skip_ws();
            if self.eat(b',') {
                continue;
            }
            return self.expect(b']');
        }
    }

    fn string(&mut self) -> Result<(), MalformedDocument> {
        self.expect(b'"')?;
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b'\\') => self.pos += 2,
                Some(_) => self.pos += 1,
                None => return Err(self.unexpected("unterminated string")),
            }
        }
    }

    fn literal(&mut self, word: &str) -> Result<(), MalformedDocument> {
        if self.bytes[self.pos..].starts_with(word.as_bytes()) {
            self.pos += word.len();
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected `{word}`")))
        }
    }

    fn number(&mut self) {
        while self
            .peek()
            .is_some_and(|b| matches!(b, b'-' | b'+' | b'.' | b'e' | b'E' | b'0'..=b'9'))
        {
            self.pos += 1;
        }
    }
}

/// Decodes a quoted key that serde_json refuses, i.e. one holding a lone
/// surrogate escape. Unpaired surrogates become U+FFFD.
fn decode_key_lossy(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut units: Vec<u16> = Vec::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u16; 2];
            units.extend_from_slice(c.encode_utf16(&mut buf));
            continue;
        }
        let unit = match chars.next() {
            Some('b') => 0x08,
            Some('f') => 0x0c,
            Some('n') => u16::from(b'\n'),
            Some('r') => u16::from(b'\r'),
            Some('t') => u16::from(b'\t'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                u16::from_str_radix(&hex, 16).unwrap_or(0xfffd)
            }
            Some(other) => {
                let mut buf = [0u16; 2];
                units.extend_from_slice(other.encode_utf16(&mut buf));
                continue;
            }
            None => break,
        };
        units.push(unit);
    }
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_member_and_value_spans() {
        let text = r#"{ "name": "app", "scripts": {"build": "tsc"} }"#;
        let doc = ManifestDocument::parse(text).unwrap();

        let name = doc.find_property("name").unwrap();
        assert_eq!(name.span.slice(text), r#""app""#);
        assert!(!name.is_object());

        let scripts = doc.find_property("scripts").unwrap();
        assert!(scripts.is_object());
        let build = scripts.find("build").unwrap();
        assert_eq!(build.key_span.slice(text), r#""build""#);
        assert_eq!(build.value.span.slice(text), r#""tsc""#);
    }

    #[test]
    fn decodes_escaped_keys() {
        let text = r#"{"abc": 1, "q\"x": [1, {"y": null}]}"#;
        let doc = ManifestDocument::parse(text).unwrap();
        assert_eq!(doc.find_property("abc").unwrap().span.slice(text), "1");
        assert_eq!(
            doc.find_property("q\"x").unwrap().span.slice(text),
            r#"[1, {"y": null}]"#
        );
    }

    #[test]
    fn last_duplicate_key_wins() {
        let text = r#"{"v": 1, "v": 2}"#;
        let doc = ManifestDocument::parse(text).unwrap();
        assert_eq!(doc.find_property("v").unwrap().span.slice(text), "2");
    }

    #[test]
    fn multibyte_strings_keep_char_boundaries() {
        let text = "{\"desc\": \"héllo → wörld\", \"n\": -1.5e3}";
        let doc = ManifestDocument::parse(text).unwrap();
        assert_eq!(
            doc.find_property("desc").unwrap().span.slice(text),
            "\"héllo → wörld\""
        );
        assert_eq!(doc.find_property("n").unwrap().span.slice(text), "-1.5e3");
    }

    #[test]
    fn tolerates_leading_bom() {
        let text = "\u{feff}{\"a\": true}";
        let doc = ManifestDocument::parse(text).unwrap();
        assert_eq!(doc.root().span.start, 3);
        assert_eq!(doc.find_property("a").unwrap().span.slice(text), "true");
    }

    #[test]
    fn rejects_invalid_json_and_non_object_roots() {
        let err = ManifestDocument::parse("{ not json").unwrap_err();
        assert_eq!(err.line, 1);

        let err = ManifestDocument::parse("  [1, 2]").unwrap_err();
        assert_eq!((err.line, err.column), (1, 3));
        assert!(err.message.contains("object"), "{err}");

        assert!(ManifestDocument::parse("{\"a\": 1,}").is_err());
        assert!(ManifestDocument::parse("").is_err());

        // Valid JSON that a typed parse would refuse is still accepted.
        let text = r#"{"n": 1e400, "s": "\ud800"}"#;
        let doc = ManifestDocument::parse(text).unwrap();
        assert_eq!(doc.find_property("n").unwrap().span.slice(text), "1e400");
        assert_eq!(doc.find_property("s").unwrap().span.slice(text), r#""\ud800""#);
    }

    #[test]
    fn lone_surrogate_keys_decode_lossily() {
        let text = r#"{"\ud800x": 1, "\ud83d\ude00": 2}"#;
        let doc = ManifestDocument::parse(text).unwrap();
        assert!(doc.find_property("\u{fffd}x").is_some());
        assert!(doc.find_property("\u{1f600}").is_some());
        assert_eq!(decode_key_lossy(r#""a\nb\/c""#), "a\nb/c");
    }
}
