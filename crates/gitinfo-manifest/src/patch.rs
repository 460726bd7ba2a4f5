use std::collections::BTreeMap;

use gitinfo_contracts::JSON_INDENT_WIDTH;
use serde_json::Value;
use tracing::debug;

use crate::document::{find_member, ManifestDocument, Member, Node, Span};
use crate::error::MalformedDocument;
use crate::render::{compact, quote, render, render_entries, Layout};

/// Where members missing from an existing object are inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertPosition {
    /// After the object's last member, in the requested order.
    #[default]
    End,
    /// Before the first member whose key sorts after the new key.
    Sorted,
}

/// A splice against the original text: `span` is replaced by `text`. An empty
/// span is a pure insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub span: Span,
    pub text: String,
}

/// Collects edits expressed in original-text offsets and applies them in a
/// single pass.
#[derive(Debug, Default)]
pub struct EditRecorder {
    edits: Vec<Edit>,
}

impl EditRecorder {
    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.edits.push(Edit {
            span: Span::point(at),
            text: text.into(),
        });
    }

    pub fn replace(&mut self, span: Span, text: impl Into<String>) {
        self.edits.push(Edit {
            span,
            text: text.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    /// Applies every edit to `source`. Edits at the same offset keep the order
    /// they were recorded in; spans must not overlap.
    pub fn apply(mut self, source: &str) -> String {
        self.edits.sort_by_key(|e| e.span.start);
        let added: usize = self.edits.iter().map(|e| e.text.len()).sum();
        let mut out = String::with_capacity(source.len() + added);
        let mut cursor = 0;
        for edit in &self.edits {
            debug_assert!(edit.span.start >= cursor, "overlapping edits");
            out.push_str(&source[cursor..edit.span.start]);
            out.push_str(&edit.text);
            cursor = edit.span.end;
        }
        out.push_str(&source[cursor..]);
        out
    }
}

/// Ensures `property` at the manifest root holds at least `values`.
///
/// - a missing property is appended at the end of the root object;
/// - a property that is not an object is left alone;
/// - inside an existing object, missing keys are appended in the order given
///   and present keys get their value span replaced.
///
/// Bytes outside the edited spans are preserved, and re-applying the same
/// patch to the result changes nothing.
pub fn patch<K, I>(text: &str, property: &str, values: I) -> Result<String, MalformedDocument>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    patch_with(text, property, values, InsertPosition::End)
}

/// Adds or updates `name` in the dependency section `section`, keeping an
/// existing section's keys in alphabetical insertion order.
pub fn add_dependency(
    text: &str,
    section: &str,
    name: &str,
    version: &str,
) -> Result<String, MalformedDocument> {
    patch_with(
        text,
        section,
        [(name, Value::from(version))],
        InsertPosition::Sorted,
    )
}

pub fn patch_with<K, I>(
    text: &str,
    property: &str,
    values: I,
    position: InsertPosition,
) -> Result<String, MalformedDocument>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    let values = dedup_values(values);
    let doc = ManifestDocument::parse(text)?;
    let unit = detect_indent_unit(&doc);
    let mut recorder = EditRecorder::default();

    match doc.find_property(property) {
        None => {
            debug!(property, "adding missing top-level property");
            let root = doc.root();
            let frame = Frame::end_of(text, root, &unit);
            let value = render_entries(
                values.iter().map(|(k, v)| (k.as_str(), v)),
                frame.layout(&unit),
            );
            append_members(&mut recorder, root, &frame, &[(property.to_string(), value)]);
        }
        Some(node) if !node.is_object() => {
            debug!(property, "property is not an object; leaving it untouched");
        }
        Some(node) => patch_object(&mut recorder, &doc, node, &values, position, &unit),
    }

    if recorder.is_empty() {
        return Ok(text.to_string());
    }
    Ok(recorder.apply(text))
}

fn patch_object(
    recorder: &mut EditRecorder,
    doc: &ManifestDocument<'_>,
    object: &Node,
    values: &[(String, Value)],
    position: InsertPosition,
    unit: &str,
) {
    let text = doc.text();
    let members = object.members().unwrap_or(&[]);

    let mut appended: Vec<(&str, &Value)> = Vec::new();
    let mut before: BTreeMap<usize, Vec<(&str, &Value)>> = BTreeMap::new();

    for (key, value) in values {
        match find_member(members, key) {
            Some(existing) => {
                if doc.value_of(&existing.value).as_ref() == Some(value) {
                    debug!(key = key.as_str(), "value already up to date");
                    continue;
                }
                debug!(key = key.as_str(), value = %value, "overwriting value");
                recorder.replace(existing.value.span, compact(value));
            }
            None => {
                debug!(key = key.as_str(), value = %value, "creating key");
                let anchor = match position {
                    InsertPosition::End => None,
                    InsertPosition::Sorted => members.iter().position(|m| m.key > *key),
                };
                match anchor {
                    Some(idx) => before.entry(idx).or_default().push((key.as_str(), value)),
                    None => appended.push((key.as_str(), value)),
                }
            }
        }
    }

    if position == InsertPosition::Sorted {
        appended.sort_by(|a, b| a.0.cmp(b.0));
    }

    for (idx, mut group) in before {
        group.sort_by(|a, b| a.0.cmp(b.0));
        let anchor = &members[idx];
        let frame = Frame::before(text, object, anchor);
        let mut insertion = String::new();
        for (key, value) in group {
            insertion.push_str(&member_text(key, value, frame.layout(unit)));
            insertion.push(',');
            insertion.push_str(&frame.separator());
        }
        recorder.insert(anchor.key_span.start, insertion);
    }

    if !appended.is_empty() {
        let frame = Frame::end_of(text, object, unit);
        let rendered: Vec<(String, String)> = appended
            .into_iter()
            .map(|(k, v)| (k.to_string(), render(v, frame.layout(unit))))
            .collect();
        append_members(recorder, object, &frame, &rendered);
    }
}

/// Inserts already-rendered `(key, value)` members after the last member of
/// `object` (or right after its `{` when empty).
fn append_members(
    recorder: &mut EditRecorder,
    object: &Node,
    frame: &Frame,
    members: &[(String, String)],
) {
    let mut insertion = String::new();
    match object.members().and_then(|m| m.last()) {
        Some(last) => {
            for (key, value) in members {
                insertion.push(',');
                insertion.push_str(&frame.separator());
                insertion.push_str(&format!("{}: {value}", quote(key)));
            }
            recorder.insert(last.value.span.end, insertion);
        }
        None => {
            for (idx, (key, value)) in members.iter().enumerate() {
                if idx > 0 {
                    insertion.push(',');
                }
                if frame.multiline {
                    insertion.push_str(&frame.separator());
                } else if idx > 0 {
                    insertion.push(' ');
                }
                insertion.push_str(&format!("{}: {value}", quote(key)));
            }
            recorder.insert(object.span.start + 1, insertion);
        }
    }
}

fn member_text(key: &str, value: &Value, layout: Layout<'_>) -> String {
    format!("{}: {}", quote(key), render(value, layout))
}

/// Whitespace context of an insertion point inside an object.
struct Frame {
    multiline: bool,
    /// Indentation of the line a new member starts on.
    indent: String,
}

impl Frame {
    fn end_of(text: &str, object: &Node, unit: &str) -> Self {
        let multiline = is_multiline(text, object);
        let indent = match object.members().and_then(|m| m.last()) {
            Some(last) if multiline => line_indent(text, last.key_span.start).to_string(),
            _ if multiline => format!("{}{unit}", line_indent(text, object.span.start)),
            _ => String::new(),
        };
        Self { multiline, indent }
    }

    fn before(text: &str, object: &Node, anchor: &Member) -> Self {
        let multiline = is_multiline(text, object);
        let indent = if multiline {
            line_indent(text, anchor.key_span.start).to_string()
        } else {
            String::new()
        };
        Self { multiline, indent }
    }

    fn separator(&self) -> String {
        if self.multiline {
            format!("\n{}", self.indent)
        } else {
            " ".to_string()
        }
    }

    fn layout<'f>(&'f self, unit: &'f str) -> Layout<'f> {
        if self.multiline {
            Layout::Block {
                indent: &self.indent,
                unit,
            }
        } else {
            Layout::Inline
        }
    }
}

/// An object is laid out over several lines when a line break separates its
/// `{` from its first member (or from its `}` when empty).
fn is_multiline(text: &str, object: &Node) -> bool {
    let open = object.span.start + 1;
    let until = object
        .members()
        .and_then(|m| m.first())
        .map(|m| m.key_span.start)
        .unwrap_or(object.span.end - 1);
    text[open..until].contains('\n')
}

/// Leading spaces and tabs of the line containing `offset`.
fn line_indent(text: &str, offset: usize) -> &str {
    let line_start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line = &text[line_start..];
    let width = line
        .bytes()
        .take_while(|b| matches!(b, b' ' | b'\t'))
        .count();
    &line[..width]
}

/// One nesting level as used by the root object's first member, or the
/// default width when the root is inline or empty.
fn detect_indent_unit(doc: &ManifestDocument<'_>) -> String {
    let text = doc.text();
    let root = doc.root();
    if let Some(first) = doc.root_members().first() {
        if is_multiline(text, root) {
            let outer = line_indent(text, root.span.start);
            let inner = line_indent(text, first.key_span.start);
            if let Some(unit) = inner.strip_prefix(outer) {
                if !unit.is_empty() {
                    return unit.to_string();
                }
            }
        }
    }
    " ".repeat(JSON_INDENT_WIDTH)
}

/// Keeps the first position of each key and the last value given for it.
fn dedup_values<K, I>(values: I) -> Vec<(String, Value)>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    let mut out: Vec<(String, Value)> = Vec::new();
    for (key, value) in values {
        let key = key.into();
        match out.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => out.push((key, value)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_applies_edits_in_offset_order() {
        let mut rec = EditRecorder::default();
        rec.insert(5, "!");
        rec.replace(Span::new(0, 1), "J");
        rec.insert(5, "?");
        assert_eq!(rec.apply("hello world"), "Jello!? world");
    }

    #[test]
    fn detects_indent_unit_from_root_members() {
        let doc = ManifestDocument::parse("{\n\t\"a\": 1\n}").unwrap();
        assert_eq!(detect_indent_unit(&doc), "\t");

        let doc = ManifestDocument::parse("{\"a\": 1}").unwrap();
        assert_eq!(detect_indent_unit(&doc), "    ");
    }

    #[test]
    fn dedup_keeps_first_position_last_value() {
        let out = dedup_values([
            ("a", Value::from(1)),
            ("b", Value::from(2)),
            ("a", Value::from(3)),
        ]);
        assert_eq!(
            out,
            vec![
                ("a".to_string(), Value::from(3)),
                ("b".to_string(), Value::from(2))
            ]
        );
    }
}
