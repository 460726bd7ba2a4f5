use serde_json::Value;

/// How a value is laid out where it is inserted.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Layout<'i> {
    /// `{"a": 1, "b": [1, 2]}` on one line.
    Inline,
    /// One member per line; `indent` is the indentation of the line the value
    /// starts on, `unit` one nesting level.
    Block { indent: &'i str, unit: &'i str },
}

pub(crate) fn quote(key: &str) -> String {
    Value::from(key).to_string()
}

/// `JSON.stringify(value)` equivalent.
pub(crate) fn compact(value: &Value) -> String {
    value.to_string()
}

pub(crate) fn render(value: &Value, layout: Layout<'_>) -> String {
    match value {
        Value::Object(map) => {
            render_entries(map.iter().map(|(k, v)| (k.as_str(), v)), layout)
        }
        Value::Array(items) => render_items(items, layout),
        scalar => compact(scalar),
    }
}

/// Renders an object from ordered entries.
pub(crate) fn render_entries<'v>(
    entries: impl IntoIterator<Item = (&'v str, &'v Value)>,
    layout: Layout<'_>,
) -> String {
    let entries: Vec<(&str, &Value)> = entries.into_iter().collect();
    if entries.is_empty() {
        return "{}".to_string();
    }
    match layout {
        Layout::Inline => {
            let parts: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", quote(k), render(v, Layout::Inline)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Layout::Block { indent, unit } => {
            let inner = format!("{indent}{unit}");
            let parts: Vec<String> = entries
                .iter()
                .map(|(k, v)| {
                    let nested = Layout::Block {
                        indent: &inner,
                        unit,
                    };
                    format!("{inner}{}: {}", quote(k), render(v, nested))
                })
                .collect();
            format!("{{\n{}\n{indent}}}", parts.join(",\n"))
        }
    }
}

fn render_items(items: &[Value], layout: Layout<'_>) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }
    match layout {
        Layout::Inline => {
            let parts: Vec<String> = items.iter().map(|v| render(v, Layout::Inline)).collect();
            format!("[{}]", parts.join(", "))
        }
        Layout::Block { indent, unit } => {
            let inner = format!("{indent}{unit}");
            let parts: Vec<String> = items
                .iter()
                .map(|v| {
                    let nested = Layout::Block {
                        indent: &inner,
                        unit,
                    };
                    format!("{inner}{}", render(v, nested))
                })
                .collect();
            format!("[\n{}\n{indent}]", parts.join(",\n"))
        }
    }
}
