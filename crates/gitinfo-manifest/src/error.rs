use std::fmt;

/// The manifest text is not strict JSON, or its root is not an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedDocument {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl MalformedDocument {
    pub(crate) fn at(text: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = line_col(text, offset);
        Self {
            line,
            column,
            message: message.into(),
        }
    }

    pub(crate) fn from_json(err: &serde_json::Error) -> Self {
        // serde_json appends the position to its message; it is carried separately here.
        let full = err.to_string();
        let suffix = format!(" at line {} column {}", err.line(), err.column());
        Self {
            line: err.line(),
            column: err.column(),
            message: full.strip_suffix(&suffix).unwrap_or(&full).to_string(),
        }
    }
}

impl fmt::Display for MalformedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed manifest at line {} column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl std::error::Error for MalformedDocument {}

fn line_col(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let before = &text.as_bytes()[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    (line, offset - line_start + 1)
}
