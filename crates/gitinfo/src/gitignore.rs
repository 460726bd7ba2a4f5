use anyhow::{Context, Result};
use gitinfo_contracts::GIT_IGNORE_FILE;
use tracing::debug;

use crate::tree::ProjectTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IgnoreOutcome {
    Appended,
    AlreadyPresent,
    NoIgnoreFile,
}

/// Appends `entry` as a new line of `.gitignore`. A project without an ignore
/// file is left without one.
pub(crate) fn add_ignore_entry(tree: &mut ProjectTree, entry: &str) -> Result<IgnoreOutcome> {
    if !tree.exists(GIT_IGNORE_FILE) {
        debug!(entry, "no {GIT_IGNORE_FILE} found; skipping");
        return Ok(IgnoreOutcome::NoIgnoreFile);
    }
    let existing = tree
        .read_to_string(GIT_IGNORE_FILE)?
        .with_context(|| format!("could not read {GIT_IGNORE_FILE}"))?;

    if existing.lines().any(|line| line.trim() == entry) {
        debug!(entry, "already ignored");
        return Ok(IgnoreOutcome::AlreadyPresent);
    }

    let mut out = existing;
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(entry);
    out.push('\n');
    debug!(entry, "appending ignore entry");
    tree.write(GIT_IGNORE_FILE, out);
    Ok(IgnoreOutcome::Appended)
}
