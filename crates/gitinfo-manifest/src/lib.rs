//! Formatting-preserving edits of JSON package manifests.
//!
//! A [`ManifestDocument`] indexes the source spans of a manifest's members so
//! that [`patch`] and [`add_dependency`] can splice new members and values into
//! the original text without touching any other byte.

mod document;
mod error;
mod patch;
mod render;

pub use document::{find_member, ManifestDocument, Member, Node, NodeKind, Span};
pub use error::MalformedDocument;
pub use patch::{add_dependency, patch, patch_with, Edit, EditRecorder, InsertPosition};
