use gitinfo_contracts::VERSION_GENERATOR_FILE;

use crate::tree::ProjectTree;

const VERSION_GENERATOR_JS: &str = include_str!("../assets/git-version.js");

/// Stages the bundled generator script at its fixed location; an existing
/// copy is replaced.
pub(crate) fn stage_version_generator(tree: &mut ProjectTree) {
    tree.write(VERSION_GENERATOR_FILE, VERSION_GENERATOR_JS);
}
