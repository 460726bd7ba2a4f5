//! Shared, version-pinned identifiers and fixed install policy.
//!
//! These constants are the single source of truth for the strings that appear
//! in machine-readable output and for the paths/values the install command
//! writes into a target project.

pub const GITINFO_INSTALL_REPORT_SCHEMA_VERSION: &str = "gitinfo.install.report@0.1.0";
pub const GITINFO_MANIFEST_PATCH_REPORT_SCHEMA_VERSION: &str =
    "gitinfo.manifest.patch.report@0.1.0";
pub const GITINFO_REGISTRY_REPORT_SCHEMA_VERSION: &str = "gitinfo.registry.report@0.1.0";

pub const PACKAGE_JSON: &str = "package.json";
pub const GIT_IGNORE_FILE: &str = ".gitignore";

/// Destination of the bundled generator script, relative to the project root.
pub const VERSION_GENERATOR_FILE: &str = "git-version.js";

pub const SCRIPTS_PROPERTY: &str = "scripts";
pub const POSTINSTALL_SCRIPT: &str = "postinstall";
pub const POSTINSTALL_COMMAND: &str = "node git-version.js";

/// Generated files the generator script writes; never committed.
pub const IGNORED_VERSION_FILES: [&str; 2] =
    ["src/environments/version.ts", "*/environments/version.ts"];

pub const DEV_DEPENDENCIES: &str = "devDependencies";

/// Dev-dependencies resolved against the registry at install time.
pub const LATEST_DEV_DEPENDENCIES: [&str; 1] = ["git-describe"];
/// Dev-dependencies pinned to a fixed version.
pub const PINNED_DEV_DEPENDENCIES: [(&str, &str); 1] = [("fs-extra", "6.0.1")];

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org/";
pub const REGISTRY_URL_ENV: &str = "GITINFO_REGISTRY_URL";
pub const FALLBACK_VERSION: &str = "latest";

pub const NODE_PACKAGE_INSTALL_TASK: &str = "node-package-install";
pub const NPM_PROGRAM_ENV: &str = "GITINFO_NPM";
pub const DEFAULT_NPM_PROGRAM: &str = "npm";

pub const LOG_FILTER_ENV: &str = "GITINFO_LOG";

/// Indentation width used for inserted JSON when the document gives no hint.
pub const JSON_INDENT_WIDTH: usize = 4;
