use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use gitinfo_contracts::{
    DEV_DEPENDENCIES, GITINFO_INSTALL_REPORT_SCHEMA_VERSION, IGNORED_VERSION_FILES,
    LATEST_DEV_DEPENDENCIES, PACKAGE_JSON, PINNED_DEV_DEPENDENCIES, POSTINSTALL_COMMAND,
    POSTINSTALL_SCRIPT, SCRIPTS_PROPERTY, VERSION_GENERATOR_FILE,
};
use gitinfo_manifest::{add_dependency, patch, MalformedDocument, ManifestDocument};
use gitinfo_registry::{NodePackage, RegistryClient};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::gitignore::{add_ignore_entry, IgnoreOutcome};
use crate::tasks::{run_task, TaskRecord};
use crate::template::stage_version_generator;
use crate::tree::{ChangeKind, ProjectTree};
use crate::util::print_json;

#[derive(Debug, Clone, Args)]
pub struct InstallArgs {
    /// Project root containing `package.json`.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project: PathBuf,

    /// Registry URL used to resolve latest versions (default: `GITINFO_REGISTRY_URL`, then npm).
    #[arg(long, value_name = "URL")]
    pub registry: Option<String>,

    /// Skip registry lookups and record `latest` for unpinned dependencies.
    #[arg(long)]
    pub offline: bool,

    /// Compute and report the changes without writing them.
    #[arg(long)]
    pub dry_run: bool,

    /// Run the package install task after writing the changes.
    #[arg(long)]
    pub run_install: bool,
}

#[derive(Debug, Serialize)]
struct InstallError {
    code: String,
    message: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
enum VersionSource {
    Registry,
    Pinned,
    Offline,
}

#[derive(Debug, Serialize)]
struct DependencyRow {
    section: &'static str,
    name: String,
    version: String,
    source: VersionSource,
}

#[derive(Debug, Serialize)]
struct InstallReport {
    schema_version: &'static str,
    ok: bool,
    command: &'static str,
    root: String,
    dry_run: bool,
    dependencies: Vec<DependencyRow>,
    created: Vec<String>,
    updated: Vec<String>,
    unchanged: Vec<String>,
    tasks: Vec<TaskRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<InstallError>,
}

impl InstallReport {
    fn new(root: String, dry_run: bool) -> Self {
        Self {
            schema_version: GITINFO_INSTALL_REPORT_SCHEMA_VERSION,
            ok: true,
            command: "install",
            root,
            dry_run,
            dependencies: Vec::new(),
            created: Vec::new(),
            updated: Vec::new(),
            unchanged: Vec::new(),
            tasks: Vec::new(),
            notes: Vec::new(),
            error: None,
        }
    }

    fn fail(mut self, code: &str, message: String) -> Result<std::process::ExitCode> {
        self.ok = false;
        self.error = Some(InstallError {
            code: code.to_string(),
            message,
        });
        print_json(&self)?;
        Ok(std::process::ExitCode::from(20))
    }
}

pub fn cmd_install(args: InstallArgs) -> Result<std::process::ExitCode> {
    let root = match std::fs::canonicalize(&args.project) {
        Ok(p) if p.is_dir() => p,
        Ok(p) => {
            return InstallReport::new(p.display().to_string(), args.dry_run).fail(
                "GITINFO_INSTALL_ROOT",
                format!("project root is not a directory: {}", p.display()),
            )
        }
        Err(err) => {
            return InstallReport::new(args.project.display().to_string(), args.dry_run).fail(
                "GITINFO_INSTALL_ROOT",
                format!("resolve project root {}: {err}", args.project.display()),
            )
        }
    };
    let mut report = InstallReport::new(root.display().to_string(), args.dry_run);
    let mut tree = ProjectTree::new(&root);

    // The manifest is checked before any lookup so a bad one aborts right away.
    let manifest = match tree.read_to_string(PACKAGE_JSON) {
        Ok(Some(text)) => text,
        Ok(None) => {
            return report.fail(
                "GITINFO_MANIFEST_MISSING",
                format!("no {PACKAGE_JSON} in {}", root.display()),
            )
        }
        Err(err) => return report.fail("GITINFO_INSTALL_IO", format!("{err:#}")),
    };
    if let Err(err) = ManifestDocument::parse(&manifest) {
        return report.fail(
            "GITINFO_MANIFEST_MALFORMED",
            format!("{PACKAGE_JSON}: {err}"),
        );
    }

    let client = if args.offline {
        None
    } else {
        match RegistryClient::from_env_or(args.registry.as_deref()) {
            Ok(client) => Some(client),
            Err(err) => return report.fail("GITINFO_REGISTRY_CONFIG", format!("{err:#}")),
        }
    };

    if let Err(err) = run_steps(&mut tree, client.as_ref(), &mut report) {
        let code = if err.downcast_ref::<MalformedDocument>().is_some() {
            "GITINFO_MANIFEST_MALFORMED"
        } else {
            "GITINFO_INSTALL_IO"
        };
        return report.fail(code, format!("{err:#}"));
    }

    let changes = if args.dry_run {
        tree.changes()
    } else {
        tree.commit()
    };
    let changes = match changes {
        Ok(changes) => changes,
        Err(err) => return report.fail("GITINFO_INSTALL_IO", format!("{err:#}")),
    };
    for change in changes {
        match change.kind {
            ChangeKind::Created => report.created.push(change.path),
            ChangeKind::Updated => report.updated.push(change.path),
            ChangeKind::Unchanged => report.unchanged.push(change.path),
        }
    }

    if args.run_install && !args.dry_run {
        for task in &mut report.tasks {
            run_task(task, &root);
            if let Some(message) = &task.message {
                report.notes.push(message.clone());
            }
        }
    }

    info!(
        created = report.created.len(),
        updated = report.updated.len(),
        dry_run = args.dry_run,
        "install finished"
    );
    print_json(&report)?;
    Ok(std::process::ExitCode::SUCCESS)
}

fn run_steps(
    tree: &mut ProjectTree,
    client: Option<&RegistryClient>,
    report: &mut InstallReport,
) -> Result<()> {
    update_dependencies(tree, client, report)?;
    add_version_generator_file(tree);
    add_version_generator_to_gitignore(tree, report)?;
    add_scripts_to_package_json(tree)?;
    Ok(())
}

fn update_dependencies(
    tree: &mut ProjectTree,
    client: Option<&RegistryClient>,
    report: &mut InstallReport,
) -> Result<()> {
    debug!("updating dependencies");
    report.tasks.push(TaskRecord::node_package_install());

    // Registry lookups finish before the dependency list is written.
    let mut resolved: Vec<(NodePackage, VersionSource)> = Vec::new();
    for name in LATEST_DEV_DEPENDENCIES {
        let entry = match client {
            Some(client) => (
                client
                    .resolve_latest(name)
                    .unwrap_or_else(|never| match never {}),
                VersionSource::Registry,
            ),
            None => (NodePackage::fallback(name), VersionSource::Offline),
        };
        resolved.push(entry);
    }
    for (name, version) in PINNED_DEV_DEPENDENCIES {
        resolved.push((NodePackage::new(name, version), VersionSource::Pinned));
    }

    for (pkg, source) in resolved {
        debug!(
            name = pkg.name.as_str(),
            version = pkg.version.as_str(),
            "adding to {DEV_DEPENDENCIES}"
        );
        update_manifest(tree, |text| {
            add_dependency(text, DEV_DEPENDENCIES, &pkg.name, &pkg.version)
        })?;
        report.dependencies.push(DependencyRow {
            section: DEV_DEPENDENCIES,
            name: pkg.name,
            version: pkg.version,
            source,
        });
    }
    Ok(())
}

fn add_version_generator_file(tree: &mut ProjectTree) {
    debug!(path = VERSION_GENERATOR_FILE, "adding file to project root");
    stage_version_generator(tree);
}

fn add_version_generator_to_gitignore(
    tree: &mut ProjectTree,
    report: &mut InstallReport,
) -> Result<()> {
    for entry in IGNORED_VERSION_FILES {
        if add_ignore_entry(tree, entry)? == IgnoreOutcome::NoIgnoreFile {
            report
                .notes
                .push(format!("no .gitignore found; add {entry} to your ignore rules"));
        }
    }
    Ok(())
}

fn add_scripts_to_package_json(tree: &mut ProjectTree) -> Result<()> {
    update_manifest(tree, |text| {
        patch(
            text,
            SCRIPTS_PROPERTY,
            [(POSTINSTALL_SCRIPT, Value::from(POSTINSTALL_COMMAND))],
        )
    })
}

/// Reads the (possibly staged) manifest, applies `edit`, and stages the result.
fn update_manifest(
    tree: &mut ProjectTree,
    edit: impl FnOnce(&str) -> Result<String, MalformedDocument>,
) -> Result<()> {
    let text = tree
        .read_to_string(PACKAGE_JSON)?
        .with_context(|| format!("missing {PACKAGE_JSON}"))?;
    let updated = edit(&text).with_context(|| format!("patch {PACKAGE_JSON}"))?;
    if updated != text {
        tree.write(PACKAGE_JSON, updated);
    }
    Ok(())
}
