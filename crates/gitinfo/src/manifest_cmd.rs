use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use gitinfo_contracts::GITINFO_MANIFEST_PATCH_REPORT_SCHEMA_VERSION;
use gitinfo_manifest::patch;
use serde::Serialize;
use serde_json::Value;

use crate::util::{print_json, write_atomic};

#[derive(Debug, Clone, Args)]
pub struct ManifestArgs {
    #[command(subcommand)]
    pub cmd: Option<ManifestCommand>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ManifestCommand {
    /// Ensure a top-level object property holds the given keys.
    Patch(ManifestPatchArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ManifestPatchArgs {
    /// Manifest file to edit.
    #[arg(long, value_name = "PATH", default_value = "package.json")]
    pub file: PathBuf,

    /// Top-level property to create or extend.
    #[arg(long, value_name = "NAME")]
    pub property: String,

    /// `KEY=VALUE` pair; VALUE is parsed as JSON, or taken as a plain string
    /// when it is not valid JSON. May be passed multiple times.
    #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
    pub set: Vec<String>,

    /// Print the patched text in the report instead of writing it.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
struct PatchError {
    code: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ManifestPatchReport {
    schema_version: &'static str,
    ok: bool,
    command: &'static str,
    path: String,
    changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<PatchError>,
}

pub fn cmd_manifest(args: ManifestArgs) -> Result<std::process::ExitCode> {
    let Some(cmd) = args.cmd else {
        bail!("missing subcommand (try: gitinfo manifest patch --property scripts --set KEY=VALUE)");
    };
    match cmd {
        ManifestCommand::Patch(args) => cmd_manifest_patch(args),
    }
}

fn cmd_manifest_patch(args: ManifestPatchArgs) -> Result<std::process::ExitCode> {
    let mut report = ManifestPatchReport {
        schema_version: GITINFO_MANIFEST_PATCH_REPORT_SCHEMA_VERSION,
        ok: true,
        command: "manifest.patch",
        path: args.file.display().to_string(),
        changed: false,
        text: None,
        error: None,
    };

    let values = match args
        .set
        .iter()
        .map(|raw| parse_assignment(raw))
        .collect::<Result<Vec<_>>>()
    {
        Ok(values) => values,
        Err(err) => return fail(report, "GITINFO_PATCH_ARGS", format!("{err:#}")),
    };

    let text = match std::fs::read_to_string(&args.file)
        .with_context(|| format!("read {}", args.file.display()))
    {
        Ok(text) => text,
        Err(err) => return fail(report, "GITINFO_PATCH_IO", format!("{err:#}")),
    };

    let updated = match patch(&text, &args.property, values) {
        Ok(updated) => updated,
        Err(err) => return fail(report, "GITINFO_MANIFEST_MALFORMED", err.to_string()),
    };

    report.changed = updated != text;
    if args.dry_run {
        report.text = Some(updated);
    } else if report.changed {
        write_atomic(&args.file, updated.as_bytes())?;
    }
    print_json(&report)?;
    Ok(std::process::ExitCode::SUCCESS)
}

fn fail(
    mut report: ManifestPatchReport,
    code: &str,
    message: String,
) -> Result<std::process::ExitCode> {
    report.ok = false;
    report.error = Some(PatchError {
        code: code.to_string(),
        message,
    });
    print_json(&report)?;
    Ok(std::process::ExitCode::from(20))
}

fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected KEY=VALUE, got {raw:?}");
    };
    if key.is_empty() {
        bail!("empty key in {raw:?}");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
    Ok((key.to_string(), value))
}
