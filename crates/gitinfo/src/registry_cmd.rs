use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use gitinfo_contracts::GITINFO_REGISTRY_REPORT_SCHEMA_VERSION;
use gitinfo_registry::{NodePackage, RegistryClient};
use serde::Serialize;

use crate::util::print_json;

#[derive(Debug, Clone, Args)]
pub struct RegistryArgs {
    #[command(subcommand)]
    pub cmd: Option<RegistryCommand>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum RegistryCommand {
    /// Resolve the latest published version of a package (falls back to `latest`).
    Latest(LatestArgs),
}

#[derive(Debug, Clone, Args)]
pub struct LatestArgs {
    /// Registry URL (default: `GITINFO_REGISTRY_URL`, then npm).
    #[arg(long, value_name = "URL")]
    pub registry: Option<String>,

    /// Package name.
    #[arg(value_name = "NAME")]
    pub name: String,
}

#[derive(Debug, Serialize)]
struct RegistryError {
    code: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct LatestReport {
    schema_version: &'static str,
    ok: bool,
    command: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    registry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    package: Option<NodePackage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RegistryError>,
}

pub fn cmd_registry(args: RegistryArgs) -> Result<std::process::ExitCode> {
    let Some(cmd) = args.cmd else {
        bail!("missing subcommand (try: gitinfo registry latest <NAME>)");
    };
    match cmd {
        RegistryCommand::Latest(args) => cmd_registry_latest(args),
    }
}

fn cmd_registry_latest(args: LatestArgs) -> Result<std::process::ExitCode> {
    let client = match RegistryClient::from_env_or(args.registry.as_deref()) {
        Ok(client) => client,
        Err(err) => {
            print_json(&LatestReport {
                schema_version: GITINFO_REGISTRY_REPORT_SCHEMA_VERSION,
                ok: false,
                command: "registry.latest",
                registry: None,
                package: None,
                error: Some(RegistryError {
                    code: "GITINFO_REGISTRY_CONFIG".to_string(),
                    message: format!("{err:#}"),
                }),
            })?;
            return Ok(std::process::ExitCode::from(20));
        }
    };

    let package = client
        .resolve_latest(&args.name)
        .unwrap_or_else(|never| match never {});
    print_json(&LatestReport {
        schema_version: GITINFO_REGISTRY_REPORT_SCHEMA_VERSION,
        ok: true,
        command: "registry.latest",
        registry: Some(client.root().to_string()),
        package: Some(package),
        error: None,
    })?;
    Ok(std::process::ExitCode::SUCCESS)
}
