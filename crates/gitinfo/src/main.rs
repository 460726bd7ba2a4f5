use anyhow::Result;
use clap::Parser;
use gitinfo_contracts::LOG_FILTER_ENV;
use tracing_subscriber::EnvFilter;

mod gitignore;
mod install;
mod manifest_cmd;
mod registry_cmd;
mod tasks;
mod template;
mod tree;
mod util;

#[derive(Parser, Debug)]
#[command(name = "gitinfo")]
#[command(
    about = "Install a git version-info generator into a Node project.",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Log debug details to stderr (otherwise `GITINFO_LOG`, default `warn`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Add the version generator script, its dependencies, the postinstall hook and ignore entries.
    Install(install::InstallArgs),
    /// Edit a JSON manifest in place, preserving its formatting.
    Manifest(manifest_cmd::ManifestArgs),
    /// Query the package registry.
    Registry(registry_cmd::RegistryArgs),
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Install(args) => install::cmd_install(args),
        Command::Manifest(args) => manifest_cmd::cmd_manifest(args),
        Command::Registry(args) => registry_cmd::cmd_registry(args),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
