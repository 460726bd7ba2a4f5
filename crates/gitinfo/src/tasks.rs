use std::path::Path;
use std::process::Command;

use gitinfo_contracts::{DEFAULT_NPM_PROGRAM, NODE_PACKAGE_INSTALL_TASK, NPM_PROGRAM_ENV};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum TaskStatus {
    Requested,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TaskRecord {
    pub(crate) id: &'static str,
    pub(crate) status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

impl TaskRecord {
    pub(crate) fn node_package_install() -> Self {
        Self {
            id: NODE_PACKAGE_INSTALL_TASK,
            status: TaskStatus::Requested,
            message: None,
        }
    }
}

fn npm_program() -> String {
    match std::env::var(NPM_PROGRAM_ENV) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
        _ => DEFAULT_NPM_PROGRAM.to_string(),
    }
}

/// Runs a requested task in `root`. Failures are recorded on the task, never
/// returned.
pub(crate) fn run_task(task: &mut TaskRecord, root: &Path) {
    if task.id != NODE_PACKAGE_INSTALL_TASK {
        return;
    }
    let program = npm_program();
    info!(program = program.as_str(), root = %root.display(), "running package install");
    // The child's stdout would mix with the JSON report.
    let status = Command::new(&program)
        .arg("install")
        .current_dir(root)
        .stdout(std::io::stderr())
        .status();
    match status {
        Ok(s) if s.success() => task.status = TaskStatus::Succeeded,
        Ok(s) => {
            warn!(program = program.as_str(), status = %s, "package install failed");
            task.status = TaskStatus::Failed;
            task.message = Some(format!("{program} install exited with {s}"));
        }
        Err(err) => {
            warn!(program = program.as_str(), error = %err, "package install could not start");
            task.status = TaskStatus::Failed;
            task.message = Some(format!("spawn {program}: {err}"));
        }
    }
}
