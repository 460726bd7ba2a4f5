use std::io::{Read as _, Write as _};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde_json::{json, Value};

fn run_gitinfo(args: &[&str], envs: &[(&str, &str)]) -> std::process::Output {
    let exe = env!("CARGO_BIN_EXE_gitinfo");
    let mut cmd = Command::new(exe);
    cmd.args(args)
        .env_remove("GITINFO_REGISTRY_URL")
        .env_remove("GITINFO_LOG");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    cmd.output().expect("run gitinfo")
}

fn parse_json_stdout(out: &std::process::Output) -> Value {
    serde_json::from_slice(&out.stdout).unwrap_or_else(|err| {
        panic!(
            "parse stdout JSON: {err}\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        )
    })
}

fn create_temp_dir(prefix: &str) -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let base = std::env::temp_dir();
    let pid = std::process::id();
    for _ in 0..10_000 {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = base.join(format!("{prefix}_{pid}_{n}"));
        if std::fs::create_dir(&path).is_ok() {
            return path;
        }
    }
    panic!("failed to create temp dir under {}", base.display());
}

fn rm_rf(path: &Path) {
    let _ = std::fs::remove_dir_all(path);
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).expect("read file")
}

fn start_http_server_once(status_line: &str, body: &str) -> String {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let addr = listener.local_addr().expect("local_addr");

    let status_line = status_line.to_string();
    let body = body.to_string();

    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let _ = stream.set_read_timeout(Some(Duration::from_secs(1)));

        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        for _ in 0..64 {
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&tmp[..n]);
                    if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        let resp = format!(
            "HTTP/1.1 {status_line}\r\n\
Content-Type: application/json\r\n\
Content-Length: {}\r\n\
Connection: close\r\n\
\r\n\
{body}",
            body.len()
        );
        stream.write_all(resp.as_bytes()).expect("write response");
        let _ = stream.flush();
    });

    format!("http://{addr}/")
}

const PACKAGE_JSON: &str = "{\n  \"name\": \"app\",\n  \"version\": \"1.2.3\",\n  \"scripts\": {\n    \"build\": \"ng build\"\n  }\n}\n";

fn setup_project(prefix: &str, gitignore: Option<&str>) -> PathBuf {
    let dir = create_temp_dir(prefix);
    std::fs::write(dir.join("package.json"), PACKAGE_JSON).expect("write package.json");
    if let Some(content) = gitignore {
        std::fs::write(dir.join(".gitignore"), content).expect("write .gitignore");
    }
    dir
}

#[test]
fn install_offline_wires_everything_and_is_idempotent() {
    let dir = setup_project("gitinfo_cli_install", Some("node_modules/\n"));
    let project = dir.to_str().unwrap();

    let out = run_gitinfo(&["install", "--project", project, "--offline"], &[]);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v = parse_json_stdout(&out);
    assert_eq!(v["schema_version"], "gitinfo.install.report@0.1.0");
    assert_eq!(v["ok"], true);
    assert_eq!(v["created"], json!(["git-version.js"]));
    assert_eq!(v["updated"], json!([".gitignore", "package.json"]));
    assert_eq!(
        v["dependencies"],
        json!([
            {"section": "devDependencies", "name": "git-describe", "version": "latest", "source": "offline"},
            {"section": "devDependencies", "name": "fs-extra", "version": "6.0.1", "source": "pinned"}
        ])
    );
    assert_eq!(
        v["tasks"],
        json!([{"id": "node-package-install", "status": "requested"}])
    );

    assert_eq!(
        read(&dir.join("package.json")),
        "{\n  \"name\": \"app\",\n  \"version\": \"1.2.3\",\n  \"scripts\": {\n    \"build\": \"ng build\",\n    \"postinstall\": \"node git-version.js\"\n  },\n  \"devDependencies\": {\n    \"fs-extra\": \"6.0.1\",\n    \"git-describe\": \"latest\"\n  }\n}\n"
    );
    assert_eq!(
        read(&dir.join(".gitignore")),
        "node_modules/\nsrc/environments/version.ts\n*/environments/version.ts\n"
    );
    assert!(read(&dir.join("git-version.js")).contains("environments"));

    // A second run finds everything in place.
    let out = run_gitinfo(&["install", "--project", project, "--offline"], &[]);
    assert_eq!(out.status.code(), Some(0));
    let v = parse_json_stdout(&out);
    assert_eq!(v["created"], json!([]));
    assert_eq!(v["updated"], json!([]));
    assert_eq!(v["unchanged"], json!(["git-version.js"]));

    rm_rf(&dir);
}

#[test]
fn install_resolves_latest_from_registry() {
    let registry = start_http_server_once(
        "200 OK",
        r#"{"name":"git-describe","dist-tags":{"latest":"4.1.1"}}"#,
    );
    let dir = setup_project("gitinfo_cli_registry", None);

    let out = run_gitinfo(
        &["install", "--project", dir.to_str().unwrap(), "--registry", &registry],
        &[],
    );
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v = parse_json_stdout(&out);
    assert_eq!(v["dependencies"][0]["version"], "4.1.1");
    assert_eq!(v["dependencies"][0]["source"], "registry");

    let manifest: Value = serde_json::from_str(&read(&dir.join("package.json"))).unwrap();
    assert_eq!(manifest["devDependencies"]["git-describe"], "4.1.1");

    rm_rf(&dir);
}

#[test]
fn install_falls_back_when_registry_is_unreachable() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    drop(listener);

    let dir = setup_project("gitinfo_cli_unreachable", None);
    let registry = format!("http://{addr}/");
    let out = run_gitinfo(
        &["install", "--project", dir.to_str().unwrap()],
        &[("GITINFO_REGISTRY_URL", &registry)],
    );
    assert_eq!(out.status.code(), Some(0));
    let v = parse_json_stdout(&out);
    assert_eq!(v["ok"], true);
    assert_eq!(v["dependencies"][0]["version"], "latest");
    assert_eq!(v["dependencies"][0]["source"], "registry");

    rm_rf(&dir);
}

#[test]
fn install_without_gitignore_does_not_create_one() {
    let dir = setup_project("gitinfo_cli_no_ignore", None);

    let out = run_gitinfo(
        &["install", "--project", dir.to_str().unwrap(), "--offline"],
        &[],
    );
    assert_eq!(out.status.code(), Some(0));
    let v = parse_json_stdout(&out);
    assert_eq!(v["notes"].as_array().map(Vec::len), Some(2));
    assert!(!dir.join(".gitignore").exists());

    rm_rf(&dir);
}

#[test]
fn install_dry_run_writes_nothing() {
    let dir = setup_project("gitinfo_cli_dry_run", Some("dist\n"));

    let out = run_gitinfo(
        &[
            "install",
            "--project",
            dir.to_str().unwrap(),
            "--offline",
            "--dry-run",
        ],
        &[],
    );
    assert_eq!(out.status.code(), Some(0));
    let v = parse_json_stdout(&out);
    assert_eq!(v["dry_run"], true);
    assert_eq!(v["created"], json!(["git-version.js"]));
    assert_eq!(v["updated"], json!([".gitignore", "package.json"]));

    assert!(!dir.join("git-version.js").exists());
    assert_eq!(read(&dir.join("package.json")), PACKAGE_JSON);
    assert_eq!(read(&dir.join(".gitignore")), "dist\n");

    rm_rf(&dir);
}

#[test]
fn malformed_manifest_aborts_without_writes() {
    let dir = create_temp_dir("gitinfo_cli_malformed");
    std::fs::write(dir.join("package.json"), "{ not json").unwrap();
    std::fs::write(dir.join(".gitignore"), "dist\n").unwrap();

    let out = run_gitinfo(
        &["install", "--project", dir.to_str().unwrap(), "--offline"],
        &[],
    );
    assert_eq!(out.status.code(), Some(20));
    let v = parse_json_stdout(&out);
    assert_eq!(v["ok"], false);
    assert_eq!(v["error"]["code"], "GITINFO_MANIFEST_MALFORMED");

    assert_eq!(read(&dir.join("package.json")), "{ not json");
    assert_eq!(read(&dir.join(".gitignore")), "dist\n");
    assert!(!dir.join("git-version.js").exists());

    rm_rf(&dir);
}

#[test]
fn missing_manifest_is_reported() {
    let dir = create_temp_dir("gitinfo_cli_missing");

    let out = run_gitinfo(
        &["install", "--project", dir.to_str().unwrap(), "--offline"],
        &[],
    );
    assert_eq!(out.status.code(), Some(20));
    let v = parse_json_stdout(&out);
    assert_eq!(v["error"]["code"], "GITINFO_MANIFEST_MISSING");
    assert!(!dir.join("git-version.js").exists());

    rm_rf(&dir);
}

#[test]
fn failing_install_task_is_a_note_not_an_error() {
    let dir = setup_project("gitinfo_cli_task", None);

    let out = run_gitinfo(
        &[
            "install",
            "--project",
            dir.to_str().unwrap(),
            "--offline",
            "--run-install",
        ],
        &[("GITINFO_NPM", "gitinfo-test-no-such-installer")],
    );
    assert_eq!(out.status.code(), Some(0));
    let v = parse_json_stdout(&out);
    assert_eq!(v["ok"], true);
    assert_eq!(v["tasks"][0]["status"], "failed");
    assert!(dir.join("git-version.js").is_file());

    rm_rf(&dir);
}

#[test]
fn manifest_patch_appends_to_inline_object() {
    let dir = create_temp_dir("gitinfo_cli_manifest_patch");
    let file = dir.join("package.json");
    std::fs::write(&file, r#"{"scripts": {"build": "tsc"}}"#).unwrap();

    let out = run_gitinfo(
        &[
            "manifest",
            "patch",
            "--file",
            file.to_str().unwrap(),
            "--property",
            "scripts",
            "--set",
            "postinstall=node git-version.js",
        ],
        &[],
    );
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v = parse_json_stdout(&out);
    assert_eq!(v["changed"], true);
    assert_eq!(
        read(&file),
        r#"{"scripts": {"build": "tsc", "postinstall": "node git-version.js"}}"#
    );

    let out = run_gitinfo(
        &[
            "manifest",
            "patch",
            "--file",
            file.to_str().unwrap(),
            "--property",
            "scripts",
            "--set",
            "postinstall=node git-version.js",
            "--dry-run",
        ],
        &[],
    );
    let v = parse_json_stdout(&out);
    assert_eq!(v["changed"], false);
    assert_eq!(
        v["text"],
        r#"{"scripts": {"build": "tsc", "postinstall": "node git-version.js"}}"#
    );

    rm_rf(&dir);
}

#[test]
fn manifest_patch_rejects_malformed_files() {
    let dir = create_temp_dir("gitinfo_cli_manifest_malformed");
    let file = dir.join("package.json");
    std::fs::write(&file, "{ not json").unwrap();

    let out = run_gitinfo(
        &[
            "manifest",
            "patch",
            "--file",
            file.to_str().unwrap(),
            "--property",
            "scripts",
            "--set",
            "a=1",
        ],
        &[],
    );
    assert_eq!(out.status.code(), Some(20));
    let v = parse_json_stdout(&out);
    assert_eq!(v["error"]["code"], "GITINFO_MANIFEST_MALFORMED");
    assert_eq!(read(&file), "{ not json");

    rm_rf(&dir);
}

#[test]
fn registry_latest_reads_file_registries() {
    let dir = create_temp_dir("gitinfo_cli_registry_file");
    std::fs::write(dir.join("git-describe"), r#"{"dist-tags":{"latest":"4.1.1"}}"#).unwrap();
    let registry = format!("file://{}/", dir.display());

    let out = run_gitinfo(&["registry", "latest", "git-describe", "--registry", &registry], &[]);
    assert_eq!(out.status.code(), Some(0));
    let v = parse_json_stdout(&out);
    assert_eq!(v["package"], json!({"name": "git-describe", "version": "4.1.1"}));

    let out = run_gitinfo(&["registry", "latest", "missing", "--registry", &registry], &[]);
    assert_eq!(out.status.code(), Some(0));
    let v = parse_json_stdout(&out);
    assert_eq!(v["package"], json!({"name": "missing", "version": "latest"}));

    rm_rf(&dir);
}
