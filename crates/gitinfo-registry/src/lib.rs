use std::convert::Infallible;
use std::io::Read as _;

use anyhow::{Context, Result};
use gitinfo_contracts::{DEFAULT_REGISTRY_URL, FALLBACK_VERSION, REGISTRY_URL_ENV};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodePackage {
    pub name: String,
    pub version: String,
}

impl NodePackage {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    /// The best-effort answer when the registry cannot be asked.
    pub fn fallback(name: &str) -> Self {
        Self::new(name, FALLBACK_VERSION)
    }
}

#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(default, rename = "dist-tags")]
    dist_tags: Option<DistTags>,
}

#[derive(Debug, Deserialize)]
struct DistTags {
    #[serde(default)]
    latest: Option<String>,
}

/// Client for an npm-compatible registry (`GET <root>/<name>` returns the
/// package document).
#[derive(Debug, Clone)]
pub struct RegistryClient {
    root: Url,
}

impl RegistryClient {
    pub fn new(registry_url: &str) -> Result<Self> {
        let raw = registry_url.trim();
        let with_slash = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        let root = Url::parse(&with_slash)
            .with_context(|| format!("invalid registry url: {registry_url:?} (expected URL)"))?;
        match root.scheme() {
            "http" | "https" | "file" => {}
            other => anyhow::bail!(
                "unsupported registry url scheme {other:?} (expected http, https or file)"
            ),
        }
        Ok(Self { root })
    }

    /// Uses `registry_url` when given, then `GITINFO_REGISTRY_URL`, then the
    /// public npm registry.
    pub fn from_env_or(registry_url: Option<&str>) -> Result<Self> {
        match registry_url {
            Some(url) => Self::new(url),
            None => Self::new(&default_registry_url()),
        }
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    pub fn package_url(&self, package_name: &str) -> Result<Url> {
        let rel = encode_package_name(package_name)?;
        self.root
            .join(&rel)
            .with_context(|| format!("registry url join: {rel:?}"))
    }

    /// The `dist-tags.latest` version of `package_name`.
    pub fn fetch_latest(&self, package_name: &str) -> Result<String> {
        let url = self.package_url(package_name)?;
        let bytes = fetch_bytes(&url)?;
        let doc: Packument = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse registry document: {}", url.as_str()))?;
        doc.dist_tags
            .and_then(|tags| tags.latest)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("no dist-tags.latest in {}", url.as_str()))
    }

    /// Resolves the latest published version, or `"latest"` when the lookup
    /// fails for any reason. Never returns `Err`.
    pub fn resolve_latest(&self, package_name: &str) -> Result<NodePackage, Infallible> {
        match self.fetch_latest(package_name) {
            Ok(version) => {
                debug!(package = package_name, %version, "resolved latest version");
                Ok(NodePackage::new(package_name, &version))
            }
            Err(err) => {
                warn!(
                    package = package_name,
                    error = %format!("{err:#}"),
                    "registry lookup failed; using {FALLBACK_VERSION:?}"
                );
                Ok(NodePackage::fallback(package_name))
            }
        }
    }
}

pub fn default_registry_url() -> String {
    match std::env::var(REGISTRY_URL_ENV) {
        Ok(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                DEFAULT_REGISTRY_URL.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => DEFAULT_REGISTRY_URL.to_string(),
    }
}

/// Relative registry path for a package name; the `/` of a scoped name is
/// percent-encoded (`@scope/name` -> `@scope%2fname`).
fn encode_package_name(package_name: &str) -> Result<String> {
    let name = package_name.trim();
    if name.is_empty() {
        anyhow::bail!("package name must be non-empty");
    }
    if let Some(scoped) = name.strip_prefix('@') {
        let Some((scope, rest)) = scoped.split_once('/') else {
            anyhow::bail!("scoped package name must look like @scope/name: got {name:?}");
        };
        check_name_segment(scope, name)?;
        check_name_segment(rest, name)?;
        return Ok(format!("@{scope}%2f{rest}"));
    }
    check_name_segment(name, name)?;
    Ok(name.to_string())
}

fn check_name_segment(segment: &str, full: &str) -> Result<()> {
    if segment.is_empty() || segment.starts_with('.') {
        anyhow::bail!("invalid package name: {full:?}");
    }
    for b in segment.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {}
            _ => anyhow::bail!("package name contains invalid characters: {full:?}"),
        }
    }
    Ok(())
}

fn fetch_bytes(url: &Url) -> Result<Vec<u8>> {
    match url.scheme() {
        "file" => {
            let path = url.to_file_path().map_err(|_| {
                anyhow::anyhow!("file url could not be converted to a path: {:?}", url)
            })?;
            std::fs::read(&path).with_context(|| format!("read {}", path.display()))
        }
        "http" | "https" => {
            let resp = ureq::get(url.as_str())
                .header("Accept", "application/json")
                .call()
                .map_err(|e| anyhow::anyhow!("http GET {}: {e}", url))?;
            let mut reader = resp.into_body().into_reader();
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).context("read http response")?;
            Ok(buf)
        }
        other => anyhow::bail!("unsupported url scheme {other:?} for {}", url.as_str()),
    }
}
