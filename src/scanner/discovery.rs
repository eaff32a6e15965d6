// scanner/discovery.rs - Compose file discovery and loading
//
// Locates compose files under a project root (standard names plus
// docker-compose.*.yml overrides at the root, standard names one level
// down) and feeds each service's port declarations through the
// normalizer. A file that fails to parse becomes a parse_error issue;
// the scan continues with the remaining files. Only a missing root is
// fatal.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::errors::{PortscoutError, Result};
use crate::scanner::analyzer::{analyze_with_issues, Issue, IssueKind, ScanResult, Severity};
use crate::scanner::binding::{normalize, Binding};

/// Standard compose file names, also searched one subdirectory deep
const COMPOSE_FILE_NAMES: [&str; 4] = [
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

// Override files like docker-compose.dev.yml, root directory only
static OVERRIDE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^docker-compose\..+\.ya?ml$").expect("override pattern is valid"));

/// Relevant service fields of a compose file. Port entries stay loosely
/// typed; the normalizer decides what each one means. The expose section
/// never binds to the host and is deliberately not read.
#[derive(Debug, Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: HashMap<String, ComposeService>,
}

#[derive(Debug, Deserialize)]
struct ComposeService {
    #[serde(default)]
    ports: Vec<Value>,
}

/// Scan a project root for compose port conflicts.
///
/// Gathers every port declaration from the discovered compose files,
/// normalizes them and runs the conflict analysis. The only fatal error
/// is a root path that does not exist or cannot be read.
pub fn scan<P: AsRef<Path>>(root: P) -> Result<ScanResult> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(PortscoutError::PathNotFound(
            root.to_string_lossy().to_string(),
        ));
    }

    let compose_files = discover_compose_files(root)?;
    debug!(files = compose_files.len(), "compose files discovered");

    let mut bindings = Vec::new();
    let mut issues = Vec::new();

    for file in &compose_files {
        match parse_compose_file(file) {
            Ok(mut file_bindings) => bindings.append(&mut file_bindings),
            Err(e) => {
                warn!(file = %file.display(), error = %e, "failed to parse compose file");
                issues.push(Issue {
                    severity: Severity::Warning,
                    kind: IssueKind::ParseError,
                    port: 0,
                    description: format!("Failed to parse {}: {}", file.display(), e),
                    bindings: Vec::new(),
                });
            }
        }
    }

    Ok(analyze_with_issues(
        root.to_path_buf(),
        compose_files,
        bindings,
        issues,
    ))
}

/// Find compose files at the root and one level of subdirectories
pub fn discover_compose_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };

        let standard = COMPOSE_FILE_NAMES.contains(&name);
        // Override variants only at the root, standard names anywhere
        let matched = if entry.depth() == 1 {
            standard || OVERRIDE_PATTERN.is_match(name)
        } else {
            standard
        };

        if matched {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// Parse one compose file into bindings; unparseable entries are skipped
fn parse_compose_file(path: &Path) -> Result<Vec<Binding>> {
    let content = fs::read_to_string(path)?;
    let compose: ComposeFile = serde_yaml::from_str(&content)?;

    let mut bindings = Vec::new();
    for (service_name, service) in &compose.services {
        for port in &service.ports {
            if let Some(binding) = normalize(port, service_name, path) {
                bindings.push(binding);
            }
        }
    }

    Ok(bindings)
}
