// profiles.rs - Profile-aware port conflict overlay
//
// Compose profiles gate which services actually start. This overlay
// loads the profile tags from the standard compose files, restricts the
// port set to the services active under a given profile selection (the
// implicit "default" profile is always active) and reports every host
// port claimed by more than one active service. The rule is coarser
// than the main analyzer on purpose: before any bind happens there is
// no wildcard/specific distinction worth arguing about.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::Value;

use crate::errors::Result;
use crate::scanner::{Issue, IssueKind, Severity};

/// All profiles found in a project's compose files
#[derive(Debug, Default)]
pub struct ProfilesConfig {
    pub profiles: HashMap<String, Profile>,
    pub files: Vec<PathBuf>,
}

/// A compose profile and the services it activates
#[derive(Debug, Default)]
pub struct Profile {
    pub name: String,
    pub services: Vec<ProfileService>,
}

/// One service as seen by the overlay: raw port specs, not Bindings
#[derive(Debug, Clone)]
pub struct ProfileService {
    pub name: String,
    pub ports: Vec<String>,
    pub env_files: Vec<String>,
    pub file: PathBuf,
}

/// One service's claim on a host port under an active profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceClaim {
    pub service: String,
    pub profile: String,
    pub port_spec: String,
}

/// A host port claimed by more than one active service
#[derive(Debug, Clone)]
pub struct ProfileConflict {
    pub port: u16,
    pub claims: Vec<ServiceClaim>,
}

impl ProfileConflict {
    pub fn to_issue(&self) -> Issue {
        Issue {
            severity: Severity::Error,
            kind: IssueKind::ProfileCollision,
            port: self.port,
            description: format!("Profile conflict on port {}: multiple services", self.port),
            bindings: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: HashMap<String, ProfiledService>,
}

#[derive(Debug, Deserialize)]
struct ProfiledService {
    #[serde(default)]
    ports: Vec<Value>,
    #[serde(default)]
    profiles: Vec<String>,
    #[serde(default)]
    env_file: Option<Value>,
}

/// Load profile information from the standard compose files at the root
pub fn load_profiles<P: AsRef<Path>>(base: P) -> Result<ProfilesConfig> {
    let base = base.as_ref();
    let mut config = ProfilesConfig::default();

    // Services with no profile tag belong to the always-active default
    config.profiles.insert(
        "default".to_string(),
        Profile {
            name: "default".to_string(),
            ..Default::default()
        },
    );

    for name in [
        "docker-compose.yml",
        "docker-compose.yaml",
        "compose.yml",
        "compose.yaml",
    ] {
        let path = base.join(name);
        if path.is_file() {
            parse_compose_profiles(&path, &mut config)?;
            config.files.push(path);
        }
    }

    Ok(config)
}

fn parse_compose_profiles(path: &Path, config: &mut ProfilesConfig) -> Result<()> {
    let content = fs::read_to_string(path)?;
    let compose: ComposeFile = serde_yaml::from_str(&content)?;

    for (service_name, svc) in &compose.services {
        let ports = svc.ports.iter().filter_map(port_spec_string).collect();

        let env_files = match &svc.env_file {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Sequence(seq)) => seq
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };

        let ps = ProfileService {
            name: service_name.clone(),
            ports,
            env_files,
            file: path.to_path_buf(),
        };

        if svc.profiles.is_empty() {
            config
                .profiles
                .get_mut("default")
                .expect("default profile exists")
                .services
                .push(ps);
        } else {
            for profile_name in &svc.profiles {
                config
                    .profiles
                    .entry(profile_name.clone())
                    .or_insert_with(|| Profile {
                        name: profile_name.clone(),
                        ..Default::default()
                    })
                    .services
                    .push(ps.clone());
            }
        }
    }

    Ok(())
}

/// Flatten any accepted port shape back to a display string
fn port_spec_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Mapping(m) => {
            let published = m.get("published")?;
            let target = m.get("target")?;
            Some(format!(
                "{}:{}",
                yaml_scalar(published)?,
                yaml_scalar(target)?
            ))
        }
        _ => None,
    }
}

fn yaml_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract the literal host port from a short port spec.
///
/// Same positional rule as the normalizer's string shapes: the leading
/// token for "PORT" and "HOST:CONTAINER", the middle token for
/// "IP:HOST:CONTAINER". Interpolated or otherwise non-literal specs
/// yield None.
fn extract_host_port(spec: &str) -> Option<u16> {
    let parts: Vec<&str> = spec.split(':').collect();
    let token = match parts.len() {
        1 | 2 => parts[0],
        3 => parts[1],
        _ => return None,
    };

    let port: u16 = token.split('/').next()?.parse().ok()?;
    if port == 0 {
        None
    } else {
        Some(port)
    }
}

impl ProfilesConfig {
    /// All port specs that would be active under the given profiles
    pub fn active_ports(&self, active_profiles: &[String]) -> Vec<String> {
        let mut ports = Vec::new();

        for profile in self.selected(active_profiles) {
            for svc in &profile.services {
                for port in &svc.ports {
                    if !ports.contains(port) {
                        ports.push(port.clone());
                    }
                }
            }
        }

        ports
    }

    /// Detect host ports claimed by more than one active service.
    ///
    /// A service reachable through several active profiles counts once;
    /// conflicts are between distinct services, not between profiles.
    pub fn detect_conflicts(&self, active_profiles: &[String]) -> Vec<ProfileConflict> {
        let mut claims: HashMap<u16, Vec<ServiceClaim>> = HashMap::new();

        for profile in self.selected(active_profiles) {
            for svc in &profile.services {
                for spec in &svc.ports {
                    let Some(port) = extract_host_port(spec) else {
                        continue;
                    };
                    let entry = claims.entry(port).or_default();
                    if entry.iter().any(|c| c.service == svc.name) {
                        continue;
                    }
                    entry.push(ServiceClaim {
                        service: svc.name.clone(),
                        profile: profile.name.clone(),
                        port_spec: spec.clone(),
                    });
                }
            }
        }

        let mut conflicts: Vec<ProfileConflict> = claims
            .into_iter()
            .filter(|(_, claims)| claims.len() > 1)
            .map(|(port, claims)| ProfileConflict { port, claims })
            .collect();

        conflicts.sort_by_key(|c| c.port);
        conflicts
    }

    /// All known profile names, sorted
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }

    // Default profile first, then the explicitly activated ones
    fn selected<'a>(&'a self, active_profiles: &'a [String]) -> impl Iterator<Item = &'a Profile> {
        std::iter::once("default")
            .chain(active_profiles.iter().map(String::as_str))
            .filter_map(|name| self.profiles.get(name))
    }
}

/// Markdown listing of profiles and their services
pub fn format_profiles(config: &ProfilesConfig) -> String {
    let mut out = String::from("# Compose Profiles\n\n");

    for name in config.profile_names() {
        let profile = &config.profiles[&name];
        out.push_str(&format!("## Profile: {}\n", name));
        if profile.services.is_empty() {
            out.push_str("  (no services)\n");
        } else {
            for svc in &profile.services {
                out.push_str(&format!("  - **{}**", svc.name));
                if !svc.ports.is_empty() {
                    out.push_str(&format!(" [ports: {}]", svc.ports.join(", ")));
                }
                out.push('\n');
            }
        }
        out.push('\n');
    }

    out
}
