// runtime.rs - Live container probe and free-port suggestions
//
// Optional collaborator around the static scanner: asks the container
// runtime what is actually listening (docker ps) and probes the host
// for free alternatives when a conflict is found. Everything here is
// best-effort; a missing docker binary degrades to an empty result with
// docker_running = false.

use std::collections::HashMap;
use std::net::TcpListener;
use std::process::Command;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{PortscoutError, Result};
use crate::scanner::{Protocol, ScanResult};

/// A running container as reported by the runtime
#[derive(Debug, Clone, Serialize)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub ports: Vec<ContainerPort>,
    pub labels: HashMap<String, String>,
}

/// A port published by a running container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerPort {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_address: Option<String>,
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

/// Result of one runtime probe
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeResult {
    pub containers: Vec<Container>,
    /// Host port to the containers currently publishing it
    pub used_ports: HashMap<u16, Vec<Container>>,
    pub conflicts: Vec<RuntimeConflict>,
    pub scan_time: DateTime<Utc>,
    pub docker_running: bool,
}

/// A compose port already taken by a running container
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeConflict {
    pub port: u16,
    pub compose_service: String,
    pub container: String,
    pub message: String,
}

// One line of `docker ps --format '{{json .}}'`
#[derive(Debug, Deserialize)]
struct DockerPsLine {
    #[serde(rename = "Id", alias = "ID", default)]
    id: String,
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Ports", default)]
    ports: String,
    #[serde(rename = "Labels", default)]
    labels: String,
}

/// Probe the container runtime for currently published ports.
///
/// Returns an empty result with `docker_running = false` when the
/// docker binary is missing or the daemon is down.
pub fn probe_runtime() -> Result<RuntimeResult> {
    let mut result = RuntimeResult {
        containers: Vec::new(),
        used_ports: HashMap::new(),
        conflicts: Vec::new(),
        scan_time: Utc::now(),
        docker_running: false,
    };

    let available = Command::new("docker")
        .arg("version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !available {
        debug!("docker not available, skipping runtime probe");
        return Ok(result);
    }
    result.docker_running = true;

    let output = Command::new("docker")
        .args(["ps", "--format", "{{json .}}"])
        .output()?;
    if !output.status.success() {
        return Err(PortscoutError::RuntimeProbe(format!(
            "docker ps exited with {}",
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(ps) = serde_json::from_str::<DockerPsLine>(line) else {
            continue;
        };

        let container = Container {
            id: ps.id.chars().take(12).collect(),
            name: ps.names.trim_start_matches('/').to_string(),
            image: ps.image,
            state: ps.state,
            ports: parse_ports_column(&ps.ports),
            labels: parse_labels(&ps.labels),
        };

        for p in &container.ports {
            if p.host_port > 0 {
                result
                    .used_ports
                    .entry(p.host_port)
                    .or_default()
                    .push(container.clone());
            }
        }
        result.containers.push(container);
    }

    Ok(result)
}

/// Cross-reference compose bindings against currently used ports.
///
/// A container that looks like it was started from the scanned compose
/// project (name or compose service label match) is not a conflict.
pub fn cross_reference(scan: &ScanResult, runtime: &RuntimeResult) -> Vec<RuntimeConflict> {
    let mut conflicts = Vec::new();

    for (&port, containers) in &runtime.used_ports {
        let Some(bindings) = scan.port_index.get(&port) else {
            continue;
        };
        for binding in bindings {
            for container in containers {
                if likely_from_compose(container, &binding.service) {
                    continue;
                }
                conflicts.push(RuntimeConflict {
                    port,
                    compose_service: binding.service.clone(),
                    container: container.name.clone(),
                    message: format!(
                        "Port {} (for {}) is already used by container {}",
                        port, binding.service, container.name
                    ),
                });
            }
        }
    }

    conflicts.sort_by(|a, b| (a.port, &a.compose_service).cmp(&(b.port, &b.compose_service)));
    conflicts
}

fn likely_from_compose(container: &Container, service: &str) -> bool {
    if container
        .name
        .to_lowercase()
        .contains(&service.to_lowercase())
    {
        return true;
    }
    container
        .labels
        .get("com.docker.compose.service")
        .is_some_and(|label| label.eq_ignore_ascii_case(service))
}

// Ports column format: "0.0.0.0:8080->80/tcp, :::8080->80/tcp"
fn parse_ports_column(ports: &str) -> Vec<ContainerPort> {
    ports
        .split(", ")
        .filter_map(parse_port_mapping)
        .collect()
}

fn parse_port_mapping(s: &str) -> Option<ContainerPort> {
    let (host_part, container_part) = s.split_once("->")?;

    let (container_str, protocol_str) = match container_part.split_once('/') {
        Some((c, p)) => (c, Some(p)),
        None => (container_part, None),
    };
    let container_port: u16 = container_str.trim().parse().ok()?;
    let protocol = match protocol_str {
        Some("udp") => Protocol::Udp,
        _ => Protocol::Tcp,
    };

    let (address, port_str) = host_part.rsplit_once(':')?;
    let host_port: u16 = port_str.parse().ok()?;
    let host_address = if address.is_empty() {
        None
    } else {
        Some(address.to_string())
    };

    Some(ContainerPort {
        host_address,
        host_port,
        container_port,
        protocol,
    })
}

fn parse_labels(labels: &str) -> HashMap<String, String> {
    labels
        .split(',')
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Common alternatives tried before a linear search
static PORT_ALTERNATIVES: Lazy<HashMap<u16, &'static [u16]>> = Lazy::new(|| {
    HashMap::from([
        (80u16, &[8080, 8000, 8081, 9080][..]),
        (443, &[8443, 4443, 9443][..]),
        (3000, &[3001, 3002, 3003][..]),
        (3306, &[3307, 3308, 33060][..]),
        (5432, &[5433, 5434, 54320][..]),
        (5000, &[5001, 5002, 5003][..]),
        (6379, &[6380, 6381, 6382][..]),
        (8080, &[8081, 8082, 8090, 9080][..]),
        (27017, &[27018, 27019, 27020][..]),
    ])
});

/// Whether the host port can currently be bound
pub fn is_port_free(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).is_ok()
}

/// Check which of the given ports are already bound on the host
pub fn check_ports_in_use(ports: &[u16]) -> HashMap<u16, bool> {
    ports.iter().map(|&p| (p, !is_port_free(p))).collect()
}

/// Linear search for a free port starting at `start`
pub fn find_free_port(start: u16, max_attempts: u16) -> Option<u16> {
    (0..max_attempts)
        .filter_map(|i| start.checked_add(i))
        .find(|&p| is_port_free(p))
}

/// Suggest a free alternative for each conflicting port
pub fn suggest_free_ports(conflict_ports: &[u16]) -> HashMap<u16, u16> {
    let mut suggestions = HashMap::new();

    for &port in conflict_ports {
        let from_table = PORT_ALTERNATIVES
            .get(&port)
            .into_iter()
            .flat_map(|alts| alts.iter().copied());
        let fallbacks = [port.checked_add(1000), port.checked_add(10000)]
            .into_iter()
            .flatten();

        let found = from_table
            .chain(fallbacks)
            .find(|&alt| is_port_free(alt))
            .or_else(|| find_free_port(port.saturating_add(1), 100));

        if let Some(alt) = found {
            suggestions.insert(port, alt);
        }
    }

    suggestions
}

/// Markdown summary of a runtime probe
pub fn format_runtime_result(result: &RuntimeResult) -> String {
    let mut out = String::from("# Runtime Port Scan\n\n");

    if !result.docker_running {
        out.push_str("Docker daemon is not running\n");
        return out;
    }

    out.push_str(&format!(
        "**Containers Found:** {}\n**Scan Time:** {}\n\n",
        result.containers.len(),
        result.scan_time.to_rfc3339()
    ));

    if !result.containers.is_empty() {
        out.push_str("## Running Containers\n\n");
        out.push_str("| Container | Image | Ports |\n|-----------|-------|-------|\n");
        for c in &result.containers {
            let ports: Vec<String> = c
                .ports
                .iter()
                .filter(|p| p.host_port > 0)
                .map(|p| format!("{}:{}/{}", p.host_port, p.container_port, p.protocol))
                .collect();
            let ports = if ports.is_empty() {
                "-".to_string()
            } else {
                ports.join(", ")
            };
            out.push_str(&format!("| {} | {} | {} |\n", c.name, c.image, ports));
        }
        out.push('\n');
    }

    if !result.conflicts.is_empty() {
        out.push_str("## Conflicts\n\n");
        for c in &result.conflicts {
            out.push_str(&format!("- **Port {}**: {}\n", c.port, c.message));
        }
    }

    out
}
