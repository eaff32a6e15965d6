// scanner/analyzer.rs - Port conflict classification
//
// Consumes the canonical Binding set for one scan and reduces it to a
// deterministically ordered Issue list. Four independent stages: host
// port grouping (collision / potential_collision), privileged ports,
// common service ports, then a final (severity, port) sort. Analysis is
// a pure reduction and never fails; unreadable compose files are seeded
// in as parse_error issues by the discovery layer before analysis runs.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::scanner::binding::Binding;

/// Issue severity; variant order defines the report sort rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Collision,
    PotentialCollision,
    Privileged,
    CommonPort,
    ProfileCollision,
    ParseError,
}

/// One detected port problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub kind: IssueKind,
    /// Host port involved; 0 for file-level issues (parse_error)
    pub port: u16,
    pub description: String,
    /// Bindings implicated in this issue
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub bindings: Vec<Binding>,
}

/// Aggregate result of one scan invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub path: PathBuf,
    pub compose_files: Vec<PathBuf>,
    pub bindings: Vec<Binding>,
    /// Bindings grouped by host port
    pub port_index: HashMap<u16, Vec<Binding>>,
    pub issues: Vec<Issue>,
}

impl ScanResult {
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Append issues produced outside the analyzer (profile overlay)
    /// and restore the (severity, port) ordering
    pub fn add_issues(&mut self, new: impl IntoIterator<Item = Issue>) {
        self.issues.extend(new);
        sort_issues(&mut self.issues);
    }

    /// Bindings grouped by the compose file they came from
    pub fn grouped_by_file(&self) -> HashMap<PathBuf, Vec<Binding>> {
        let mut grouped: HashMap<PathBuf, Vec<Binding>> = HashMap::new();
        for b in &self.bindings {
            grouped.entry(b.source.clone()).or_default().push(b.clone());
        }
        grouped
    }
}

/// Well-known service ports flagged when bound on all interfaces
static COMMON_PORTS: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (22, "SSH"),
        (25, "SMTP"),
        (53, "DNS"),
        (80, "HTTP"),
        (443, "HTTPS"),
        (3306, "MySQL"),
        (5432, "PostgreSQL"),
        (6379, "Redis"),
        (8080, "HTTP Alternate"),
        (27017, "MongoDB"),
    ])
});

/// Analyze a full set of canonical bindings.
///
/// Entry point for callers that gathered bindings themselves; the
/// discovery layer uses [`analyze_with_issues`] to seed parse errors.
pub fn analyze(bindings: Vec<Binding>) -> ScanResult {
    analyze_with_issues(PathBuf::new(), Vec::new(), bindings, Vec::new())
}

pub(crate) fn analyze_with_issues(
    path: PathBuf,
    compose_files: Vec<PathBuf>,
    bindings: Vec<Binding>,
    mut issues: Vec<Issue>,
) -> ScanResult {
    let mut port_index: HashMap<u16, Vec<Binding>> = HashMap::new();
    for b in &bindings {
        if b.host_port > 0 {
            port_index.entry(b.host_port).or_default().push(b.clone());
        }
    }

    // Stage 1: group by host port, split wildcard vs specific addresses.
    // A wildcard bind always contends with anything else on the port;
    // distinct specific addresses may be intentional multi-homing.
    let mut collided: HashSet<u16> = HashSet::new();
    for (&port, group) in &port_index {
        if group.len() < 2 {
            continue;
        }

        let wildcard = group.iter().filter(|b| b.is_wildcard()).count();
        let specific = group.len() - wildcard;

        if wildcard >= 2 || (wildcard >= 1 && specific >= 1) {
            collided.insert(port);
            issues.push(Issue {
                severity: Severity::Error,
                kind: IssueKind::Collision,
                port,
                description: format!("Port {} bound by multiple services", port),
                bindings: group.clone(),
            });
        } else if specific >= 2 {
            issues.push(Issue {
                severity: Severity::Warning,
                kind: IssueKind::PotentialCollision,
                port,
                description: format!("Port {} bound multiple times with specific IPs", port),
                bindings: group.clone(),
            });
        }
    }

    // Stage 2: privileged ports, per binding
    for b in &bindings {
        if b.host_port > 0 && b.host_port < 1024 {
            issues.push(Issue {
                severity: Severity::Warning,
                kind: IssueKind::Privileged,
                port: b.host_port,
                description: format!("Port {} is privileged (requires root/sudo)", b.host_port),
                bindings: vec![b.clone()],
            });
        }
    }

    // Stage 3: common service ports, wildcard binds only, skipped when a
    // collision is already flagged on that port
    for b in &bindings {
        if let Some(label) = COMMON_PORTS.get(&b.host_port) {
            if b.is_wildcard() && !collided.contains(&b.host_port) {
                issues.push(Issue {
                    severity: Severity::Info,
                    kind: IssueKind::CommonPort,
                    port: b.host_port,
                    description: format!("Port {} is commonly used by {}", b.host_port, label),
                    bindings: vec![b.clone()],
                });
            }
        }
    }

    // Stage 4: deterministic ordering
    sort_issues(&mut issues);

    ScanResult {
        path,
        compose_files,
        bindings,
        port_index,
        issues,
    }
}

pub(crate) fn sort_issues(issues: &mut [Issue]) {
    issues.sort_by_key(|i| (i.severity, i.port));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::binding::{normalize, Protocol};
    use std::path::Path;

    fn binding(yaml: &str, service: &str) -> Binding {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        normalize(&value, service, Path::new("docker-compose.yml")).unwrap()
    }

    fn issues_of_kind(result: &ScanResult, kind: IssueKind) -> Vec<&Issue> {
        result.issues.iter().filter(|i| i.kind == kind).collect()
    }

    #[test]
    fn test_empty_input() {
        let result = analyze(Vec::new());
        assert!(result.bindings.is_empty());
        assert!(result.port_index.is_empty());
        assert!(!result.has_issues());
    }

    #[test]
    fn test_distinct_ports_no_issues() {
        let result = analyze(vec![
            binding("\"8080:80\"", "web"),
            binding("\"3000:3000\"", "api"),
        ]);
        // 8080 is a common port bound on all interfaces, so one info entry
        assert_eq!(issues_of_kind(&result, IssueKind::Collision).len(), 0);
        assert_eq!(issues_of_kind(&result, IssueKind::CommonPort).len(), 1);
    }

    #[test]
    fn test_wildcard_collision() {
        let result = analyze(vec![
            binding("\"8080:80\"", "web1"),
            binding("\"8080:80\"", "web2"),
        ]);

        let collisions = issues_of_kind(&result, IssueKind::Collision);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].port, 8080);
        assert_eq!(collisions[0].severity, Severity::Error);
        assert_eq!(collisions[0].bindings.len(), 2);
    }

    #[test]
    fn test_wildcard_plus_specific_is_collision() {
        let result = analyze(vec![
            binding("\"0.0.0.0:8080:80\"", "web"),
            binding("\"127.0.0.1:8080:80\"", "admin"),
        ]);
        assert_eq!(issues_of_kind(&result, IssueKind::Collision).len(), 1);
        assert_eq!(issues_of_kind(&result, IssueKind::PotentialCollision).len(), 0);
    }

    #[test]
    fn test_distinct_specific_addresses_downgraded() {
        let result = analyze(vec![
            binding("\"127.0.0.1:8080:80\"", "web"),
            binding("\"192.168.1.1:8080:80\"", "admin"),
        ]);

        assert_eq!(issues_of_kind(&result, IssueKind::Collision).len(), 0);
        let potential = issues_of_kind(&result, IssueKind::PotentialCollision);
        assert_eq!(potential.len(), 1);
        assert_eq!(potential[0].severity, Severity::Warning);
    }

    #[test]
    fn test_single_binding_no_grouping_issue() {
        let result = analyze(vec![binding("\"9000:9000\"", "web")]);
        assert_eq!(issues_of_kind(&result, IssueKind::Collision).len(), 0);
        assert_eq!(issues_of_kind(&result, IssueKind::PotentialCollision).len(), 0);
    }

    #[test]
    fn test_privileged_ports_per_binding() {
        let result = analyze(vec![
            binding("\"80:80\"", "web"),
            binding("\"443:443\"", "web"),
        ]);
        assert_eq!(issues_of_kind(&result, IssueKind::Privileged).len(), 2);
    }

    #[test]
    fn test_shared_privileged_port_surfaces_twice() {
        // Each binding gets its own privileged warning in addition to the
        // collision on the shared port
        let result = analyze(vec![
            binding("\"80:80\"", "web1"),
            binding("\"80:80\"", "web2"),
        ]);
        assert_eq!(issues_of_kind(&result, IssueKind::Privileged).len(), 2);
        assert_eq!(issues_of_kind(&result, IssueKind::Collision).len(), 1);
    }

    #[test]
    fn test_common_port_info() {
        let result = analyze(vec![binding("\"5432:5432\"", "db")]);

        let common = issues_of_kind(&result, IssueKind::CommonPort);
        assert_eq!(common.len(), 1);
        assert_eq!(common[0].severity, Severity::Info);
        assert!(common[0].description.contains("PostgreSQL"));
    }

    #[test]
    fn test_common_port_skipped_for_specific_address() {
        let result = analyze(vec![binding("\"127.0.0.1:5432:5432\"", "db")]);
        assert_eq!(issues_of_kind(&result, IssueKind::CommonPort).len(), 0);
    }

    #[test]
    fn test_common_port_suppressed_after_collision() {
        let result = analyze(vec![
            binding("\"8080:80\"", "web1"),
            binding("\"8080:80\"", "web2"),
        ]);
        assert_eq!(issues_of_kind(&result, IssueKind::Collision).len(), 1);
        assert_eq!(issues_of_kind(&result, IssueKind::CommonPort).len(), 0);
    }

    #[test]
    fn test_tcp_udp_same_port_flagged() {
        // Grouping is keyed by host port alone; tcp and udp on the same
        // numeric port are flagged even though the OS treats them as
        // independent namespaces. Deliberate, documented behavior.
        let result = analyze(vec![
            binding("\"53:53/tcp\"", "dns"),
            binding("\"53:53/udp\"", "dns"),
        ]);
        let collisions = issues_of_kind(&result, IssueKind::Collision);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].port, 53);
        assert!(collisions[0]
            .bindings
            .iter()
            .any(|b| b.protocol == Protocol::Udp));
    }

    #[test]
    fn test_zero_host_port_never_grouped() {
        // The normalizer rejects host port 0, but a manually built
        // binding must still be excluded from grouping
        let mut b = binding("\"8080:80\"", "web");
        b.host_port = 0;

        let result = analyze(vec![b, binding("\"9000:9000\"", "api")]);
        assert!(!result.port_index.contains_key(&0));
        assert!(result.issues.iter().all(|i| i.port != 0));
    }

    #[test]
    fn test_issue_ordering_severity_before_port() {
        // Error on high port 9000 must precede warning on low port 443
        let result = analyze(vec![
            binding("\"9000:9000\"", "a"),
            binding("\"9000:9000\"", "b"),
            binding("\"127.0.0.1:443:443\"", "web"),
        ]);

        assert!(result.issues.len() >= 2);
        assert_eq!(result.issues[0].severity, Severity::Error);
        assert_eq!(result.issues[0].port, 9000);
        let warn_pos = result
            .issues
            .iter()
            .position(|i| i.kind == IssueKind::Privileged)
            .unwrap();
        assert!(warn_pos > 0);
    }

    #[test]
    fn test_issue_ordering_port_within_severity() {
        let result = analyze(vec![
            binding("\"9000:9000\"", "a"),
            binding("\"9000:9000\"", "b"),
            binding("\"3000:3000\"", "c"),
            binding("\"3000:3000\"", "d"),
        ]);

        let errors: Vec<u16> = result
            .issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .map(|i| i.port)
            .collect();
        assert_eq!(errors, vec![3000, 9000]);
    }

    #[test]
    fn test_port_index_groups_by_host_port() {
        let result = analyze(vec![
            binding("\"8080:80\"", "web"),
            binding("\"8080:3000\"", "api"),
            binding("\"9000:9000\"", "other"),
        ]);
        assert_eq!(result.port_index[&8080].len(), 2);
        assert_eq!(result.port_index[&9000].len(), 1);
    }

    #[test]
    fn test_grouped_by_file() {
        let a = binding("\"8080:80\"", "web");
        let mut b = binding("\"9000:9000\"", "api");
        b.source = PathBuf::from("docker-compose.dev.yml");

        let result = analyze(vec![a, b]);
        let grouped = result.grouped_by_file();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[Path::new("docker-compose.yml")].len(), 1);
    }

    #[test]
    fn test_severity_rank_order() {
        assert!(Severity::Error < Severity::Warning);
        assert!(Severity::Warning < Severity::Info);
    }
}
