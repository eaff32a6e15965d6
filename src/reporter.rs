// reporter.rs - Output formatting for scan results
//
// Text (colored, for terminals), JSON (stable shape for tooling) and
// markdown renderers. All of them consume a ScanResult read-only.

use std::collections::HashMap;
use std::path::PathBuf;

use colored::Colorize;
use serde::Serialize;

use crate::errors::Result;
use crate::runtime::RuntimeResult;
use crate::scanner::{Binding, Issue, ScanResult, Severity};

/// Colored text report
pub fn format_text(result: &ScanResult) -> String {
    let mut out = String::new();

    out.push_str(&format!("{}\n", "Port Check Report".cyan()));
    out.push_str(&format!("{}\n\n", "=================".cyan()));

    out.push_str(&format!("Scanned: {}\n", result.path.display()));
    out.push_str(&format!("Compose files: {}\n", result.compose_files.len()));
    out.push_str(&format!("Port bindings: {}\n", result.bindings.len()));
    out.push_str(&format!("Issues found: {}\n\n", result.issues.len()));

    if result.issues.is_empty() {
        out.push_str(&format!("{}\n", "No port conflicts detected!".green()));
        return out;
    }

    let errors: Vec<&Issue> = by_severity(result, Severity::Error);
    let warnings: Vec<&Issue> = by_severity(result, Severity::Warning);
    let info: Vec<&Issue> = by_severity(result, Severity::Info);

    if !errors.is_empty() {
        out.push_str(&format!("{}\n{}\n", "ERRORS".red(), "------".red()));
        for issue in &errors {
            format_issue(&mut out, issue);
        }
        out.push('\n');
    }

    if !warnings.is_empty() {
        out.push_str(&format!("{}\n{}\n", "WARNINGS".yellow(), "--------".yellow()));
        for issue in &warnings {
            format_issue(&mut out, issue);
        }
        out.push('\n');
    }

    if !info.is_empty() {
        out.push_str(&format!("{}\n{}\n", "INFO".dimmed(), "----".dimmed()));
        for issue in &info {
            format_issue(&mut out, issue);
        }
    }

    out
}

fn by_severity(result: &ScanResult, severity: Severity) -> Vec<&Issue> {
    result
        .issues
        .iter()
        .filter(|i| i.severity == severity)
        .collect()
}

fn format_issue(out: &mut String, issue: &Issue) {
    if issue.port > 0 {
        out.push_str(&format!("\nPort {}: {}\n", issue.port, issue.description));
    } else {
        out.push_str(&format!("\n{}\n", issue.description));
    }
    for b in &issue.bindings {
        out.push_str(&format!(
            "  -> {} in {} ({})\n",
            b,
            b.source.display(),
            b.service
        ));
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    path: &'a std::path::Path,
    compose_files: &'a [PathBuf],
    total_ports: usize,
    issues: &'a [Issue],
    bindings: &'a [Binding],
    #[serde(skip_serializing_if = "Option::is_none")]
    runtime: Option<&'a RuntimeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestions: Option<&'a HashMap<u16, u16>>,
}

/// JSON report with a stable top-level shape
pub fn format_json(
    result: &ScanResult,
    runtime: Option<&RuntimeResult>,
    suggestions: Option<&HashMap<u16, u16>>,
) -> Result<String> {
    let report = JsonReport {
        path: &result.path,
        compose_files: &result.compose_files,
        total_ports: result.bindings.len(),
        issues: &result.issues,
        bindings: &result.bindings,
        runtime,
        suggestions,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

/// Markdown report for CI summaries
pub fn format_markdown(result: &ScanResult) -> String {
    let mut out = String::from("# Port Check Report\n\n");
    out.push_str(&format!("**Path:** `{}`\n\n", result.path.display()));

    out.push_str("## Summary\n\n");
    out.push_str("| Metric | Value |\n|--------|-------|\n");
    out.push_str(&format!(
        "| Compose files scanned | {} |\n",
        result.compose_files.len()
    ));
    out.push_str(&format!(
        "| Total port bindings | {} |\n",
        result.bindings.len()
    ));
    out.push_str(&format!("| Issues found | {} |\n\n", result.issues.len()));

    if result.issues.is_empty() {
        out.push_str("**No port conflicts detected!**\n\n");
    } else {
        out.push_str("## Issues\n\n");
        out.push_str("| Severity | Port | Type | Description |\n");
        out.push_str("|----------|------|------|-------------|\n");
        for issue in &result.issues {
            let severity = match issue.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Info => "info",
            };
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                severity,
                issue.port,
                kind_label(issue),
                issue.description
            ));
        }
        out.push('\n');
    }

    if !result.bindings.is_empty() {
        out.push_str("## All Port Bindings\n\n");
        out.push_str("| Host Port | Container Port | Service | File |\n");
        out.push_str("|-----------|----------------|---------|------|\n");

        let grouped: HashMap<PathBuf, Vec<Binding>> = result.grouped_by_file();
        let mut files: Vec<&PathBuf> = grouped.keys().collect();
        files.sort();
        for file in files {
            for b in &grouped[file] {
                out.push_str(&format!(
                    "| {} | {} | {} | `{}` |\n",
                    b.host_port,
                    b.container_port,
                    b.service,
                    file.display()
                ));
            }
        }
    }

    out
}

fn kind_label(issue: &Issue) -> &'static str {
    use crate::scanner::IssueKind::*;
    match issue.kind {
        Collision => "collision",
        PotentialCollision => "potential_collision",
        Privileged => "privileged",
        CommonPort => "common_port",
        ProfileCollision => "profile_collision",
        ParseError => "parse_error",
    }
}
