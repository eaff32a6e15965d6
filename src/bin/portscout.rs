//! Portscout CLI
//!
//! Static compose port scan with optional runtime probe, profile
//! overlay and free-port suggestions. Strict mode exits non-zero on any
//! issue, for CI pipelines.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use portscout::errors::Result;
use portscout::runtime::{cross_reference, format_runtime_result, RuntimeResult};
use portscout::scanner::IssueKind;
use portscout::{profiles, reporter, runtime, scanner};

#[derive(Parser)]
#[command(name = "portscout")]
#[command(version)]
#[command(about = "Compose Port Collision Detector", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan compose files for port collisions
    Scan {
        /// Project root to scan
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Exit with error code on any issues found
        #[arg(long)]
        strict: bool,
        /// Output format
        #[arg(long, short = 'f', value_enum, default_value = "text")]
        format: OutputFormat,
        /// Also scan running containers for port usage
        #[arg(long)]
        runtime: bool,
        /// Suggest alternative ports for conflicts
        #[arg(long)]
        suggest: bool,
        /// Compose profile(s) to consider
        #[arg(long = "profile")]
        profiles: Vec<String>,
        /// Show host IP binding details
        #[arg(long)]
        show_host_ip: bool,
        /// Enable verbose logging
        #[arg(long, short = 'v')]
        verbose: bool,
    },
    /// List compose profiles and their services
    Profiles {
        /// Project root to inspect
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Markdown,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Scan {
            path,
            strict,
            format,
            runtime,
            suggest,
            profiles,
            show_host_ip,
            verbose,
        } => run_scan(
            &path,
            strict,
            format,
            runtime,
            suggest,
            &profiles,
            show_host_ip,
            verbose,
        ),
        Commands::Profiles { path } => run_profiles(&path),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_scan(
    path: &PathBuf,
    strict: bool,
    format: OutputFormat,
    runtime_scan: bool,
    suggest: bool,
    active_profiles: &[String],
    show_host_ip: bool,
    verbose: bool,
) -> Result<ExitCode> {
    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .init();
    }

    let mut result = scanner::scan(path)?;

    // Profile overlay: cross-profile port claims become error issues
    if !active_profiles.is_empty() {
        match profiles::load_profiles(path) {
            Ok(config) => {
                let conflicts = config.detect_conflicts(active_profiles);
                result.add_issues(conflicts.iter().map(|c| c.to_issue()));
            }
            Err(e) => eprintln!("Warning: failed to load profiles: {}", e),
        }
    }

    // Runtime probe: ports already taken by running containers
    let mut runtime_result: Option<RuntimeResult> = None;
    if runtime_scan {
        match runtime::probe_runtime() {
            Ok(mut rt) => {
                if rt.docker_running {
                    rt.conflicts = cross_reference(&result, &rt);
                }
                runtime_result = Some(rt);
            }
            Err(e) => eprintln!("Warning: runtime scan failed: {}", e),
        }
    }

    let mut suggestions: Option<HashMap<u16, u16>> = None;
    if suggest {
        let mut conflict_ports: Vec<u16> = result
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::Collision)
            .map(|i| i.port)
            .collect();
        conflict_ports.sort_unstable();
        conflict_ports.dedup();
        if !conflict_ports.is_empty() {
            suggestions = Some(runtime::suggest_free_ports(&conflict_ports));
        }
    }

    match format {
        OutputFormat::Json => {
            let out =
                reporter::format_json(&result, runtime_result.as_ref(), suggestions.as_ref())?;
            println!("{}", out);
        }
        OutputFormat::Markdown => {
            println!("{}", reporter::format_markdown(&result));
            if let Some(rt) = &runtime_result {
                if rt.docker_running {
                    println!("{}", format_runtime_result(rt));
                }
            }
            if let Some(suggestions) = &suggestions {
                println!("\n## Port Suggestions");
                for (old, new) in sorted(suggestions) {
                    println!("- Port {} -> {}", old, new);
                }
            }
        }
        OutputFormat::Text => {
            println!("{}", reporter::format_text(&result));

            if show_host_ip {
                println!("\n=== Host IP Bindings ===");
                for b in &result.bindings {
                    let host = b
                        .host_address
                        .clone()
                        .unwrap_or_else(|| "0.0.0.0 (all interfaces)".to_string());
                    println!(
                        "  {}: {} -> {}:{}",
                        b.service, host, b.host_port, b.container_port
                    );
                }
            }

            if let Some(rt) = &runtime_result {
                if rt.docker_running {
                    println!("\n=== Runtime Status ===");
                    println!("Running containers: {}", rt.containers.len());
                    if !rt.conflicts.is_empty() {
                        println!("Conflicts:");
                        for c in &rt.conflicts {
                            println!("  {}", c.message);
                        }
                    }
                }
            }

            if let Some(suggestions) = &suggestions {
                println!("\n=== Suggested Alternatives ===");
                for (old, new) in sorted(suggestions) {
                    println!("  Port {} -> {}", old, new);
                }
            }
        }
    }

    let mut has_issues = result.has_issues();
    if let Some(rt) = &runtime_result {
        has_issues = has_issues || !rt.conflicts.is_empty();
    }

    if strict && has_issues {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_profiles(path: &PathBuf) -> Result<ExitCode> {
    let config = profiles::load_profiles(path)?;
    print!("{}", profiles::format_profiles(&config));
    Ok(ExitCode::SUCCESS)
}

fn sorted(map: &HashMap<u16, u16>) -> Vec<(u16, u16)> {
    let mut pairs: Vec<(u16, u16)> = map.iter().map(|(&k, &v)| (k, v)).collect();
    pairs.sort_unstable();
    pairs
}
