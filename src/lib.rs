//! # Portscout - Compose Port Collision Detector
//!
//! Static, read-only pre-flight check for Docker Compose projects: finds
//! host ports claimed by more than one service before anything is
//! launched.
//!
//! The pipeline is strictly ordered and fully synchronous:
//!
//! ```text
//! discover compose files -> normalize port declarations -> analyze
//! ```
//!
//! Every raw port declaration (short string, bare integer or long
//! mapping syntax) is reduced to a canonical [`Binding`]; the analyzer
//! groups bindings by host port and classifies the groups into a
//! deterministically ordered [`Issue`] list. Optional collaborators sit
//! around that core: a profile-aware overlay, a docker runtime probe
//! with free-port suggestions, and text/JSON/markdown reporters.

pub mod errors;
pub mod profiles;
pub mod reporter;
pub mod runtime;
pub mod scanner;

pub use errors::{PortscoutError, Result};
pub use profiles::{load_profiles, ProfileConflict, ProfilesConfig};
pub use runtime::{probe_runtime, suggest_free_ports, RuntimeResult};
pub use scanner::{analyze, normalize, scan, Binding, Issue, IssueKind, Protocol, ScanResult, Severity};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
