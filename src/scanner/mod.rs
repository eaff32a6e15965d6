//! Static compose port scanning: normalization, discovery, analysis

pub mod analyzer;
pub mod binding;
pub mod discovery;

pub use analyzer::{analyze, Issue, IssueKind, ScanResult, Severity};
pub use binding::{normalize, Binding, Protocol};
pub use discovery::{discover_compose_files, scan};
