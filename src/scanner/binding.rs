// scanner/binding.rs - Port declaration normalization
//
// Compose files declare ports in several shapes: bare integers, short
// strings ("8080:80", "127.0.0.1:8080:80/tcp") and the long mapping
// syntax ({target, published, protocol, host_ip}). This module reduces
// every accepted shape to one canonical, immutable Binding record.
// Declarations the tool does not understand (env interpolation, port
// ranges, IPv6 bind addresses) are skipped, never raised as errors.

use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Transport protocol of a port binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// One resolved host-port-to-container-port mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Bind interface; None or "0.0.0.0" means all interfaces
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_address: Option<String>,
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
    /// Owning service name from the compose file
    pub service: String,
    /// Compose file the declaration came from
    pub source: PathBuf,
    /// Original literal, retained for display
    pub raw: String,
}

impl Binding {
    /// Whether this binding claims every interface on its host port
    pub fn is_wildcard(&self) -> bool {
        match self.host_address.as_deref() {
            None | Some("0.0.0.0") => true,
            Some(_) => false,
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(addr) = &self.host_address {
            write!(f, "{}:", addr)?;
        }
        write!(f, "{}:{}", self.host_port, self.container_port)?;
        if self.protocol != Protocol::Tcp {
            write!(f, "/{}", self.protocol)?;
        }
        Ok(())
    }
}

// Matches "PORT", "HOST:CONTAINER", "IP:HOST:CONTAINER", each with an
// optional "/tcp" or "/udp" suffix. The IP group is dotted-quad only;
// IPv6 bind addresses fall through to rejection.
static PORT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):)?(\d+)(?::(\d+))?(?:/(tcp|udp))?$")
        .expect("port pattern is valid")
});

/// Normalize one raw port declaration into a canonical Binding.
///
/// Returns None for any shape the tool does not understand or for a
/// declaration resolving to host port 0 (runtime-assigned). A rejected
/// entry must never abort the scan of the rest of the file.
pub fn normalize(raw: &Value, service: &str, source: &Path) -> Option<Binding> {
    match raw {
        Value::Number(n) => {
            let port = u16::try_from(n.as_u64()?).ok()?;
            finish(None, port, port, Protocol::Tcp, n.to_string(), service, source)
        }
        Value::String(s) => {
            let caps = PORT_PATTERN.captures(s)?;

            let host_address = caps.get(1).map(|m| m.as_str().to_string());
            let host_port: u16 = caps.get(2)?.as_str().parse().ok()?;
            // Single port means same host and container port
            let container_port: u16 = match caps.get(3) {
                Some(m) => m.as_str().parse().ok()?,
                None => host_port,
            };
            let protocol = match caps.get(4) {
                Some(m) => Protocol::parse(m.as_str())?,
                None => Protocol::Tcp,
            };

            finish(host_address, host_port, container_port, protocol, s.clone(), service, source)
        }
        Value::Mapping(m) => {
            let container_port = u16::try_from(m.get("target")?.as_u64()?).ok()?;

            let host_port = match m.get("published") {
                Some(Value::Number(n)) => u16::try_from(n.as_u64()?).ok()?,
                Some(Value::String(s)) => s.parse().ok()?,
                _ => return None,
            };

            let protocol = match m.get("protocol") {
                Some(v) => Protocol::parse(v.as_str()?)?,
                None => Protocol::Tcp,
            };

            let host_address = match m.get("host_ip") {
                Some(v) => Some(v.as_str()?.to_string()),
                None => None,
            };

            let raw = format!("{}:{}", host_port, container_port);
            finish(host_address, host_port, container_port, protocol, raw, service, source)
        }
        _ => None,
    }
}

fn finish(
    host_address: Option<String>,
    host_port: u16,
    container_port: u16,
    protocol: Protocol,
    raw: String,
    service: &str,
    source: &Path,
) -> Option<Binding> {
    // Host port 0 is runtime-assigned and cannot collide at scan time
    if host_port == 0 {
        return None;
    }

    Some(Binding {
        host_address,
        host_port,
        container_port,
        protocol,
        service: service.to_string(),
        source: source.to_path_buf(),
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn norm(yaml: &str) -> Option<Binding> {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        normalize(&value, "test", Path::new("test.yml"))
    }

    #[test]
    fn test_bare_integer() {
        let b = norm("3000").unwrap();
        assert_eq!(b.host_port, 3000);
        assert_eq!(b.container_port, 3000);
        assert_eq!(b.host_address, None);
        assert_eq!(b.protocol, Protocol::Tcp);
        assert_eq!(b.raw, "3000");
    }

    #[test]
    fn test_single_port_string() {
        let b = norm("\"3000\"").unwrap();
        assert_eq!(b.host_port, 3000);
        assert_eq!(b.container_port, 3000);
    }

    #[test]
    fn test_host_container_pair() {
        let b = norm("\"8080:80\"").unwrap();
        assert_eq!(b.host_port, 8080);
        assert_eq!(b.container_port, 80);
        assert_eq!(b.host_address, None);
        assert!(b.is_wildcard());
    }

    #[test]
    fn test_specific_host_address() {
        let b = norm("\"127.0.0.1:9000:9000\"").unwrap();
        assert_eq!(b.host_address.as_deref(), Some("127.0.0.1"));
        assert_eq!(b.host_port, 9000);
        assert_eq!(b.container_port, 9000);
        assert!(!b.is_wildcard());
    }

    #[test]
    fn test_udp_suffix() {
        let b = norm("\"5000:5000/udp\"").unwrap();
        assert_eq!(b.protocol, Protocol::Udp);
        assert_eq!(b.host_port, 5000);
    }

    #[test]
    fn test_address_port_protocol_combined() {
        let b = norm("\"192.168.1.1:53:53/udp\"").unwrap();
        assert_eq!(b.host_address.as_deref(), Some("192.168.1.1"));
        assert_eq!(b.host_port, 53);
        assert_eq!(b.protocol, Protocol::Udp);
    }

    #[test]
    fn test_long_syntax() {
        let b = norm("{ target: 80, published: 8080, protocol: tcp }").unwrap();
        assert_eq!(b.host_port, 8080);
        assert_eq!(b.container_port, 80);
        assert_eq!(b.protocol, Protocol::Tcp);
    }

    #[test]
    fn test_long_syntax_matches_short_form() {
        // Same canonical binding as "8080:80" modulo the raw field
        let long = norm("{ target: 80, published: 8080 }").unwrap();
        let short = norm("\"8080:80\"").unwrap();
        assert_eq!(long.host_port, short.host_port);
        assert_eq!(long.container_port, short.container_port);
        assert_eq!(long.protocol, short.protocol);
        assert_eq!(long.host_address, short.host_address);
    }

    #[test]
    fn test_long_syntax_published_as_string() {
        let b = norm("{ target: 80, published: \"8080\" }").unwrap();
        assert_eq!(b.host_port, 8080);
    }

    #[test]
    fn test_long_syntax_host_ip() {
        let b = norm("{ target: 80, published: 8080, host_ip: 127.0.0.1 }").unwrap();
        assert_eq!(b.host_address.as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn test_long_syntax_without_published_rejected() {
        // No published port means no host binding to collide on
        assert!(norm("{ target: 80 }").is_none());
    }

    #[test]
    fn test_long_syntax_without_target_rejected() {
        assert!(norm("{ published: 8080 }").is_none());
    }

    #[test]
    fn test_zero_host_port_rejected() {
        assert!(norm("\"0:80\"").is_none());
        assert!(norm("0").is_none());
        assert!(norm("{ target: 80, published: 0 }").is_none());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(norm("\"invalid\"").is_none());
        assert!(norm("\"\"").is_none());
        assert!(norm("true").is_none());
        assert!(norm("[8080, 80]").is_none());
    }

    #[test]
    fn test_env_interpolation_rejected() {
        assert!(norm("\"${HOST_PORT:-8080}:80\"").is_none());
    }

    #[test]
    fn test_port_range_rejected() {
        assert!(norm("\"8000-8005:8000-8005\"").is_none());
    }

    #[test]
    fn test_ipv6_address_rejected() {
        assert!(norm("\"[::1]:8080:80\"").is_none());
    }

    #[test]
    fn test_port_above_u16_rejected() {
        assert!(norm("\"70000:80\"").is_none());
        assert!(norm("70000").is_none());
    }

    #[test]
    fn test_high_ports_accepted() {
        assert_eq!(norm("\"65535:65535\"").unwrap().host_port, 65535);
        assert_eq!(norm("\"65534:80\"").unwrap().container_port, 80);
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let a = norm("\"127.0.0.1:8080:80/udp\"").unwrap();
        let b = norm("\"127.0.0.1:8080:80/udp\"").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_wildcard_address_literal() {
        let b = norm("\"0.0.0.0:8080:80\"").unwrap();
        assert_eq!(b.host_address.as_deref(), Some("0.0.0.0"));
        assert!(b.is_wildcard());
    }

    #[test]
    fn test_display_round_trip() {
        let b = norm("\"127.0.0.1:8080:80\"").unwrap();
        assert_eq!(b.to_string(), "127.0.0.1:8080:80");

        let udp = norm("\"53:53/udp\"").unwrap();
        assert_eq!(udp.to_string(), "53:53/udp");
    }
}
