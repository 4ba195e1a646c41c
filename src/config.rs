use std::fmt;
use std::time::Duration;

use hyper::Uri;

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 11434;

/// Address of one inference server. Bracketed IPv6 hosts keep their brackets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

impl ServerAddr {
    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`, falling back to `default_port`.
    pub fn parse(raw: &str, default_port: u16) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let invalid = || ConfigError::InvalidAddress(raw.to_string());
        if raw.is_empty() {
            return Err(invalid());
        }

        let (host, port) = if let Some(rest) = raw.strip_prefix('[') {
            let (inner, tail) = rest.split_once(']').ok_or_else(invalid)?;
            if inner.is_empty() {
                return Err(invalid());
            }
            let port = match tail {
                "" => None,
                _ => Some(tail.strip_prefix(':').ok_or_else(invalid)?),
            };
            (format!("[{}]", inner), port)
        } else {
            match raw.rsplit_once(':') {
                Some((host, port)) if !host.contains(':') => (host.to_string(), Some(port)),
                // bare IPv6 without brackets
                Some(_) => (format!("[{}]", raw), None),
                None => (raw.to_string(), None),
            }
        };

        if host.is_empty() || host.chars().any(is_reserved_in_host) {
            return Err(invalid());
        }
        let port = match port {
            Some(p) => p.parse::<u16>().map_err(|_| invalid())?,
            None => default_port,
        };

        let addr = Self { host, port };
        if !addr.round_trips_as_uri() {
            return Err(invalid());
        }
        Ok(addr)
    }

    /// The request URI built from this address must point back at the same host and port.
    fn round_trips_as_uri(&self) -> bool {
        let unbracket = |h: &str| h.trim_start_matches('[').trim_end_matches(']').to_string();
        match self.url("/").parse::<Uri>() {
            Ok(uri) => {
                uri.host().map(unbracket) == Some(unbracket(&self.host))
                    && uri.port_u16() == Some(self.port)
            }
            Err(_) => false,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self, path)
    }
}

fn is_reserved_in_host(c: char) -> bool {
    c.is_whitespace() || c.is_control() || matches!(c, '/' | '\\' | '#' | '?' | '@' | '%')
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Immutable settings handed to the poller at startup.
#[derive(Clone, Debug)]
pub struct PollerConfig {
    pub servers: Vec<ServerAddr>,
    pub interval: Duration,
    pub request_timeout: Duration,
    pub dry_run: bool,
}

impl PollerConfig {
    pub fn new(
        raw_servers: &[String],
        default_port: u16,
        interval_secs: u64,
        request_timeout_secs: u64,
        dry_run: bool,
    ) -> Result<Self, ConfigError> {
        let servers = raw_servers
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| ServerAddr::parse(s, default_port))
            .collect::<Result<Vec<_>, _>>()?;
        if servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        if interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("interval"));
        }
        if request_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("request timeout"));
        }

        Ok(Self {
            servers,
            interval: Duration::from_secs(interval_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
            dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_default_port() {
        let addr = ServerAddr::parse("localhost", DEFAULT_PORT).unwrap();
        assert_eq!(addr.to_string(), "localhost:11434");
        assert_eq!(addr.url("/api/ps"), "http://localhost:11434/api/ps");
    }

    #[test]
    fn explicit_port_wins() {
        let addr = ServerAddr::parse(" 10.0.0.5:8080 ", DEFAULT_PORT).unwrap();
        assert_eq!(addr.host, "10.0.0.5");
        assert_eq!(addr.port, 8080);
    }

    #[test]
    fn ipv6_forms() {
        let addr = ServerAddr::parse("[::1]:9000", DEFAULT_PORT).unwrap();
        assert_eq!(addr.to_string(), "[::1]:9000");
        let addr = ServerAddr::parse("[::1]", DEFAULT_PORT).unwrap();
        assert_eq!(addr.to_string(), "[::1]:11434");
        let addr = ServerAddr::parse("fe80::1", DEFAULT_PORT).unwrap();
        assert_eq!(addr.to_string(), "[fe80::1]:11434");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for raw in [
            "",
            ":11434",
            "host:port",
            "host:70000",
            "[::1",
            "[::1]x",
            "[]:1",
            "a/b",
            "bad host",
            "host#frag",
            "host?q",
            "h%zz",
            "user@host",
            "[::1 ]:80",
            "tab\thost",
        ] {
            assert!(
                ServerAddr::parse(raw, DEFAULT_PORT).is_err(),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn accepted_addresses_build_uris_for_the_same_host() {
        for raw in ["localhost", "ollama.internal:8080", "10.0.0.5", "[::1]:9000"] {
            let addr = ServerAddr::parse(raw, DEFAULT_PORT).unwrap();
            let uri: Uri = addr.url("/api/ps").parse().unwrap();
            assert_eq!(uri.port_u16(), Some(addr.port), "{raw}");
            assert_eq!(uri.path(), "/api/ps", "{raw}");
        }
    }

    #[test]
    fn config_rejects_unroutable_server() {
        let servers = vec!["localhost".to_string(), "host#frag".to_string()];
        assert_eq!(
            PollerConfig::new(&servers, DEFAULT_PORT, 1, 10, false).unwrap_err(),
            ConfigError::InvalidAddress("host#frag".to_string())
        );
    }

    #[test]
    fn config_requires_servers_and_positive_durations() {
        let servers = vec!["localhost".to_string()];
        assert_eq!(
            PollerConfig::new(&[], DEFAULT_PORT, 1, 10, false).unwrap_err(),
            ConfigError::NoServers
        );
        assert_eq!(
            PollerConfig::new(&[" ".to_string()], DEFAULT_PORT, 1, 10, false).unwrap_err(),
            ConfigError::NoServers
        );
        assert_eq!(
            PollerConfig::new(&servers, DEFAULT_PORT, 0, 10, false).unwrap_err(),
            ConfigError::ZeroDuration("interval")
        );
        assert_eq!(
            PollerConfig::new(&servers, DEFAULT_PORT, 1, 0, false).unwrap_err(),
            ConfigError::ZeroDuration("request timeout")
        );
    }

    #[test]
    fn config_keeps_server_order() {
        let raw = vec!["b:1".to_string(), "a".to_string()];
        let config = PollerConfig::new(&raw, DEFAULT_PORT, 5, 2, true).unwrap();
        let names: Vec<_> = config.servers.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["b:1", "a:11434"]);
        assert_eq!(config.interval, Duration::from_secs(5));
        assert!(config.dry_run);
    }
}
