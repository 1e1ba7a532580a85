//! Endpoint addresses.
//!
//! Accepted forms:
//!
//! ```text
//! cache1.local          -> cache1.local:<default port>
//! 10.0.0.7:6380         -> 10.0.0.7:6380
//! [::1]:6380            -> ::1 port 6380
//! [::1] / ::1           -> ::1 port <default port>
//! ```

use crate::connection::handler::ConnectionError;
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

/// A host name (or literal IP) plus port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Parses `host[:port]`, using `default_port` when no port is given.
    pub fn parse(addr: &str, default_port: u16) -> Result<Self, ConnectionError> {
        let invalid = || ConnectionError::InvalidAddress(addr.to_string());
        let addr_trimmed = addr.trim();

        let (host, port) = if let Some(rest) = addr_trimmed.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            match tail {
                "" => (host, None),
                _ => (host, Some(tail.strip_prefix(':').ok_or_else(invalid)?)),
            }
        } else {
            match addr_trimmed.split_once(':') {
                // more than one colon: a bare IPv6 literal
                Some((_, tail)) if tail.contains(':') => (addr_trimmed, None),
                Some((host, port)) => (host, Some(port)),
                None => (addr_trimmed, None),
            }
        };

        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        let port = match port {
            Some(text) => match text.parse::<u16>() {
                Ok(port) if port != 0 => port,
                _ => return Err(invalid()),
            },
            None => default_port,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolves to the first socket address the system reports.
    pub fn resolve(&self) -> io::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses found"))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_and_port() {
        let endpoint = Endpoint::parse("10.0.0.7:6380", 6379).unwrap();
        assert_eq!(endpoint.host(), "10.0.0.7");
        assert_eq!(endpoint.port(), 6380);
        assert_eq!(endpoint.to_string(), "10.0.0.7:6380");
    }

    #[test]
    fn test_default_port() {
        let endpoint = Endpoint::parse("localhost", 6379).unwrap();
        assert_eq!(endpoint.port(), 6379);
        assert_eq!(endpoint.to_string(), "localhost:6379");
    }

    #[test]
    fn test_ipv6_forms() {
        let bracketed = Endpoint::parse("[::1]:7000", 6379).unwrap();
        assert_eq!(bracketed.host(), "::1");
        assert_eq!(bracketed.port(), 7000);
        assert_eq!(bracketed.to_string(), "[::1]:7000");

        assert_eq!(Endpoint::parse("[::1]", 6379).unwrap().port(), 6379);
        assert_eq!(Endpoint::parse("::1", 6379).unwrap().host(), "::1");
    }

    #[test]
    fn test_invalid_addresses() {
        for addr in ["", ":6379", "host:", "host:0", "host:99999", "host:port", "[::1", "[::1]x", "a b:1"] {
            assert!(
                matches!(
                    Endpoint::parse(addr, 6379),
                    Err(ConnectionError::InvalidAddress(_))
                ),
                "{:?} should be rejected",
                addr
            );
        }
    }

    #[test]
    fn test_resolve_literal() {
        let endpoint = Endpoint::parse("127.0.0.1:6390", 6379).unwrap();
        assert_eq!(
            endpoint.resolve().unwrap(),
            "127.0.0.1:6390".parse::<SocketAddr>().unwrap()
        );
    }
}
