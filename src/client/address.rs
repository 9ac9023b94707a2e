//! Addresses of QRC Cores.

use std::{fmt, str::FromStr};

/// TCP port a Core listens on for QRC connections.
pub const DEFAULT_PORT: u16 = 1710;

/// Host and port of a Core.
///
/// Parsed from `HOST`, `HOST:PORT`, `[IPV6]` or `[IPV6]:PORT`. A bare IPv6
/// literal without brackets is accepted and uses [`DEFAULT_PORT`].
///
/// # Examples
///
/// ```
/// use qrc::client::CoreAddress;
///
/// let addr: CoreAddress = "core.local".parse().expect("valid address");
/// assert_eq!(addr.port(), 1710);
/// assert_eq!(addr.to_string(), "core.local:1710");
///
/// let v6: CoreAddress = "[::1]:9000".parse().expect("valid address");
/// assert_eq!(v6.host(), "::1");
/// assert_eq!(v6.to_string(), "[::1]:9000");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CoreAddress {
    host: String,
    port: u16,
}

/// Reasons a string is not a valid [`CoreAddress`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// No host was given.
    #[error("core address has no host")]
    MissingHost,
    /// The port is not a number in `1..=65535`.
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    /// An opening `[` has no matching `]`.
    #[error("unterminated IPv6 literal in {0:?}")]
    UnterminatedBracket(String),
}

impl CoreAddress {
    /// Address `host` on `port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP literal, without brackets.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// TCP port.
    #[must_use]
    pub fn port(&self) -> u16 { self.port }
}

fn parse_port(raw: &str) -> Result<u16, AddressError> {
    match raw.parse::<u16>() {
        Ok(0) | Err(_) => Err(AddressError::InvalidPort(raw.to_owned())),
        Ok(port) => Ok(port),
    }
}

impl FromStr for CoreAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| AddressError::UnterminatedBracket(s.to_owned()))?;
            if host.is_empty() {
                return Err(AddressError::MissingHost);
            }
            let port = match tail {
                "" => DEFAULT_PORT,
                _ => match tail.strip_prefix(':') {
                    Some(port) => parse_port(port)?,
                    None => return Err(AddressError::InvalidPort(tail.to_owned())),
                },
            };
            return Ok(Self::new(host, port));
        }

        let (host, port) = match s.matches(':').count() {
            0 => (s, DEFAULT_PORT),
            1 => {
                let (host, port) = s.split_once(':').unwrap_or((s, ""));
                (host, parse_port(port)?)
            }
            _ => (s, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(AddressError::MissingHost);
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for CoreAddress {
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
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("core.local", "core.local", 1710)]
    #[case("10.0.0.5:1702", "10.0.0.5", 1702)]
    #[case("  core.local:9000 ", "core.local", 9000)]
    #[case("[fe80::1]", "fe80::1", 1710)]
    #[case("[fe80::1]:1711", "fe80::1", 1711)]
    #[case("fe80::1", "fe80::1", 1710)]
    fn parses_valid_addresses(#[case] input: &str, #[case] host: &str, #[case] port: u16) {
        let addr: CoreAddress = input.parse().expect("valid address");
        assert_eq!(addr.host(), host);
        assert_eq!(addr.port(), port);
    }

    #[rstest]
    #[case("", AddressError::MissingHost)]
    #[case(":1710", AddressError::MissingHost)]
    #[case("[]:1710", AddressError::MissingHost)]
    #[case("core:0", AddressError::InvalidPort("0".into()))]
    #[case("core:http", AddressError::InvalidPort("http".into()))]
    #[case("core:70000", AddressError::InvalidPort("70000".into()))]
    #[case("[::1", AddressError::UnterminatedBracket("[::1".into()))]
    #[case("[::1]x", AddressError::InvalidPort("x".into()))]
    fn rejects_invalid_addresses(#[case] input: &str, #[case] expected: AddressError) {
        assert_eq!(input.parse::<CoreAddress>(), Err(expected));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for input in ["core.local:1710", "[::1]:1702"] {
            let addr: CoreAddress = input.parse().expect("valid address");
            assert_eq!(addr.to_string(), input);
        }
    }
}
