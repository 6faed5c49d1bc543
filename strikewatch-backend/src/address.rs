/// Parsing of user-supplied server addresses
use std::fmt;

use crate::error::StatusError;

/// Default Source engine query port.
pub const DEFAULT_PORT: u16 = 27015;

/// Scheme prefixes users paste from server browsers and configs.
const SCHEMES: &[&str] = &["udp://", "tcp://", "steam://connect/"];

/// A validated host/port pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    /// Cache key for this address ("host:port").
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parses `host`, `host:port`, `[host]` or `[host]:port`, optionally prefixed
/// with a scheme such as `udp://`.
///
/// Rules:
/// - Port defaults to 27015 when omitted
/// - Port must be numeric and within 1..=65535
/// - More than one colon is only allowed inside brackets
pub fn parse_address(input: &str) -> Result<ServerAddress, StatusError> {
    let trimmed = input.trim();
    let rest = SCHEMES
        .iter()
        .find_map(|scheme| trimmed.strip_prefix(scheme))
        .unwrap_or(trimmed);

    if rest.is_empty() {
        return Err(StatusError::invalid_address(input, "empty address"));
    }

    let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
        let Some(close) = bracketed.find(']') else {
            return Err(StatusError::invalid_address(input, "missing closing `]`"));
        };
        let host = &bracketed[..close];
        let port = match &bracketed[close + 1..] {
            "" => None,
            tail => match tail.strip_prefix(':') {
                Some(port) => Some(port),
                None => {
                    return Err(StatusError::invalid_address(
                        input,
                        "unexpected text after `]`",
                    ));
                }
            },
        };
        (host, port)
    } else {
        match rest.matches(':').count() {
            0 => (rest, None),
            1 => match rest.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            },
            _ => {
                return Err(StatusError::invalid_address(
                    input,
                    "too many colons (wrap IPv6 hosts in brackets)",
                ));
            }
        }
    };

    if host.is_empty() {
        return Err(StatusError::invalid_address(input, "missing host"));
    }

    let port = match port {
        None => DEFAULT_PORT,
        Some(port) => parse_port(input, port)?,
    };

    Ok(ServerAddress {
        host: host.to_string(),
        port,
    })
}

fn parse_port(input: &str, port: &str) -> Result<u16, StatusError> {
    if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
        return Err(StatusError::invalid_address(input, "port is not a number"));
    }

    match port.parse::<u32>() {
        Ok(value @ 1..=65535) => Ok(value as u16),
        _ => Err(StatusError::invalid_address(
            input,
            "port must be between 1 and 65535",
        )),
    }
}
