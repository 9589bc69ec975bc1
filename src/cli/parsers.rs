//! Shared CLI argument parsers.

use std::time::Duration;
use vmc::network::NetType;

/// Parse a duration string (e.g., "3s", "500ms", "1m").
pub fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

/// Parse a dotted-quad IPv4 address.
pub fn parse_ip(s: &str) -> Result<String, String> {
    if vmc::ip::validate_ipv4(s) {
        Ok(s.to_string())
    } else {
        Err(format!("'{}' is not a valid IP", s))
    }
}

/// Parse a network type (`ho`/`hostonly` or `bri`/`bridged`).
pub fn parse_net_type(s: &str) -> Result<NetType, String> {
    s.parse().map_err(|e: vmc::Error| e.to_string())
}

/// Parse a positive integer (CPU count, memory size).
pub fn parse_positive(s: &str) -> Result<u32, String> {
    match s.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("'{}' is not a positive integer", s)),
    }
}
