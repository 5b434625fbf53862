//! Port list parsing

use crate::{ScanError, ScanResult};
use std::collections::HashSet;

/// Largest number of ports one specification may expand to
pub const MAX_PORTS: usize = 65_535;

fn parse_port(text: &str, spec: &str) -> ScanResult<u16> {
    let port: u16 = text
        .trim()
        .parse()
        .map_err(|e| ScanError::PortRangeError(format!("Invalid port '{}' in '{}': {}", text, spec, e)))?;
    if port == 0 {
        return Err(ScanError::PortRangeError("Port 0 is not valid".to_string()));
    }
    Ok(port)
}

/// Parse `22,80-90,443` style port lists.
///
/// Ranges are inclusive. Duplicates are dropped, first occurrence wins.
pub fn parse_ports(port_spec: &str) -> ScanResult<Vec<u16>> {
    let mut ports = Vec::new();
    let mut seen = HashSet::new();

    for part in port_spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(ScanError::PortRangeError(format!("Empty entry in '{}'", port_spec)));
        }

        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (parse_port(start, part)?, parse_port(end, part)?),
            None => {
                let port = parse_port(part, part)?;
                (port, port)
            }
        };
        if start > end {
            return Err(ScanError::PortRangeError(format!(
                "Start port {} cannot be greater than end port {}",
                start, end
            )));
        }

        ports.extend((start..=end).filter(|port| seen.insert(*port)));
    }

    debug_assert!(ports.len() <= MAX_PORTS);
    Ok(ports)
}
