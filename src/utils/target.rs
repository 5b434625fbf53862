//! Target resolution

use crate::{ScanError, ScanResult};
use std::net::IpAddr;

/// Resolve `target` to its addresses, in resolver order without duplicates.
///
/// Literal addresses are returned as-is without touching the resolver.
pub async fn resolve_target(target: &str) -> ScanResult<Vec<IpAddr>> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ScanError::InvalidTarget("Target cannot be empty".to_string()));
    }
    if let Ok(addr) = target.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        return Ok(vec![addr]);
    }

    let resolved = tokio::net::lookup_host((target, 0))
        .await
        .map_err(|e| ScanError::InvalidTarget(format!("{}: {}", target, e)))?;

    let mut addresses: Vec<IpAddr> = Vec::new();
    for addr in resolved {
        if !addresses.contains(&addr.ip()) {
            addresses.push(addr.ip());
        }
    }
    if addresses.is_empty() {
        return Err(ScanError::InvalidTarget(format!("{} has no addresses", target)));
    }
    log::debug!("{} resolved to {:?}", target, addresses);
    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_literal_addresses() {
        assert_eq!(
            resolve_target("192.0.2.7").await.unwrap(),
            vec!["192.0.2.7".parse::<IpAddr>().unwrap()]
        );
        assert_eq!(
            resolve_target("[2001:db8::7]").await.unwrap(),
            vec!["2001:db8::7".parse::<IpAddr>().unwrap()]
        );
    }

    #[tokio::test]
    async fn test_empty_target() {
        assert!(matches!(resolve_target("  ").await, Err(ScanError::InvalidTarget(_))));
    }

    #[tokio::test]
    async fn test_localhost_resolves_to_loopback() {
        let addresses = resolve_target("localhost").await.unwrap();
        assert!(addresses.iter().all(|a| a.is_loopback()));
    }
}
