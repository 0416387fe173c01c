//! Network operators (@ipMatch, @ipMatchFromFile).

use super::{CompileContext, CustomOperator};
use crate::error::{Error, Result};
use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use std::net::IpAddr;

/// `@ipMatch`: comma or space separated addresses and CIDR blocks.
pub fn ip_match(list: &str) -> Result<CustomOperator> {
    let networks = list
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(parse_network)
        .collect::<Result<Vec<_>>>()?;
    Ok(matcher("ipMatch", networks))
}

/// `@ipMatchFromFile`: one address or block per line, `#` comments.
pub(crate) fn ip_match_from_files(arg: &str, ctx: &CompileContext<'_>) -> Result<CustomOperator> {
    let mut networks = Vec::new();
    for file in arg.split_whitespace() {
        let path = ctx.resolve(file);
        let content = std::fs::read_to_string(&path)
            .map_err(|source| Error::RuleFileLoad { path, source })?;
        for line in content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
        {
            networks.push(parse_network(line)?);
        }
    }
    Ok(matcher("ipMatchFromFile", networks))
}

fn matcher(name: &str, networks: Vec<IpNetwork>) -> CustomOperator {
    CustomOperator::new(name, move |input: &str| {
        let ip = input.trim().parse::<IpAddr>().ok()?;
        networks
            .iter()
            .any(|net| net.contains(ip))
            .then(|| input.to_string())
    })
}

fn parse_network(s: &str) -> Result<IpNetwork> {
    let invalid = |message: String| Error::InvalidIp {
        value: s.to_string(),
        message,
    };

    if s.contains('/') {
        return s.parse::<IpNetwork>().map_err(|e| invalid(e.to_string()));
    }

    // Bare address: host-sized block.
    let ip = s.parse::<IpAddr>().map_err(|e| invalid(e.to_string()))?;
    let net = match ip {
        IpAddr::V4(v4) => Ipv4Network::new(v4, 32).map(IpNetwork::V4),
        IpAddr::V6(v6) => Ipv6Network::new(v6, 128).map(IpNetwork::V6),
    };
    net.map_err(|e| invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::MatchLimits;
    use crate::registry::Registry;

    #[test]
    fn test_ip_match_single() {
        let op = ip_match("192.168.1.1").unwrap();
        assert!(op.execute("192.168.1.1").matched);
        assert!(!op.execute("192.168.1.2").matched);
    }

    #[test]
    fn test_ip_match_cidr_and_v6() {
        let op = ip_match("10.0.0.0/8, 192.168.0.0/16 ::1").unwrap();
        assert!(op.execute("10.1.2.3").matched);
        assert!(op.execute("192.168.1.1").matched);
        assert!(op.execute("::1").matched);
        assert!(!op.execute("172.16.0.1").matched);
        assert!(!op.execute("not-an-ip").matched);
    }

    #[test]
    fn test_ip_match_invalid() {
        let err = ip_match("10.0.0.0/40").unwrap_err();
        assert!(matches!(err, Error::InvalidIp { .. }));
        assert!(ip_match("300.1.1.1").is_err());
    }

    #[test]
    fn test_ip_match_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("block.txt"), "# internal\n10.0.0.0/8\n\n203.0.113.7\n")
            .unwrap();
        let registry = Registry::default();
        let ctx = CompileContext {
            registry: &registry,
            limits: MatchLimits::default(),
            base_dir: Some(dir.path()),
        };
        let op = ip_match_from_files("block.txt", &ctx).unwrap();
        assert!(op.execute("10.9.9.9").matched);
        assert!(op.execute("203.0.113.7").matched);
        assert!(!op.execute("203.0.113.8").matched);
    }
}
