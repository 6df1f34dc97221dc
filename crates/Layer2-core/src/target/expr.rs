//! Target expressions: addresses, CIDR blocks, ranges, hostnames

use super::TargetSpec;
use nexec_foundation::{Error, Result};
use std::net::{IpAddr, Ipv4Addr};

/// Largest block a single expression may expand to (a /16)
pub const MAX_EXPANSION: u64 = 65_536;

/// Expand one expression into concrete targets.
///
/// Accepts an IPv4/IPv6 address, an IPv4 CIDR block, an IPv4 range
/// (`10.0.0.1-20` or `10.0.0.1-10.0.0.20`), or a hostname. Single IPv4
/// addresses and hostnames may carry a `:port` suffix; IPv6 addresses take
/// one in brackets (`[::1]:445`).
pub fn parse_targets(expr: &str) -> Result<Vec<TargetSpec>> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(Vec::new());
    }

    if let Ok(ip) = expr.parse::<IpAddr>() {
        return Ok(vec![TargetSpec::new(ip.to_string())]);
    }

    if let Some(rest) = expr.strip_prefix('[') {
        let (addr, port) = rest
            .split_once("]:")
            .ok_or_else(|| Error::invalid_target(expr, "unterminated bracketed address"))?;
        let ip: IpAddr = addr
            .parse()
            .map_err(|_| Error::invalid_target(expr, "invalid bracketed address"))?;
        return Ok(vec![TargetSpec::new(ip.to_string()).with_port(parse_port(expr, port)?)]);
    }

    if let Some((network, prefix)) = expr.split_once('/') {
        return expand_cidr(expr, network, prefix);
    }

    if let Some((start, end)) = expr.split_once('-') {
        if let Ok(start) = start.parse::<Ipv4Addr>() {
            return expand_range(expr, start, end);
        }
    }

    if let Some((host, port)) = expr.rsplit_once(':') {
        let port = parse_port(expr, port)?;
        if host.contains(':') {
            return Err(Error::invalid_target(expr, "IPv6 addresses need brackets"));
        }
        return match parse_targets(host)?.as_slice() {
            [single] => Ok(vec![single.clone().with_port(port)]),
            _ => Err(Error::invalid_target(
                expr,
                "a port may only follow a single host",
            )),
        };
    }

    validate_hostname(expr)?;
    Ok(vec![TargetSpec::new(expr)])
}

fn parse_port(expr: &str, port: &str) -> Result<u16> {
    port.parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| Error::invalid_target(expr, format!("invalid port '{}'", port)))
}

fn expand_cidr(expr: &str, network: &str, prefix: &str) -> Result<Vec<TargetSpec>> {
    let network: Ipv4Addr = network
        .parse()
        .map_err(|_| Error::invalid_target(expr, "only IPv4 networks can be expanded"))?;
    let prefix = prefix
        .parse::<u32>()
        .ok()
        .filter(|p| *p <= 32)
        .ok_or_else(|| Error::invalid_target(expr, "invalid prefix length"))?;

    let size = 1u64 << (32 - prefix);
    if size > MAX_EXPANSION {
        return Err(Error::invalid_target(
            expr,
            format!("block of {} addresses exceeds the limit of {}", size, MAX_EXPANSION),
        ));
    }

    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    let base = u32::from(network) & mask;
    Ok((0..size)
        .map(|offset| TargetSpec::new(Ipv4Addr::from(base + offset as u32).to_string()))
        .collect())
}

fn expand_range(expr: &str, start: Ipv4Addr, end: &str) -> Result<Vec<TargetSpec>> {
    let end = match end.parse::<Ipv4Addr>() {
        Ok(end) => end,
        Err(_) => {
            let last: u8 = end
                .parse()
                .map_err(|_| Error::invalid_target(expr, "invalid range end"))?;
            let [a, b, c, _] = start.octets();
            Ipv4Addr::new(a, b, c, last)
        }
    };

    let (first, last) = (u32::from(start), u32::from(end));
    if first > last {
        return Err(Error::invalid_target(expr, "range end precedes its start"));
    }
    if u64::from(last - first) + 1 > MAX_EXPANSION {
        return Err(Error::invalid_target(expr, "range is too large"));
    }

    Ok((first..=last)
        .map(|ip| TargetSpec::new(Ipv4Addr::from(ip).to_string()))
        .collect())
}

fn validate_hostname(expr: &str) -> Result<()> {
    let valid = expr.len() <= 253
        && expr.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_target(expr, "not an address, range, or hostname"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(expr: &str) -> Vec<String> {
        parse_targets(expr)
            .unwrap()
            .into_iter()
            .map(|t| t.to_string())
            .collect()
    }

    #[test]
    fn test_single_addresses() {
        assert_eq!(hosts("10.0.0.1"), vec!["10.0.0.1"]);
        assert_eq!(hosts("::1"), vec!["::1"]);
        assert_eq!(hosts(" dc01.corp.local "), vec!["dc01.corp.local"]);
        assert!(hosts("").is_empty());
    }

    #[test]
    fn test_ports() {
        assert_eq!(hosts("10.0.0.1:445"), vec!["10.0.0.1:445"]);
        assert_eq!(hosts("dc01:5985"), vec!["dc01:5985"]);
        assert_eq!(hosts("[fe80::1]:22"), vec!["[fe80::1]:22"]);
        assert!(parse_targets("10.0.0.1:0").is_err());
        assert!(parse_targets("10.0.0.1:99999").is_err());
        assert!(parse_targets("10.0.0.0/30:80").is_err());
    }

    #[test]
    fn test_cidr() {
        assert_eq!(
            hosts("192.168.1.5/30"),
            vec!["192.168.1.4", "192.168.1.5", "192.168.1.6", "192.168.1.7"]
        );
        assert_eq!(hosts("10.1.1.1/32"), vec!["10.1.1.1"]);
        assert_eq!(parse_targets("10.0.0.0/16").unwrap().len(), 65_536);
        assert!(parse_targets("10.0.0.0/15").is_err());
        assert!(parse_targets("10.0.0.0/33").is_err());
        assert!(parse_targets("fe80::/64").is_err());
    }

    #[test]
    fn test_ranges() {
        assert_eq!(hosts("10.0.0.1-3"), vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        assert_eq!(hosts("10.0.0.255-10.0.1.0"), vec!["10.0.0.255", "10.0.1.0"]);
        assert!(parse_targets("10.0.0.9-2").is_err());
        assert!(parse_targets("10.0.0.1-300").is_err());
    }

    #[test]
    fn test_garbage() {
        assert!(parse_targets("not a host").is_err());
        assert!(parse_targets("a..b").is_err());
        assert!(parse_targets("[::1").is_err());
    }
}
