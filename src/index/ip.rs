//! IP address parsing, canonical encoding and range syntax

use crate::error::{IndexError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

static IPV4_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").expect("valid IPv4 pattern")
});

fn invalid(value: &str) -> IndexError {
    IndexError::InvalidArgument(format!("Invalid IP address: {}", value))
}

/// Parse a literal IPv4 or IPv6 address. Hostnames are rejected so no
/// lookup is ever attempted; IPv4-mapped IPv6 addresses become IPv4.
pub fn parse_address(value: &str) -> Result<IpAddr> {
    if value.contains(':') {
        let literal = value
            .strip_prefix('[')
            .and_then(|v| v.strip_suffix(']'))
            .unwrap_or(value);
        let addr: Ipv6Addr = literal.parse().map_err(|_| invalid(value))?;
        return Ok(match addr.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(addr),
        });
    }

    let captures = IPV4_PATTERN.captures(value).ok_or_else(|| invalid(value))?;
    let mut octets = [0u8; 4];
    for (i, octet) in octets.iter_mut().enumerate() {
        let parsed: u32 = captures[i + 1].parse().map_err(|_| invalid(value))?;
        *octet = u8::try_from(parsed).map_err(|_| invalid(value))?;
    }
    Ok(IpAddr::V4(Ipv4Addr::from(octets)))
}

/// Fixed-width form whose lexical order is the numeric order:
/// `192.168.001.002` and `fe80:0000:...:0001`.
pub fn canonical_ip_address(addr: &IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => v4
            .octets()
            .iter()
            .map(|o| format!("{:03}", o))
            .collect::<Vec<_>>()
            .join("."),
        IpAddr::V6(v6) => v6
            .octets()
            .chunks(2)
            .map(|pair| format!("{:02x}{:02x}", pair[0], pair[1]))
            .collect::<Vec<_>>()
            .join(":"),
    }
}

/// Uncompressed host form used for token indexing: IPv6 segments without
/// leading zeros and no `::` shorthand.
pub fn host_address(addr: &IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => v6
            .segments()
            .iter()
            .map(|s| format!("{:x}", s))
            .collect::<Vec<_>>()
            .join(":"),
    }
}

pub fn is_ipv6(addr: &IpAddr) -> bool {
    matches!(addr, IpAddr::V6(_))
}

fn octets(addr: &IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

fn from_octets(bytes: &[u8]) -> Result<IpAddr> {
    if let Ok(v4) = <[u8; 4]>::try_from(bytes) {
        return Ok(IpAddr::V4(Ipv4Addr::from(v4)));
    }
    if let Ok(v6) = <[u8; 16]>::try_from(bytes) {
        return Ok(IpAddr::V6(Ipv6Addr::from(v6)));
    }
    Err(IndexError::Internal(format!(
        "unexpected address length {}",
        bytes.len()
    )))
}

/// Number of leading one bits of a contiguous netmask
pub fn netmask_to_prefix_bits(netmask: &IpAddr) -> Result<u32> {
    let mut prefix_bits = 0;
    let mut found_zero = false;
    for byte in octets(netmask) {
        for bit in (0..8).rev() {
            if byte & (1 << bit) != 0 {
                if found_zero {
                    return Err(IndexError::InvalidArgument(format!(
                        "Invalid netmask: {}",
                        netmask
                    )));
                }
                prefix_bits += 1;
            } else {
                found_zero = true;
            }
        }
    }
    Ok(prefix_bits)
}

pub fn prefix_bits_to_netmask(prefix_bits: i32, ipv6: bool) -> Result<IpAddr> {
    let width = if ipv6 { 128 } else { 32 };
    if prefix_bits < 0 || prefix_bits > width {
        return Err(IndexError::InvalidArgument(format!(
            "Invalid prefix bits: {}",
            prefix_bits
        )));
    }
    let mut bytes = vec![0u8; (width / 8) as usize];
    for i in 0..prefix_bits as usize {
        bytes[i / 8] |= 1 << (7 - (i % 8));
    }
    from_octets(&bytes)
}

/// Inclusive address range of a single family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IpRange {
    pub from: IpAddr,
    pub to: IpAddr,
}

impl IpRange {
    pub fn new(from: IpAddr, to: IpAddr) -> Result<Self> {
        if is_ipv6(&from) != is_ipv6(&to) {
            return Err(IndexError::InvalidArgument(format!(
                "Mixed address families in range: {} - {}",
                from, to
            )));
        }
        if from > to {
            return Err(IndexError::InvalidArgument(format!(
                "Invalid IP range: {} - {}",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    pub fn single(addr: IpAddr) -> Self {
        Self {
            from: addr,
            to: addr,
        }
    }

    pub fn is_single(&self) -> bool {
        self.from == self.to
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        is_ipv6(addr) == is_ipv6(&self.from) && *addr >= self.from && *addr <= self.to
    }
}

/// Parse `ADDR`, `ADDR/MASK`, `ADDR/PREFIX`, `START-END` or `START-LAST`,
/// where LAST is the final byte (IPv4) or final two hex bytes (IPv6).
pub fn parse_range(value: &str) -> Result<IpRange> {
    if let Some(slash) = value.find('/').filter(|idx| *idx > 0) {
        let addr = parse_address(&value[..slash])?;
        let mask_part = &value[slash + 1..];
        let mask = match parse_address(mask_part) {
            Ok(mask) => mask,
            Err(_) => {
                let bits: i32 = mask_part.parse().map_err(|_| {
                    IndexError::InvalidArgument(format!("Invalid IP range: {}", value))
                })?;
                prefix_bits_to_netmask(bits, is_ipv6(&addr))?
            }
        };
        if is_ipv6(&addr) != is_ipv6(&mask) {
            return Err(IndexError::InvalidArgument(format!(
                "Invalid IP range: {}",
                value
            )));
        }
        let addr_bytes = octets(&addr);
        let mask_bytes = octets(&mask);
        let first: Vec<u8> = addr_bytes
            .iter()
            .zip(&mask_bytes)
            .map(|(a, m)| a & m)
            .collect();
        let last: Vec<u8> = addr_bytes
            .iter()
            .zip(&mask_bytes)
            .map(|(a, m)| a | !m)
            .collect();
        return IpRange::new(from_octets(&first)?, from_octets(&last)?);
    }

    if let Some(dash) = value.find('-').filter(|idx| *idx > 0) {
        let from = parse_address(&value[..dash])?;
        let end = &value[dash + 1..];
        let to = match parse_address(end) {
            Ok(to) => to,
            Err(err) => {
                let mut bytes = octets(&from);
                if is_ipv6(&from) {
                    let last = u16::from_str_radix(end, 16).map_err(|_| err)?;
                    bytes[14..].copy_from_slice(&last.to_be_bytes());
                } else {
                    let last: u8 = end.parse().map_err(|_| err)?;
                    bytes[3] = last;
                }
                from_octets(&bytes)?
            }
        };
        return IpRange::new(from, to);
    }

    Ok(IpRange::single(parse_address(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(value: &str) -> IpAddr {
        value.parse().unwrap()
    }

    #[test]
    fn test_parse_address() {
        for valid in [
            "192.168.1.2",
            "0.0.0.0",
            "255.255.255.0",
            "::1",
            "fe80::d69a:20ff:febe:2e22",
        ] {
            assert_eq!(parse_address(valid).unwrap(), ip(valid));
        }
        assert_eq!(parse_address("[::1]").unwrap(), ip("::1"));
        assert_eq!(parse_address("192.168.001.002").unwrap(), ip("192.168.1.2"));
        assert_eq!(parse_address("::ffff:10.0.0.1").unwrap(), ip("10.0.0.1"));

        for invalid in ["192.168.1.256", "192.168.-1.5", "www.example.com", "ge80::"] {
            assert!(parse_address(invalid).is_err(), "{} should fail", invalid);
        }
    }

    #[test]
    fn test_canonical_ip_address() {
        let expected = [
            ("000.000.000.000", "0.0.0.0"),
            ("192.168.001.002", "192.168.1.2"),
            ("0000:0000:0000:0000:0000:0000:0000:0001", "::1"),
            ("fe80:0000:0000:0000:0000:0000:0000:0001", "fe80::1"),
            (
                "fd00:6587:52d7:0047:d69a:20ff:febe:2e22",
                "fd00:6587:52d7:47:d69a:20ff:febe:2e22",
            ),
        ];
        for (canonical, addr) in expected {
            assert_eq!(canonical_ip_address(&ip(addr)), canonical);
        }
    }

    #[test]
    fn test_canonical_order_matches_numeric_order() {
        let mut addrs = vec!["192.168.1.10", "192.168.1.2", "192.168.1.20"];
        addrs.sort_by_key(|a| canonical_ip_address(&ip(a)));
        assert_eq!(addrs, vec!["192.168.1.2", "192.168.1.10", "192.168.1.20"]);
    }

    #[test]
    fn test_host_address() {
        assert_eq!(host_address(&ip("fe80::1")), "fe80:0:0:0:0:0:0:1");
        assert_eq!(host_address(&ip("10.0.0.1")), "10.0.0.1");
    }

    #[test]
    fn test_prefix_bits_to_netmask() {
        assert_eq!(prefix_bits_to_netmask(24, false).unwrap(), ip("255.255.255.0"));
        assert_eq!(prefix_bits_to_netmask(32, false).unwrap(), ip("255.255.255.255"));
        assert_eq!(prefix_bits_to_netmask(1, false).unwrap(), ip("128.0.0.0"));
        assert_eq!(prefix_bits_to_netmask(0, false).unwrap(), ip("0.0.0.0"));
        assert_eq!(prefix_bits_to_netmask(0, true).unwrap(), ip("::"));
        assert_eq!(
            prefix_bits_to_netmask(64, true).unwrap(),
            ip("ffff:ffff:ffff:ffff::")
        );
        assert_eq!(
            prefix_bits_to_netmask(128, true).unwrap(),
            ip("ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff")
        );
        assert!(prefix_bits_to_netmask(-1, false).is_err());
        assert!(prefix_bits_to_netmask(33, false).is_err());
        assert!(prefix_bits_to_netmask(129, true).is_err());
    }

    #[test]
    fn test_netmask_to_prefix_bits() {
        let expected = [
            ("255.255.255.255", 32),
            ("255.255.255.0", 24),
            ("128.0.0.0", 1),
            ("0.0.0.0", 0),
            ("::", 0),
            ("ffff:ffff:ffff:ffff::", 64),
            ("ffff:ffff::", 32),
            ("ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff", 128),
        ];
        for (mask, bits) in expected {
            assert_eq!(netmask_to_prefix_bits(&ip(mask)).unwrap(), bits);
        }
        assert!(netmask_to_prefix_bits(&ip("255.255.0.1")).is_err());
        assert!(netmask_to_prefix_bits(&ip("ffff::1")).is_err());
    }

    #[test]
    fn test_parse_range() {
        let expected = [
            ("192.168.1.1-15", "192.168.1.1", "192.168.1.15"),
            ("192.168.1.1/24", "192.168.1.0", "192.168.1.255"),
            ("192.168.0.100/28", "192.168.0.96", "192.168.0.111"),
            ("192.168.1.1/255.255.255.0", "192.168.1.0", "192.168.1.255"),
            ("192.168.1.1-192.168.1.5", "192.168.1.1", "192.168.1.5"),
            ("192.168.1.1", "192.168.1.1", "192.168.1.1"),
            ("::1-::feed", "::1", "::feed"),
            ("::1-ffff", "::1", "::ffff"),
            (
                "fe80::d69a:20ff:febe:2e22/64",
                "fe80::",
                "fe80::ffff:ffff:ffff:ffff",
            ),
        ];
        for (range, from, to) in expected {
            let parsed = parse_range(range).unwrap();
            assert_eq!(parsed, IpRange::new(ip(from), ip(to)).unwrap(), "{}", range);
        }

        for invalid in ["192.168.1.2-192.168.1.1", "::2-::1", "192.168.1.2-fe80::"] {
            assert!(parse_range(invalid).is_err(), "{} should fail", invalid);
        }
    }

    #[test]
    fn test_range_contains() {
        let range = IpRange::new(ip("192.168.1.99"), ip("192.168.1.150")).unwrap();
        assert!(range.contains(&ip("192.168.1.99")));
        assert!(range.contains(&ip("192.168.1.120")));
        assert!(range.contains(&ip("192.168.1.150")));
        assert!(!range.contains(&ip("192.168.1.98")));
        assert!(!range.contains(&ip("192.168.1.151")));
        assert!(!range.contains(&ip("::1")));
    }
}
