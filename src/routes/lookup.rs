// Longest prefix selection over the routes a table query returned

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Pick the candidate whose destination covers `dest` with the longest prefix.
///
/// On equal prefix lengths the earlier candidate wins, which keeps the kernel's
/// own ordering (metric) for otherwise identical routes.
pub fn longest_prefix<'a, T, F>(candidates: &'a [T], dest: IpAddr, destination_of: F) -> Option<&'a T>
where
    F: Fn(&T) -> &str,
{
    let mut best_match: Option<(&T, u8)> = None;

    for candidate in candidates {
        if let Some(prefix_len) = matches_cidr(destination_of(candidate), dest) {
            match best_match {
                None => best_match = Some((candidate, prefix_len)),
                Some((_, current_len)) if prefix_len > current_len => {
                    best_match = Some((candidate, prefix_len));
                }
                _ => {}
            }
        }
    }

    best_match.map(|(candidate, _)| candidate)
}

/// Check if an IP matches a CIDR and return the prefix length if it does
pub fn matches_cidr(cidr: &str, ip: IpAddr) -> Option<u8> {
    if cidr == "default" {
        return Some(0);
    }

    let (network, prefix) = match cidr.split_once('/') {
        Some((network, prefix)) => (network, Some(prefix)),
        None => (cidr, None),
    };

    let network_ip: IpAddr = network.parse().ok()?;
    let prefix_len: u8 = match prefix {
        Some(len) => len.parse().ok()?,
        // Host routes carry no prefix length
        None => match network_ip {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        },
    };

    let covered = match (network_ip, ip) {
        (IpAddr::V4(net), IpAddr::V4(addr)) => ip_v4_matches(net, addr, prefix_len),
        (IpAddr::V6(net), IpAddr::V6(addr)) => ip_v6_matches(net, addr, prefix_len),
        _ => false,
    };
    covered.then_some(prefix_len)
}

fn ip_v4_matches(network: Ipv4Addr, addr: Ipv4Addr, prefix_len: u8) -> bool {
    if prefix_len == 0 {
        return true;
    }
    if prefix_len > 32 {
        return false;
    }

    let mask = u32::MAX << (32 - u32::from(prefix_len));
    (u32::from(network) & mask) == (u32::from(addr) & mask)
}

fn ip_v6_matches(network: Ipv6Addr, addr: Ipv6Addr, prefix_len: u8) -> bool {
    if prefix_len == 0 {
        return true;
    }
    if prefix_len > 128 {
        return false;
    }

    let mask = u128::MAX << (128 - u32::from(prefix_len));
    (u128::from(network) & mask) == (u128::from(addr) & mask)
}
