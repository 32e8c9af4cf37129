// BSD-family (macOS, FreeBSD, OpenBSD, NetBSD) route, interface and neighbor queries

use super::{command, AddressFamily, InterfaceRecord, Neighbor, NextHop, RouteQuery, RouteRecord};
use crate::error::{AppError, AppResult};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv6Addr};

const ROUTE_PATH: &str = "/sbin/route";
const IFCONFIG_PATH: &str = "/sbin/ifconfig";
const ARP_PATH: &str = "/usr/sbin/arp";
const NDP_PATH: &str = "/usr/sbin/ndp";

/// `RouteQuery` backed by `route get`, `ifconfig`, `arp` and `ndp`
#[derive(Debug, Default, Clone, Copy)]
pub struct BsdQuery;

impl RouteQuery for BsdQuery {
    async fn route(&self, address: IpAddr) -> AppResult<RouteRecord> {
        let family = AddressFamily::of(address);
        let target = address.to_string();
        let mut args = vec!["-n", "get"];
        if family == AddressFamily::V6 {
            args.push("-inet6");
        }
        args.push(&target);

        let output = command::capture(ROUTE_PATH, &args).await?;
        if !output.success() {
            if is_not_in_table(&output.stderr) || is_not_in_table(&output.stdout) {
                return Err(AppError::RouteNotFound(address));
            }
            return Err(AppError::CommandExecution(format!(
                "{} {}: {}",
                ROUTE_PATH,
                args.join(" "),
                output.stderr.trim()
            )));
        }

        let record = parse_route_get(&output.stdout, family).ok_or(AppError::RouteNotFound(address))?;
        if !is_loopback(&record.interface) {
            return Ok(record);
        }

        // Own addresses route through the loopback; report the interface holding them
        let output = command::capture(IFCONFIG_PATH, &["-a"]).await?;
        if !output.success() {
            return Err(AppError::CommandExecution(format!(
                "{} -a: {}",
                IFCONFIG_PATH,
                output.stderr.trim()
            )));
        }
        Ok(claim_local_route(record, address, &output.stdout))
    }

    async fn interface(&self, interface: &str, family: AddressFamily) -> AppResult<InterfaceRecord> {
        let output = command::capture(IFCONFIG_PATH, &[interface]).await?;
        if !output.success() {
            return Err(AppError::CommandExecution(format!(
                "{} {}: {}",
                IFCONFIG_PATH,
                interface,
                output.stderr.trim()
            )));
        }
        Ok(parse_ifconfig(&output.stdout, family))
    }

    async fn neighbor(&self, hop: IpAddr, interface: &str) -> AppResult<Neighbor> {
        let (program, target) = match hop {
            IpAddr::V4(v4) => (ARP_PATH, v4.to_string()),
            // Link-local hops are ambiguous without their scope
            IpAddr::V6(v6) if v6.is_unicast_link_local() => (NDP_PATH, format!("{}%{}", v6, interface)),
            IpAddr::V6(v6) => (NDP_PATH, v6.to_string()),
        };

        let output = command::capture(program, &["-n", &target]).await?;
        if !output.success() {
            tracing::debug!("{} found no entry for {}", program, target);
            return Ok(Neighbor::Empty);
        }

        Ok(match hop {
            IpAddr::V4(_) => parse_arp(&output.stdout),
            IpAddr::V6(_) => parse_ndp(&output.stdout),
        })
    }
}

fn is_not_in_table(message: &str) -> bool {
    message.contains("not in table") || message.contains("has not been found")
}

/// Drop a `%zone` suffix from an address
fn strip_zone(addr: &str) -> &str {
    addr.split('%').next().unwrap_or(addr)
}

/// Parse `route -n get` output into a record; `None` when no interface is reported
fn parse_route_get(output: &str, family: AddressFamily) -> Option<RouteRecord> {
    let fields: HashMap<&str, &str> = output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect();

    let interface = fields.get("interface")?.to_string();

    let destination = match fields.get("destination").copied() {
        Some("default") | None => match family {
            AddressFamily::V4 => "0.0.0.0",
            AddressFamily::V6 => "::",
        },
        Some(dest) => strip_zone(dest),
    };

    let (network, mask) = match family {
        AddressFamily::V4 => {
            let mask = fields.get("mask").map(|m| match *m {
                "default" => "0.0.0.0".to_string(),
                m => m.to_string(),
            });
            (destination.to_string(), mask)
        }
        // IPv6 masks are folded into the destination as a prefix length
        AddressFamily::V6 => {
            let network = match fields.get("mask").copied().and_then(v6_prefix_len) {
                Some(len) => format!("{}/{}", destination, len),
                None => destination.to_string(),
            };
            (network, None)
        }
    };

    // `link#N` and hardware addresses mean the destination is on-link
    let gateway = fields
        .get("gateway")
        .and_then(|gw| strip_zone(gw).parse().ok())
        .map_or(NextHop::Direct, NextHop::Gateway);

    Some(RouteRecord {
        interface,
        network,
        mask,
        gateway,
    })
}

fn is_loopback(interface: &str) -> bool {
    interface
        .strip_prefix("lo")
        .is_some_and(|unit| !unit.is_empty() && unit.chars().all(|c| c.is_ascii_digit()))
}

/// Name of the interface in `ifconfig -a` output that carries `address`
fn find_owner(output: &str, address: IpAddr) -> Option<String> {
    let mut current = None;
    for line in output.lines().filter(|line| !line.trim().is_empty()) {
        if !line.starts_with(char::is_whitespace) {
            current = line.split_once(':').map(|(name, _)| name.to_string());
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if let [kind, addr, ..] = parts.as_slice() {
            if matches!(*kind, "inet" | "inet6")
                && strip_zone(addr.split('/').next().unwrap_or_default()).parse::<IpAddr>().ok() == Some(address)
            {
                return current;
            }
        }
    }
    None
}

/// Move a loopback route for one of our own addresses onto the interface that owns it
fn claim_local_route(record: RouteRecord, address: IpAddr, ifconfig_all: &str) -> RouteRecord {
    match find_owner(ifconfig_all, address) {
        Some(owner) => {
            tracing::debug!("{} is local to {}, not {}", address, owner, record.interface);
            RouteRecord {
                interface: owner,
                gateway: NextHop::Direct,
                ..record
            }
        }
        None => record,
    }
}

fn v6_prefix_len(mask: &str) -> Option<u32> {
    if mask == "default" {
        return Some(0);
    }
    let mask: Ipv6Addr = mask.parse().ok()?;
    Some(u128::from(mask).leading_ones())
}

/// Parse `ifconfig <if>` output for the link address and first address of `family`
fn parse_ifconfig(output: &str, family: AddressFamily) -> InterfaceRecord {
    let keyword = match family {
        AddressFamily::V4 => "inet",
        AddressFamily::V6 => "inet6",
    };
    let mut record = InterfaceRecord::default();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            // macOS/FreeBSD say `ether`, OpenBSD `lladdr`, NetBSD `address:`
            [kind, lladdr, ..]
                if matches!(*kind, "ether" | "lladdr" | "address:") && record.link_address.is_none() =>
            {
                record.link_address = Some(lladdr.to_string());
            }
            [kind, addr, ..] if *kind == keyword && record.address.is_none() => {
                let addr = strip_zone(addr.split('/').next().unwrap_or_default());
                record.address = addr.parse().ok();
            }
            _ => {}
        }
    }

    record
}

/// Link address from the token following `at`, unless it is a placeholder like `(incomplete)`
fn parse_arp(output: &str) -> Neighbor {
    let lladdr = output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        parts.find(|p| *p == "at")?;
        parts.next().filter(|lladdr| !lladdr.starts_with('('))
    });
    Neighbor::from_lladdr(lladdr)
}

fn parse_ndp(output: &str) -> Neighbor {
    let lladdr = output
        .lines()
        .filter(|line| !line.starts_with("Neighbor"))
        .find_map(|line| line.split_whitespace().nth(1))
        .filter(|lladdr| !lladdr.starts_with('('));
    Neighbor::from_lladdr(lladdr)
}
