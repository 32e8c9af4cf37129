// Linux route, address and neighbor queries through iproute2
//
// Every query asks for `ip -json` output first and falls back to the plain
// text form when the installed iproute2 does not understand `-json`.

use super::lookup::longest_prefix;
use super::{command, AddressFamily, InterfaceRecord, Neighbor, NextHop, RouteQuery, RouteRecord};
use crate::error::{AppError, AppResult};
use std::net::IpAddr;

const IP_PATH: &str = "ip";

/// Route types that never deliver traffic to a next hop
const DEAD_END_TYPES: &[&str] = &["unreachable", "blackhole", "prohibit", "throw"];

/// Route types that may prefix the destination in text output
const ROUTE_TYPES: &[&str] = &[
    "unicast",
    "local",
    "broadcast",
    "multicast",
    "anycast",
    "nat",
    "unreachable",
    "blackhole",
    "prohibit",
    "throw",
];

/// `RouteQuery` backed by the `ip` command
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxQuery;

/// A single entry of `ip route show match`
#[derive(Debug, Clone, PartialEq)]
struct LinuxRoute {
    kind: String,
    destination: String,
    gateway: Option<IpAddr>,
    interface: Option<String>,
}

impl LinuxRoute {
    fn new(destination: String) -> Self {
        LinuxRoute {
            kind: "unicast".to_string(),
            destination,
            gateway: None,
            interface: None,
        }
    }
}

enum IpOutput {
    Json(serde_json::Value),
    Text(String),
}

impl RouteQuery for LinuxQuery {
    async fn route(&self, address: IpAddr) -> AppResult<RouteRecord> {
        let family = AddressFamily::of(address);
        let target = address.to_string();
        let routes = match run_ip(Some(family), &["route", "show", "match", &target]).await? {
            IpOutput::Json(json) => parse_route_json(&json, family)?,
            IpOutput::Text(text) => parse_route_text(&text, family),
        };
        select_route(&routes, address)
    }

    async fn interface(&self, interface: &str, family: AddressFamily) -> AppResult<InterfaceRecord> {
        // A family flag would hide the link line, so addresses are filtered while parsing
        match run_ip(None, &["addr", "show", "dev", interface]).await? {
            IpOutput::Json(json) => parse_addr_json(&json, family),
            IpOutput::Text(text) => Ok(parse_addr_text(&text, family)),
        }
    }

    async fn neighbor(&self, hop: IpAddr, interface: &str) -> AppResult<Neighbor> {
        let family = AddressFamily::of(hop);
        let target = hop.to_string();
        match run_ip(Some(family), &["neigh", "show", &target, "dev", interface]).await? {
            IpOutput::Json(json) => parse_neigh_json(&json),
            IpOutput::Text(text) => Ok(parse_neigh_text(&text)),
        }
    }
}

/// Arguments for one `ip` invocation, optionally limited to `family`
fn ip_args<'a>(json: bool, family: Option<AddressFamily>, args: &[&'a str]) -> Vec<&'a str> {
    let mut full = Vec::with_capacity(args.len() + 2);
    if json {
        full.push("-json");
    }
    match family {
        Some(AddressFamily::V4) => full.push("-4"),
        Some(AddressFamily::V6) => full.push("-6"),
        None => {}
    }
    full.extend_from_slice(args);
    full
}

/// Run `ip`, preferring JSON output
async fn run_ip(family: Option<AddressFamily>, args: &[&str]) -> AppResult<IpOutput> {
    let json_args = ip_args(true, family, args);
    let output = command::capture(IP_PATH, &json_args).await?;
    if output.success() {
        let stdout = output.stdout.trim();
        // Some iproute2 versions print nothing instead of [] for an empty table
        if stdout.is_empty() {
            return Ok(IpOutput::Json(serde_json::Value::Array(Vec::new())));
        }
        match serde_json::from_str(stdout) {
            Ok(json) => return Ok(IpOutput::Json(json)),
            Err(e) => tracing::debug!("ip -json output unusable ({}), retrying as text", e),
        }
    }

    let text_args = ip_args(false, family, args);
    let output = command::capture(IP_PATH, &text_args).await?;
    if !output.success() {
        return Err(AppError::CommandExecution(format!(
            "{} {}: {}",
            IP_PATH,
            text_args.join(" "),
            output.stderr.trim()
        )));
    }
    Ok(IpOutput::Text(output.stdout))
}

fn json_entries<'a>(json: &'a serde_json::Value, what: &'static str) -> AppResult<&'a Vec<serde_json::Value>> {
    json.as_array()
        .ok_or_else(|| AppError::parse(what, "expected a JSON array"))
}

fn normalize_destination(dest: &str, family: AddressFamily) -> String {
    if dest == "default" {
        family.default_network().to_string()
    } else {
        dest.to_string()
    }
}

fn parse_route_json(json: &serde_json::Value, family: AddressFamily) -> AppResult<Vec<LinuxRoute>> {
    let mut parsed_routes = Vec::new();

    for route in json_entries(json, "ip route")? {
        let destination = route
            .get("dst")
            .and_then(|v| v.as_str())
            .unwrap_or("default");

        let mut parsed = LinuxRoute::new(normalize_destination(destination, family));

        if let Some(kind) = route.get("type").and_then(|v| v.as_str()) {
            parsed.kind = kind.to_string();
        }

        // Multipath routes keep gateway and device inside their first nexthop
        let hop = route
            .get("nexthops")
            .and_then(|v| v.as_array())
            .and_then(|hops| hops.first())
            .unwrap_or(route);

        parsed.gateway = hop
            .get("gateway")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok());

        parsed.interface = hop
            .get("dev")
            .or_else(|| route.get("dev"))
            .and_then(|v| v.as_str())
            .map(String::from);

        parsed_routes.push(parsed);
    }

    Ok(parsed_routes)
}

fn parse_route_text(output: &str, family: AddressFamily) -> Vec<LinuxRoute> {
    let mut routes: Vec<LinuxRoute> = Vec::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = parts.first().copied() else {
            continue;
        };

        // Continuation line of a multipath route
        if first == "nexthop" {
            if let Some(last) = routes.last_mut() {
                if last.interface.is_none() {
                    apply_route_keywords(last, &parts[1..]);
                }
            }
            continue;
        }

        let (kind, rest) = if ROUTE_TYPES.contains(&first) {
            (first, &parts[1..])
        } else {
            ("unicast", &parts[..])
        };
        let Some(destination) = rest.first() else {
            continue;
        };

        let mut route = LinuxRoute::new(normalize_destination(destination, family));
        route.kind = kind.to_string();
        apply_route_keywords(&mut route, &rest[1..]);
        routes.push(route);
    }

    routes
}

fn apply_route_keywords(route: &mut LinuxRoute, parts: &[&str]) {
    let mut i = 0;
    while i < parts.len() {
        match parts[i] {
            "via" => {
                // `via inet6 fe80::1` names the gateway family first
                let mut j = i + 1;
                if matches!(parts.get(j).copied(), Some("inet") | Some("inet6")) {
                    j += 1;
                }
                route.gateway = parts.get(j).and_then(|gw| gw.parse().ok());
                i = j + 1;
            }
            "dev" => {
                route.interface = parts.get(i + 1).map(|s| s.to_string());
                i += 2;
            }
            _ => i += 1,
        }
    }
}

fn select_route(routes: &[LinuxRoute], address: IpAddr) -> AppResult<RouteRecord> {
    let route = longest_prefix(routes, address, |r| r.destination.as_str())
        .ok_or(AppError::RouteNotFound(address))?;
    tracing::debug!("Selected route {:?} for {}", route, address);

    if DEAD_END_TYPES.contains(&route.kind.as_str()) {
        return Err(AppError::RouteNotFound(address));
    }

    let interface = route
        .interface
        .clone()
        .ok_or_else(|| AppError::parse("ip route", format!("route {} has no device", route.destination)))?;

    Ok(RouteRecord {
        interface,
        network: route.destination.clone(),
        mask: None,
        gateway: route.gateway.map_or(NextHop::Direct, NextHop::Gateway),
    })
}

fn family_keyword(family: AddressFamily) -> &'static str {
    match family {
        AddressFamily::V4 => "inet",
        AddressFamily::V6 => "inet6",
    }
}

fn parse_addr_json(json: &serde_json::Value, family: AddressFamily) -> AppResult<InterfaceRecord> {
    let Some(link) = json_entries(json, "ip addr")?.first() else {
        return Ok(InterfaceRecord::default());
    };

    let link_address = link
        .get("address")
        .and_then(|v| v.as_str())
        .map(String::from);

    let keyword = family_keyword(family);
    let address = link
        .get("addr_info")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter(|info| info.get("family").and_then(|v| v.as_str()) == Some(keyword))
        .find_map(|info| info.get("local").and_then(|v| v.as_str()))
        .and_then(|s| s.parse().ok());

    Ok(InterfaceRecord {
        link_address,
        address,
    })
}

fn parse_addr_text(output: &str, family: AddressFamily) -> InterfaceRecord {
    let keyword = family_keyword(family);
    let mut record = InterfaceRecord::default();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [kind, lladdr, ..] if kind.starts_with("link/") && record.link_address.is_none() => {
                if *lladdr != "brd" {
                    record.link_address = Some(lladdr.to_string());
                }
            }
            [kind, addr, ..] if *kind == keyword && record.address.is_none() => {
                let addr = addr.split('/').next().unwrap_or_default();
                record.address = addr.parse().ok();
            }
            _ => {}
        }
    }

    record
}

fn parse_neigh_json(json: &serde_json::Value) -> AppResult<Neighbor> {
    let lladdr = json_entries(json, "ip neigh")?
        .iter()
        .find_map(|entry| entry.get("lladdr").and_then(|v| v.as_str()));
    Ok(Neighbor::from_lladdr(lladdr))
}

fn parse_neigh_text(output: &str) -> Neighbor {
    let lladdr = output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        parts.find(|p| *p == "lladdr")?;
        parts.next()
    });
    Neighbor::from_lladdr(lladdr)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTE_JSON: &str = r#"[
        {"dst":"default","gateway":"10.0.1.254","dev":"eth0","protocol":"static","flags":[]},
        {"dst":"10.0.1.0/24","dev":"bridge1","protocol":"kernel","scope":"link","prefsrc":"10.0.1.1","flags":[]},
        {"dst":"10.0.12.0/24","gateway":"10.0.1.12","dev":"bridge1","protocol":"static","flags":[]}
    ]"#;

    fn json(s: &str) -> serde_json::Value {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_route_json() {
        let routes = parse_route_json(&json(ROUTE_JSON), AddressFamily::V4).unwrap();

        assert_eq!(routes.len(), 3);
        assert_eq!(routes[0].destination, "0.0.0.0/0");
        assert_eq!(routes[2].gateway, Some("10.0.1.12".parse().unwrap()));
        assert_eq!(routes[1].gateway, None);
        assert_eq!(routes[1].interface.as_deref(), Some("bridge1"));
    }

    #[test]
    fn test_select_route_via_gateway() {
        let routes = parse_route_json(&json(ROUTE_JSON), AddressFamily::V4).unwrap();
        let record = select_route(&routes, "10.0.12.12".parse().unwrap()).unwrap();

        assert_eq!(record.interface, "bridge1");
        assert_eq!(record.network, "10.0.12.0/24");
        assert_eq!(record.mask, None);
        assert_eq!(record.gateway, NextHop::Gateway("10.0.1.12".parse().unwrap()));
    }

    #[test]
    fn test_select_route_on_link() {
        let routes = parse_route_json(&json(ROUTE_JSON), AddressFamily::V4).unwrap();
        let record = select_route(&routes, "10.0.1.50".parse().unwrap()).unwrap();

        assert_eq!(record.network, "10.0.1.0/24");
        assert_eq!(record.gateway, NextHop::Direct);
    }

    #[test]
    fn test_select_route_empty_table_is_not_found() {
        let routes = parse_route_json(&json("[]"), AddressFamily::V4).unwrap();
        let err = select_route(&routes, "192.0.2.1".parse().unwrap()).unwrap_err();
        assert!(matches!(err, AppError::RouteNotFound(addr) if addr.to_string() == "192.0.2.1"));
    }

    #[test]
    fn test_select_route_unreachable_is_not_found() {
        let routes = parse_route_json(
            &json(r#"[{"type":"unreachable","dst":"192.0.2.0/24","flags":[]}]"#),
            AddressFamily::V4,
        )
        .unwrap();
        assert!(matches!(
            select_route(&routes, "192.0.2.1".parse().unwrap()),
            Err(AppError::RouteNotFound(_))
        ));
    }

    #[test]
    fn test_parse_route_json_multipath() {
        let routes = parse_route_json(
            &json(
                r#"[{"dst":"default","protocol":"static","flags":[],
                     "nexthops":[{"gateway":"10.0.1.11","dev":"bridge1","weight":1,"flags":[]},
                                 {"gateway":"10.0.1.12","dev":"bridge1","weight":1,"flags":[]}]}]"#,
            ),
            AddressFamily::V4,
        )
        .unwrap();
        assert_eq!(routes[0].gateway, Some("10.0.1.11".parse().unwrap()));
        assert_eq!(routes[0].interface.as_deref(), Some("bridge1"));
    }

    #[test]
    fn test_parse_route_text() {
        let output = "default via 2001:db8:1::fe dev eth0 proto static metric 1024 pref medium
2001:db8:1::/64 dev eth0 proto kernel metric 256 pref medium
unreachable 2001:db8:dead::/48 dev lo metric 1024 pref medium
";
        let routes = parse_route_text(output, AddressFamily::V6);

        assert_eq!(routes.len(), 3);
        assert_eq!(routes[0].destination, "::/0");
        assert_eq!(routes[0].gateway, Some("2001:db8:1::fe".parse().unwrap()));
        assert_eq!(routes[1].gateway, None);
        assert_eq!(routes[2].kind, "unreachable");
        assert_eq!(routes[2].destination, "2001:db8:dead::/48");

        let record = select_route(&routes, "2001:db8:1::5".parse().unwrap()).unwrap();
        assert_eq!(record.network, "2001:db8:1::/64");
        assert_eq!(record.gateway, NextHop::Direct);
    }

    #[test]
    fn test_parse_route_text_multipath_and_foreign_family_gateway() {
        let output = "default proto static metric 1024
\tnexthop via 10.0.1.11 dev bridge1 weight 1
\tnexthop via 10.0.1.12 dev bridge1 weight 1
10.9.0.0/16 via inet6 fe80::1 dev eth2
";
        let routes = parse_route_text(output, AddressFamily::V4);

        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].gateway, Some("10.0.1.11".parse().unwrap()));
        assert_eq!(routes[0].interface.as_deref(), Some("bridge1"));
        assert_eq!(routes[1].gateway, Some("fe80::1".parse().unwrap()));
        assert_eq!(routes[1].interface.as_deref(), Some("eth2"));
    }

    #[test]
    fn test_addr_query_keeps_link_line() {
        assert_eq!(
            ip_args(true, None, &["addr", "show", "dev", "eth0"]),
            vec!["-json", "addr", "show", "dev", "eth0"]
        );
        assert_eq!(
            ip_args(false, Some(AddressFamily::V6), &["route", "show", "match", "::1"]),
            vec!["-6", "route", "show", "match", "::1"]
        );
    }

    // `ip -json addr show dev eth0`
    const ADDR_JSON: &str = r#"[{"ifindex":2,"ifname":"eth0","flags":["BROADCAST","MULTICAST","UP","LOWER_UP"],
        "mtu":1500,"qdisc":"mq","operstate":"UP","group":"default","txqlen":1000,
        "link_type":"ether","address":"02:fc:00:00:00:01","broadcast":"ff:ff:ff:ff:ff:ff",
        "addr_info":[
            {"family":"inet","local":"192.0.2.2","prefixlen":24,"broadcast":"192.0.2.255","scope":"global",
             "label":"eth0","valid_life_time":4294967295,"preferred_life_time":4294967295},
            {"family":"inet","local":"192.0.2.3","prefixlen":24,"scope":"global","secondary":true,
             "label":"eth0","valid_life_time":4294967295,"preferred_life_time":4294967295},
            {"family":"inet6","local":"fe80::fc:ff:fe00:1","prefixlen":64,"scope":"link",
             "valid_life_time":4294967295,"preferred_life_time":4294967295}
        ]}]"#;

    #[test]
    fn test_parse_addr_json() {
        let v4 = parse_addr_json(&json(ADDR_JSON), AddressFamily::V4).unwrap();
        assert_eq!(v4.link_address.as_deref(), Some("02:fc:00:00:00:01"));
        assert_eq!(v4.address, Some("192.0.2.2".parse().unwrap()));

        let v6 = parse_addr_json(&json(ADDR_JSON), AddressFamily::V6).unwrap();
        assert_eq!(v6.link_address.as_deref(), Some("02:fc:00:00:00:01"));
        assert_eq!(v6.address, Some("fe80::fc:ff:fe00:1".parse().unwrap()));
    }

    #[test]
    fn test_parse_addr_json_family_filtered_output_has_no_link_address() {
        // `ip -json -4 addr show dev eth0`
        let output = r#"[{"ifindex":2,"ifname":"eth0","flags":["BROADCAST","MULTICAST","UP","LOWER_UP"],
            "mtu":1500,"qdisc":"mq","operstate":"UP","group":"default","txqlen":1000,
            "addr_info":[{"family":"inet","local":"192.0.2.2","prefixlen":24,"broadcast":"192.0.2.255",
                "scope":"global","label":"eth0","valid_life_time":4294967295,"preferred_life_time":4294967295}]}]"#;

        let v4 = parse_addr_json(&json(output), AddressFamily::V4).unwrap();
        assert_eq!(v4.link_address, None);
        assert_eq!(v4.address, Some("192.0.2.2".parse().unwrap()));
    }

    #[test]
    fn test_parse_addr_text() {
        // `ip addr show dev eth0`
        let output = "2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc mq state UP group default qlen 1000
    link/ether 02:fc:00:00:00:01 brd ff:ff:ff:ff:ff:ff
    inet 192.0.2.2/24 brd 192.0.2.255 scope global eth0
       valid_lft forever preferred_lft forever
    inet6 fe80::fc:ff:fe00:1/64 scope link
       valid_lft forever preferred_lft forever
";
        let v4 = parse_addr_text(output, AddressFamily::V4);
        assert_eq!(v4.link_address.as_deref(), Some("02:fc:00:00:00:01"));
        assert_eq!(v4.address, Some("192.0.2.2".parse().unwrap()));

        let v6 = parse_addr_text(output, AddressFamily::V6);
        assert_eq!(v6.link_address.as_deref(), Some("02:fc:00:00:00:01"));
        assert_eq!(v6.address, Some("fe80::fc:ff:fe00:1".parse().unwrap()));

        let tunnel = "7: tun0: <POINTOPOINT,UP> mtu 1420
    link/none
    inet 10.8.0.1 peer 10.8.0.2/32 scope global tun0
";
        let v4 = parse_addr_text(tunnel, AddressFamily::V4);
        assert_eq!(v4.link_address, None);
        assert_eq!(v4.address, Some("10.8.0.1".parse().unwrap()));
    }

    #[test]
    fn test_parse_neigh_json() {
        let resolved = json(r#"[{"dst":"10.0.1.12","lladdr":"02:01:32:38:b0:04","state":["REACHABLE"]}]"#);
        assert_eq!(
            parse_neigh_json(&resolved).unwrap(),
            Neighbor::Resolved("02:01:32:38:b0:04".to_string())
        );

        let failed = json(r#"[{"dst":"10.0.1.12","state":["FAILED"]}]"#);
        assert_eq!(parse_neigh_json(&failed).unwrap(), Neighbor::Empty);
        assert_eq!(parse_neigh_json(&json("[]")).unwrap(), Neighbor::Empty);
    }

    #[test]
    fn test_parse_neigh_text() {
        assert_eq!(
            parse_neigh_text("10.0.1.11 lladdr 02:01:32:38:b0:03 STALE\n"),
            Neighbor::Resolved("02:01:32:38:b0:03".to_string())
        );
        assert_eq!(parse_neigh_text("10.0.1.11 INCOMPLETE\n"), Neighbor::Empty);
        assert_eq!(parse_neigh_text(""), Neighbor::Empty);
    }
}
