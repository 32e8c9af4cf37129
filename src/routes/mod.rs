// Routes module - resolves an address to its egress interface, next hop and neighbor entry

pub mod bsd;
pub mod command;
pub mod linux;
pub mod lookup;

use crate::error::{AppError, AppResult};
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::IpAddr;

pub use bsd::BsdQuery;
pub use linux::LinuxQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn of(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Label used for the neighbor cache line of a box
    pub fn neighbor_label(self) -> &'static str {
        match self {
            AddressFamily::V4 => "ARP",
            AddressFamily::V6 => "NDP",
        }
    }

    /// Interior width shared by every box drawn for this family
    pub fn box_width(self) -> usize {
        match self {
            AddressFamily::V4 => 28,
            AddressFamily::V6 => 50,
        }
    }

    pub fn default_network(self) -> &'static str {
        match self {
            AddressFamily::V4 => "0.0.0.0/0",
            AddressFamily::V6 => "::/0",
        }
    }

    pub fn matches(self, addr: IpAddr) -> bool {
        AddressFamily::of(addr) == self
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => f.write_str("IPv4"),
            AddressFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// Where a route sends traffic: straight onto the link, or through a gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextHop {
    Direct,
    Gateway(IpAddr),
}

impl fmt::Display for NextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextHop::Direct => f.write_str("direct"),
            NextHop::Gateway(gw) => write!(f, "{}", gw),
        }
    }
}

impl Serialize for NextHop {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Link-layer address found in the ARP/NDP cache for a next hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Neighbor {
    Resolved(String),
    Empty,
}

impl Neighbor {
    /// Builds a neighbor from an optional link address, treating blanks as unresolved
    pub fn from_lladdr(lladdr: Option<&str>) -> Self {
        match lladdr.map(str::trim) {
            Some(addr) if !addr.is_empty() => Neighbor::Resolved(addr.to_string()),
            _ => Neighbor::Empty,
        }
    }
}

impl fmt::Display for Neighbor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Neighbor::Resolved(lladdr) => f.write_str(lladdr),
            Neighbor::Empty => f.write_str("empty"),
        }
    }
}

impl Serialize for Neighbor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Route table answer for one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub interface: String,
    /// Destination prefix of the matched route
    pub network: String,
    /// Dotted netmask, only reported by BSD for IPv4 routes
    pub mask: Option<String>,
    pub gateway: NextHop,
}

/// Addressing of a local interface
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterfaceRecord {
    pub link_address: Option<String>,
    /// First address of the requested family
    pub address: Option<IpAddr>,
}

/// Everything the device knows about how it reaches one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRoute {
    pub address: IpAddr,
    pub interface: String,
    pub link_address: Option<String>,
    pub interface_address: Option<IpAddr>,
    pub network: String,
    pub mask: Option<String>,
    pub gateway: NextHop,
    pub neighbor: Neighbor,
}

impl ResolvedRoute {
    /// The endpoint is one of this device's own addresses
    pub fn is_locally_attached(&self) -> bool {
        self.interface_address == Some(self.address)
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(self.address)
    }
}

/// Platform capability answering route, interface and neighbor table questions
pub trait RouteQuery {
    /// Longest-prefix route towards `address`
    async fn route(&self, address: IpAddr) -> AppResult<RouteRecord>;

    /// Link address and first `family` address of `interface`
    async fn interface(&self, interface: &str, family: AddressFamily) -> AppResult<InterfaceRecord>;

    /// Neighbor cache entry for `hop` as seen on `interface`
    async fn neighbor(&self, hop: IpAddr, interface: &str) -> AppResult<Neighbor>;
}

/// Command syntax family of the running system
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Platform {
    Linux,
    Bsd,
}

impl Platform {
    pub fn detect() -> AppResult<Self> {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> AppResult<Self> {
        match os {
            "linux" => Ok(Platform::Linux),
            "macos" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => Ok(Platform::Bsd),
            other => Err(AppError::UnsupportedPlatform(other.to_string())),
        }
    }
}

/// Parse and check the two endpoints before any table is queried
pub fn validate_pair(source: &str, destination: &str) -> AppResult<(IpAddr, IpAddr, AddressFamily)> {
    let src: IpAddr = source
        .trim()
        .parse()
        .map_err(|_| AppError::Input(format!("'{}' is not an IP address", source)))?;
    let dst: IpAddr = destination
        .trim()
        .parse()
        .map_err(|_| AppError::Input(format!("'{}' is not an IP address", destination)))?;

    if src == dst {
        return Err(AppError::Input(format!(
            "source and destination are both {}",
            src
        )));
    }

    let family = AddressFamily::of(src);
    if !family.matches(dst) {
        return Err(AppError::Input(format!(
            "{} is {} but {} is {}",
            src,
            family,
            dst,
            AddressFamily::of(dst)
        )));
    }

    Ok((src, dst, family))
}

/// Resolve one endpoint through the platform tables
pub async fn resolve<Q: RouteQuery>(query: &Q, address: IpAddr) -> AppResult<ResolvedRoute> {
    let family = AddressFamily::of(address);
    let route = query.route(address).await?;
    let iface = query.interface(&route.interface, family).await?;

    let locally_attached = iface.address == Some(address);
    let neighbor = if locally_attached {
        tracing::debug!("{} is assigned to {}, skipping neighbor lookup", address, route.interface);
        Neighbor::Empty
    } else {
        let hop = match route.gateway {
            NextHop::Gateway(gw) => gw,
            NextHop::Direct => address,
        };
        let neighbor = query.neighbor(hop, &route.interface).await?;
        if neighbor == Neighbor::Empty {
            tracing::warn!(
                "No {} entry for {} on {}",
                family.neighbor_label(),
                hop,
                route.interface
            );
        }
        neighbor
    };

    let resolved = ResolvedRoute {
        address,
        interface: route.interface,
        link_address: iface.link_address,
        interface_address: iface.address,
        network: route.network,
        mask: route.mask,
        gateway: route.gateway,
        neighbor,
    };
    tracing::info!(
        "{} via {} on {} (network {})",
        resolved.address,
        resolved.gateway,
        resolved.interface,
        resolved.network
    );
    Ok(resolved)
}
