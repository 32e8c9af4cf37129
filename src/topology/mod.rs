// Topology module - turns two resolved routes into a drawable layout

pub mod classify;
pub mod render;

use crate::routes::{AddressFamily, Neighbor, ResolvedRoute};
use serde::Serialize;
use std::net::IpAddr;

pub use classify::classify;
pub use render::render;

/// Which layout family a pair of routes falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    /// Source and destination leave through different interfaces
    Split,
    /// Both leave through the same interface
    Shared,
}

/// Canvas width: one box, or two boxes side by side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    Single,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    SourceHost,
    DestinationHost,
    SourceRouter,
    DestinationRouter,
    SharedRouter,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::SourceHost => "SOURCE HOST",
            Role::DestinationHost => "DESTINATION HOST",
            Role::SourceRouter => "ROUTER TOWARDS SOURCE",
            Role::DestinationRouter => "ROUTER TOWARDS DESTINATION",
            Role::SharedRouter => "ROUTER",
        }
    }
}

/// A HOST or ROUTER box
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeBox {
    pub role: Role,
    pub address: IpAddr,
    /// Neighbor cache line, present when this device talks to the node directly
    pub neighbor: Option<Neighbor>,
}

/// One column of a side-by-side row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Node(NodeBox),
    /// Nothing to draw here, only the connector of this column passes through
    PassThrough,
}

/// Interface fields of the local device for one side of the path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSide {
    pub interface: String,
    pub link_address: Option<String>,
    pub address: Option<IpAddr>,
    pub network: String,
    pub mask: Option<String>,
}

impl From<&ResolvedRoute> for DeviceSide {
    fn from(route: &ResolvedRoute) -> Self {
        DeviceSide {
            interface: route.interface.clone(),
            link_address: route.link_address.clone(),
            address: route.interface_address,
            network: route.network.clone(),
            mask: route.mask.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    Router,
    /// The device is itself one end of the path
    Host,
}

impl DeviceRole {
    pub fn label(self) -> &'static str {
        match self {
            DeviceRole::Router => "THIS ROUTER",
            DeviceRole::Host => "THIS HOST",
        }
    }
}

/// The local device box, always drawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub role: DeviceRole,
    /// Interface towards the source
    pub upper: DeviceSide,
    /// Interface towards the destination when it differs from `upper`
    pub lower: Option<DeviceSide>,
}

/// One rendering step, top to bottom
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// A box centred on the canvas
    Single(NodeBox),
    /// Two columns side by side
    Pair(Slot, Slot),
    /// A bar under the centre of the canvas
    Link,
    /// One bar under each column of a pair
    PairLink,
    /// Shared medium joining both columns into the centre
    Lan,
    Device(Device),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub family: AddressFamily,
    pub kind: LayoutKind,
    pub span: Span,
    pub directives: Vec<Directive>,
}

impl Layout {
    /// Every HOST/ROUTER box of the layout in drawing order
    pub fn nodes(&self) -> impl Iterator<Item = &NodeBox> {
        self.directives.iter().flat_map(|directive| {
            let nodes: Vec<&NodeBox> = match directive {
                Directive::Single(node) => vec![node],
                Directive::Pair(left, right) => [left, right]
                    .into_iter()
                    .filter_map(|slot| match slot {
                        Slot::Node(node) => Some(node),
                        Slot::PassThrough => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            nodes
        })
    }

    pub fn count_lans(&self) -> usize {
        self.directives
            .iter()
            .filter(|d| matches!(d, Directive::Lan))
            .count()
    }
}
