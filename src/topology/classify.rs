// Layout classification: which boxes, connectors and LAN lines a path needs

use super::{Device, DeviceRole, DeviceSide, Directive, Layout, LayoutKind, NodeBox, Role, Slot, Span};
use crate::routes::{NextHop, ResolvedRoute};

#[derive(Debug, Clone, Copy)]
enum Side {
    Source,
    Destination,
}

/// Decide the layout for a source/destination pair.
///
/// Pure function of the two routes: the same input always yields the same
/// boxes, connectors and LAN lines.
pub fn classify(source: &ResolvedRoute, destination: &ResolvedRoute) -> Layout {
    let role = if source.is_locally_attached() || destination.is_locally_attached() {
        DeviceRole::Host
    } else {
        DeviceRole::Router
    };

    let layout = if source.interface != destination.interface {
        split(source, destination, role)
    } else {
        shared(source, destination, role)
    };
    tracing::info!(
        "{:?} layout with {} box(es) and {} LAN line(s)",
        layout.kind,
        layout.nodes().count(),
        layout.count_lans()
    );
    layout
}

/// HOST box of one side, absent when the endpoint is this device
fn host_box(route: &ResolvedRoute, side: Side) -> Option<NodeBox> {
    if route.is_locally_attached() {
        return None;
    }
    let role = match side {
        Side::Source => Role::SourceHost,
        Side::Destination => Role::DestinationHost,
    };
    // Without a router in between, the neighbor entry belongs to the host itself
    let neighbor = match route.gateway {
        NextHop::Direct => Some(route.neighbor.clone()),
        NextHop::Gateway(_) => None,
    };
    Some(NodeBox {
        role,
        address: route.address,
        neighbor,
    })
}

/// ROUTER box of one side, absent when the endpoint is on-link
fn router_box(route: &ResolvedRoute, side: Side) -> Option<NodeBox> {
    let NextHop::Gateway(gateway) = route.gateway else {
        return None;
    };
    let role = match side {
        Side::Source => Role::SourceRouter,
        Side::Destination => Role::DestinationRouter,
    };
    Some(NodeBox {
        role,
        address: gateway,
        neighbor: Some(route.neighbor.clone()),
    })
}

/// Boxes of one side from the far end inwards
fn column(route: &ResolvedRoute, side: Side) -> Vec<NodeBox> {
    host_box(route, side)
        .into_iter()
        .chain(router_box(route, side))
        .collect()
}

fn slot(node: Option<NodeBox>) -> Slot {
    node.map_or(Slot::PassThrough, Slot::Node)
}

/// Stack boxes in one centred column, a connector between each
fn push_stack(directives: &mut Vec<Directive>, nodes: impl IntoIterator<Item = NodeBox>) {
    for node in nodes {
        directives.push(Directive::Single(node));
        directives.push(Directive::Link);
    }
}

/// Different egress interfaces: source side above the device, destination side below
fn split(source: &ResolvedRoute, destination: &ResolvedRoute, role: DeviceRole) -> Layout {
    let mut directives = Vec::new();

    push_stack(&mut directives, column(source, Side::Source));

    directives.push(Directive::Device(Device {
        role,
        upper: DeviceSide::from(source),
        lower: Some(DeviceSide::from(destination)),
    }));

    for node in column(destination, Side::Destination).into_iter().rev() {
        directives.push(Directive::Link);
        directives.push(Directive::Single(node));
    }

    Layout {
        family: source.family(),
        kind: LayoutKind::Split,
        span: Span::Single,
        directives,
    }
}

/// Same egress interface: both sides above the device, merged on the shared medium
fn shared(source: &ResolvedRoute, destination: &ResolvedRoute, role: DeviceRole) -> Layout {
    let device = Directive::Device(Device {
        role,
        upper: DeviceSide::from(source),
        lower: None,
    });
    let mut directives = Vec::new();

    let (Some(src_host), Some(dst_host)) = (host_box(source, Side::Source), host_box(destination, Side::Destination))
    else {
        // One endpoint is this device, so a single path reaches it
        push_stack(
            &mut directives,
            column(source, Side::Source)
                .into_iter()
                .chain(column(destination, Side::Destination)),
        );
        directives.push(device);
        return Layout {
            family: source.family(),
            kind: LayoutKind::Shared,
            span: Span::Single,
            directives,
        };
    };

    directives.push(Directive::Pair(Slot::Node(src_host), Slot::Node(dst_host)));
    directives.push(Directive::PairLink);

    match (source.gateway, destination.gateway) {
        (NextHop::Gateway(src_gw), NextHop::Gateway(dst_gw)) if src_gw == dst_gw => {
            directives.push(Directive::Lan);
            directives.push(Directive::Link);
            directives.push(Directive::Single(NodeBox {
                role: Role::SharedRouter,
                address: src_gw,
                neighbor: Some(source.neighbor.clone()),
            }));
            directives.push(Directive::Link);
        }
        (NextHop::Direct, NextHop::Direct) => {
            directives.push(Directive::Lan);
            directives.push(Directive::Link);
        }
        _ => {
            directives.push(Directive::Pair(
                slot(router_box(source, Side::Source)),
                slot(router_box(destination, Side::Destination)),
            ));
            directives.push(Directive::PairLink);
            directives.push(Directive::Lan);
            directives.push(Directive::Link);
        }
    }
    directives.push(device);

    Layout {
        family: source.family(),
        kind: LayoutKind::Shared,
        span: Span::Double,
        directives,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::Neighbor;

    fn route(address: &str, interface: &str, gateway: Option<&str>, neighbor: &str) -> ResolvedRoute {
        ResolvedRoute {
            address: address.parse().unwrap(),
            interface: interface.to_string(),
            link_address: Some("02:ab:de:8c:30:01".to_string()),
            interface_address: Some("10.0.1.1".parse().unwrap()),
            network: "10.0.0.0".to_string(),
            mask: Some("255.255.0.0".to_string()),
            gateway: gateway.map_or(NextHop::Direct, |gw| NextHop::Gateway(gw.parse().unwrap())),
            neighbor: Neighbor::from_lladdr(Some(neighbor)),
        }
    }

    fn roles(layout: &Layout) -> Vec<Role> {
        layout.nodes().map(|node| node.role).collect()
    }

    #[test]
    fn test_split_with_routers_on_both_sides() {
        let src = route("10.0.11.11", "eth0", Some("10.0.1.11"), "02:01:32:38:b0:03");
        let dst = route("10.0.22.22", "eth1", Some("10.0.2.22"), "02:01:32:38:b0:04");
        let layout = classify(&src, &dst);

        assert_eq!(layout.kind, LayoutKind::Split);
        assert_eq!(layout.span, Span::Single);
        assert_eq!(
            roles(&layout),
            vec![
                Role::SourceHost,
                Role::SourceRouter,
                Role::DestinationRouter,
                Role::DestinationHost
            ]
        );
        assert_eq!(layout.count_lans(), 0);
        // Four boxes plus the device need four connectors
        let links = layout
            .directives
            .iter()
            .filter(|d| matches!(d, Directive::Link))
            .count();
        assert_eq!(links, 4);
        assert!(matches!(
            &layout.directives[4],
            Directive::Device(Device { lower: Some(lower), role: DeviceRole::Router, .. }) if lower.interface == "eth1"
        ));
    }

    #[test]
    fn test_split_direct_source_attaches_neighbor_to_host() {
        let src = route("10.0.1.50", "eth0", None, "02:01:32:38:b0:50");
        let dst = route("10.0.22.22", "eth1", Some("10.0.2.22"), "02:01:32:38:b0:04");
        let layout = classify(&src, &dst);

        assert_eq!(
            roles(&layout),
            vec![Role::SourceHost, Role::DestinationRouter, Role::DestinationHost]
        );
        let host = layout.nodes().next().unwrap();
        assert_eq!(
            host.neighbor,
            Some(Neighbor::Resolved("02:01:32:38:b0:50".to_string()))
        );
        let dst_host = layout.nodes().last().unwrap();
        assert_eq!(dst_host.neighbor, None);
    }

    #[test]
    fn test_locally_attached_source_has_no_host_box() {
        let src = route("10.0.1.1", "eth0", None, "");
        let dst = route("10.0.22.22", "eth1", Some("10.0.2.22"), "02:01:32:38:b0:04");
        let layout = classify(&src, &dst);

        assert_eq!(roles(&layout), vec![Role::DestinationRouter, Role::DestinationHost]);
        assert!(matches!(layout.directives[0], Directive::Device(Device { role: DeviceRole::Host, .. })));
        // Classification is repeatable
        assert_eq!(classify(&src, &dst), layout);
    }

    #[test]
    fn test_shared_same_gateway_merges_router() {
        let src = route("10.0.11.11", "bridge1", Some("10.0.1.11"), "02:01:32:38:b0:03");
        let dst = route("10.0.12.12", "bridge1", Some("10.0.1.11"), "02:01:32:38:b0:03");
        let layout = classify(&src, &dst);

        assert_eq!(layout.kind, LayoutKind::Shared);
        assert_eq!(layout.span, Span::Double);
        assert_eq!(
            roles(&layout),
            vec![Role::SourceHost, Role::DestinationHost, Role::SharedRouter]
        );
        assert_eq!(layout.count_lans(), 1);
    }

    #[test]
    fn test_shared_distinct_gateways_draws_two_routers() {
        let src = route("10.0.11.11", "bridge1", Some("10.0.1.11"), "02:01:32:38:b0:03");
        let dst = route("10.0.12.12", "bridge1", Some("10.0.1.12"), "02:01:32:38:b0:04");
        let layout = classify(&src, &dst);

        assert!(layout.directives.iter().any(|d| matches!(
            d,
            Directive::Pair(
                Slot::Node(NodeBox { role: Role::SourceRouter, .. }),
                Slot::Node(NodeBox { role: Role::DestinationRouter, .. })
            )
        )));
        assert_eq!(roles(&layout).len(), 4);
        assert_eq!(layout.count_lans(), 1);
    }

    #[test]
    fn test_shared_one_gateway_passes_through_other_column() {
        let src = route("10.0.1.50", "bridge1", None, "02:01:32:38:b0:50");
        let dst = route("10.0.12.12", "bridge1", Some("10.0.1.12"), "02:01:32:38:b0:04");
        let layout = classify(&src, &dst);

        assert!(layout.directives.iter().any(|d| matches!(
            d,
            Directive::Pair(Slot::PassThrough, Slot::Node(NodeBox { role: Role::DestinationRouter, .. }))
        )));
        let src_host = layout.nodes().next().unwrap();
        assert_eq!(src_host.role, Role::SourceHost);
        assert!(src_host.neighbor.is_some());
    }

    #[test]
    fn test_shared_both_direct_has_no_router() {
        let src = route("10.0.1.50", "bridge1", None, "02:01:32:38:b0:50");
        let dst = route("10.0.1.60", "bridge1", None, "");
        let layout = classify(&src, &dst);

        assert_eq!(roles(&layout), vec![Role::SourceHost, Role::DestinationHost]);
        assert_eq!(layout.count_lans(), 1);
        assert_eq!(layout.nodes().nth(1).unwrap().neighbor, Some(Neighbor::Empty));
    }

    #[test]
    fn test_shared_with_local_source_is_single_path() {
        let src = route("10.0.1.1", "bridge1", None, "");
        let dst = route("10.0.12.12", "bridge1", Some("10.0.1.12"), "02:01:32:38:b0:04");
        let layout = classify(&src, &dst);

        assert_eq!(layout.span, Span::Single);
        assert_eq!(layout.count_lans(), 0);
        assert_eq!(roles(&layout), vec![Role::DestinationHost, Role::DestinationRouter]);
        assert!(matches!(layout.directives.last(), Some(Directive::Device(Device { lower: None, .. }))));
    }
}
