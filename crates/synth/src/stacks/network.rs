//! Network stack: one isolated VPC, two segments per zone, no NAT gateways.
//!
//! Each zone contributes one externally reachable (public) segment and one
//! internal-only (private) segment. Public segments route to an internet
//! gateway; private segments have **no outbound path** — the zero-NAT layout
//! is a deliberate cost choice, so anything placed there is reachable only
//! through a bastion.

use anyhow::Result;
use serde_json::Value;

use common::resources::{
    Descriptor, InternetGateway, Route, RouteTable, Subnet, SubnetRouteTableAssociation, Vpc,
    VpcGatewayAttachment,
};
use common::template::{import_value, ref_to, select_az, Output, Template};
use common::{Cidr, DeclError};

use crate::config::Config;

/// Export name for the VPC id.
pub const VPC_EXPORT: &str = "network-vpc-id";

/// Cross-stack handle to the declared network.
///
/// Downstream stacks consume segments through [`ZoneSegments`] entries, which
/// keep both segments of a zone together. Pairing is keyed by zone, never by
/// position in two parallel lists, so a reordering of zones cannot silently
/// misalign a bastion with a database in a different zone.
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    /// Import token for the VPC id.
    pub vpc: Value,
    /// One entry per zone, in zone order.
    pub zones: Vec<ZoneSegments>,
}

/// Both segments of one availability zone.
#[derive(Debug, Clone)]
pub struct ZoneSegments {
    pub zone_index: usize,
    /// Import token for the externally reachable segment.
    pub public: Value,
    /// Import token for the internal-only segment.
    pub private: Value,
}

/// Declare the network stack.
///
/// Returns the template together with the [`NetworkHandle`] passed to the
/// downstream stacks.
///
/// # Errors
///
/// Fails if subnet carving runs out of address space or the declared segment
/// count does not come out to two per zone.
pub fn declare(cfg: &Config) -> Result<(Template, NetworkHandle)> {
    let vpc_cidr = cfg.vpc_cidr()?;
    let mut t = Template::new("Isolated network: per-zone public and private segments, no NAT");

    t.insert(
        "Vpc",
        Vpc {
            cidr_block: vpc_cidr,
            enable_dns_support: true,
            enable_dns_hostnames: true,
        }
        .into_resource()?,
    )?;

    // Public segments are reachable from outside: internet gateway plus a
    // shared route table with a default route through it.
    t.insert("InternetGateway", InternetGateway {}.into_resource()?)?;
    t.insert(
        "GatewayAttachment",
        VpcGatewayAttachment {
            vpc_id: ref_to("Vpc"),
            internet_gateway_id: ref_to("InternetGateway"),
        }
        .into_resource()?,
    )?;
    t.insert(
        "PublicRouteTable",
        RouteTable {
            vpc_id: ref_to("Vpc"),
        }
        .into_resource()?,
    )?;
    t.insert(
        "PublicDefaultRoute",
        Route {
            route_table_id: ref_to("PublicRouteTable"),
            destination_cidr_block: Cidr::any(),
            gateway_id: ref_to("InternetGateway"),
        }
        .into_resource()?
        .depends_on("GatewayAttachment"),
    )?;

    t.add_output(
        "VpcId",
        Output::exported(ref_to("Vpc"), VPC_EXPORT),
    );

    let mut zones = Vec::with_capacity(cfg.zone_count);
    for i in 0..cfg.zone_count {
        let public_id = format!("PublicSubnet{i}");
        let private_id = format!("PrivateSubnet{i}");

        // Two segments per zone, carved sequentially from the VPC block.
        let base = u32::try_from(2 * i)?;
        t.insert(
            public_id.clone(),
            Subnet {
                vpc_id: ref_to("Vpc"),
                cidr_block: vpc_cidr.nth_subnet(cfg.subnet_prefix_len, base)?,
                availability_zone: select_az(i),
                map_public_ip_on_launch: true,
            }
            .into_resource()?,
        )?;
        t.insert(
            format!("{public_id}RouteTableAssociation"),
            SubnetRouteTableAssociation {
                subnet_id: ref_to(&public_id),
                route_table_id: ref_to("PublicRouteTable"),
            }
            .into_resource()?,
        )?;
        t.insert(
            private_id.clone(),
            Subnet {
                vpc_id: ref_to("Vpc"),
                cidr_block: vpc_cidr.nth_subnet(cfg.subnet_prefix_len, base + 1)?,
                availability_zone: select_az(i),
                map_public_ip_on_launch: false,
            }
            .into_resource()?,
        )?;

        let public_export = format!("network-zone{i}-public-subnet-id");
        let private_export = format!("network-zone{i}-private-subnet-id");
        t.add_output(
            format!("Zone{i}PublicSubnetId"),
            Output::exported(ref_to(&public_id), public_export.clone()),
        );
        t.add_output(
            format!("Zone{i}PrivateSubnetId"),
            Output::exported(ref_to(&private_id), private_export.clone()),
        );

        zones.push(ZoneSegments {
            zone_index: i,
            public: import_value(&public_export),
            private: import_value(&private_export),
        });
    }

    ensure_two_segments_per_zone(&t, cfg.zone_count)?;

    Ok((
        t,
        NetworkHandle {
            vpc: import_value(VPC_EXPORT),
            zones,
        },
    ))
}

/// Invariant: segment count = 2 × zone count.
fn ensure_two_segments_per_zone(t: &Template, zone_count: usize) -> Result<(), DeclError> {
    let actual = t.resources_of_kind(Subnet::TYPE).count();
    let expected = 2 * zone_count;
    if actual != expected {
        return Err(DeclError::MisalignedZones {
            zones: zone_count,
            expected,
            actual,
        });
    }
    Ok(())
}
