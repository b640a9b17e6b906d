//! Security stack: three access-control rule sets over the network.
//!
//! The admin rule set is defined **once** and attached to both the compute
//! group and the bastion group; the two can no longer drift apart. The
//! database group's only allow-source is the bastion group itself — never an
//! address — so the database is unreachable except through a bastion.

use anyhow::Result;
use serde_json::Value;

use common::resources::{Descriptor, IngressRule, SecurityGroup};
use common::template::{import_value, ref_to, Output, Template};
use common::{Cidr, DeclError};

use crate::config::Config;
use crate::stacks::network::NetworkHandle;

pub const SSH_PORT: u16 = 22;
pub const MYSQL_PORT: u16 = 3306;

pub const COMPUTE_SG_EXPORT: &str = "security-compute-sg-id";
pub const BASTION_SG_EXPORT: &str = "security-bastion-sg-id";
pub const DATABASE_SG_EXPORT: &str = "security-database-sg-id";

/// Cross-stack handles to the three rule sets.
#[derive(Debug, Clone)]
pub struct SecurityHandles {
    pub compute: Value,
    pub bastion: Value,
    pub database: Value,
}

/// The shared admin rule set: SSH from each trusted address, nothing else.
fn admin_ingress(trusted: &[Cidr]) -> Vec<IngressRule> {
    trusted
        .iter()
        .map(|cidr| IngressRule::tcp_from_cidr(SSH_PORT, *cidr, "SSH from trusted admin address"))
        .collect()
}

/// Declare the security stack.
///
/// # Errors
///
/// Fails closed, before any resource is declared, if the trusted allow-list
/// is empty or malformed; fails after building if the database group somehow
/// acquired an address-based rule.
pub fn declare(cfg: &Config, net: &NetworkHandle) -> Result<(Template, SecurityHandles)> {
    let trusted = cfg.trusted_cidrs()?;

    // Single definition, two attachments.
    let admin_rules = admin_ingress(&trusted);

    let mut t = Template::new("Access rule sets for compute, bastion, and database tiers");

    t.insert(
        "ComputeSecurityGroup",
        SecurityGroup {
            group_description: "SSH from trusted admin addresses only".into(),
            vpc_id: net.vpc.clone(),
            security_group_ingress: admin_rules.clone(),
        }
        .into_resource()?,
    )?;

    t.insert(
        "BastionSecurityGroup",
        SecurityGroup {
            group_description: "SSH from trusted admin addresses only, bastion tier".into(),
            vpc_id: net.vpc.clone(),
            security_group_ingress: admin_rules,
        }
        .into_resource()?,
    )?;

    let db_rules = vec![IngressRule::tcp_from_group(
        MYSQL_PORT,
        ref_to("BastionSecurityGroup"),
        "MySQL from bastion hosts only",
    )];
    ensure_no_address_sources(&db_rules)?;
    t.insert(
        "DatabaseSecurityGroup",
        SecurityGroup {
            group_description: "MySQL from bastion hosts only".into(),
            vpc_id: net.vpc.clone(),
            security_group_ingress: db_rules,
        }
        .into_resource()?,
    )?;

    t.add_output(
        "ComputeSecurityGroupId",
        Output::exported(ref_to("ComputeSecurityGroup"), COMPUTE_SG_EXPORT),
    );
    t.add_output(
        "BastionSecurityGroupId",
        Output::exported(ref_to("BastionSecurityGroup"), BASTION_SG_EXPORT),
    );
    t.add_output(
        "DatabaseSecurityGroupId",
        Output::exported(ref_to("DatabaseSecurityGroup"), DATABASE_SG_EXPORT),
    );

    Ok((
        t,
        SecurityHandles {
            compute: import_value(COMPUTE_SG_EXPORT),
            bastion: import_value(BASTION_SG_EXPORT),
            database: import_value(DATABASE_SG_EXPORT),
        },
    ))
}

/// Invariant: the database rule set must never contain an address-based rule.
fn ensure_no_address_sources(rules: &[IngressRule]) -> Result<(), DeclError> {
    if rules.iter().any(IngressRule::is_address_based) {
        return Err(DeclError::DirectDatabaseAccess);
    }
    Ok(())
}
