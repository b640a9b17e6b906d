//! Workload stack: per-zone compute instances, bastion hosts, generated
//! credentials, and database instances.
//!
//! For every zone in the [`NetworkHandle`] this declares:
//!
//! - one plain instance in the public segment (compute rule set, dynamic
//!   public address, shared key pair);
//! - one bastion in the same zone's public segment, with a static address
//!   bound to it for the instance's lifetime;
//! - one credential record whose secret value is generated by the secrets
//!   store at creation;
//! - one database instance pinned to the zone's private segment, single-AZ,
//!   with a destructive teardown policy.
//!
//! The stack exports nothing: its declarations are terminal.

use anyhow::Result;
use serde_json::Value;

use common::resources::{
    latest_amazon_linux2, DbInstance, DbSubnetGroup, Descriptor, Eip, GenerateSecretString,
    Instance, Secret,
};
use common::template::{ref_to, secret_value, select_az, DeletionPolicy, Template};

use crate::config::Config;
use crate::stacks::network::{NetworkHandle, ZoneSegments};
use crate::stacks::security::SecurityHandles;

/// Declare the workload stack.
///
/// # Errors
///
/// Fails if any descriptor cannot be serialised or a logical id collides.
pub fn declare(cfg: &Config, net: &NetworkHandle, sec: &SecurityHandles) -> Result<Template> {
    let mut t = Template::new("Per-zone compute instances, bastion hosts, and databases");

    // One subnet grouping over all internal segments, shared by every
    // database instance.
    t.insert(
        "RdsSubnetGroup",
        DbSubnetGroup {
            db_subnet_group_description: "Internal segments across all zones".into(),
            subnet_ids: net.zones.iter().map(|z| z.private.clone()).collect(),
        }
        .into_resource()?,
    )?;

    for zone in &net.zones {
        declare_zone(cfg, &mut t, zone, sec)?;
    }

    Ok(t)
}

fn declare_zone(
    cfg: &Config,
    t: &mut Template,
    zone: &ZoneSegments,
    sec: &SecurityHandles,
) -> Result<()> {
    let i = zone.zone_index;

    t.insert(
        format!("PublicInstance{i}"),
        host(cfg, zone.public.clone(), sec.compute.clone()).into_resource()?,
    )?;

    let bastion_id = format!("BastionHost{i}");
    t.insert(
        bastion_id.clone(),
        host(cfg, zone.public.clone(), sec.bastion.clone()).into_resource()?,
    )?;
    // The static address is bound to this instance id for its lifetime.
    // Replacing the instance hands the allocation to the replacement's id.
    t.insert(
        format!("BastionEip{i}"),
        Eip {
            domain: "vpc".into(),
            instance_id: ref_to(&bastion_id),
        }
        .into_resource()?,
    )?;

    let secret_id = format!("RdsSecret{i}");
    t.insert(
        secret_id.clone(),
        Secret {
            name: format!("rds-credentials-zone{i}"),
            generate_secret_string: GenerateSecretString {
                secret_string_template: serde_json::to_string(
                    &serde_json::json!({ "username": cfg.db_admin_user }),
                )?,
                generate_string_key: "password".into(),
                exclude_punctuation: true,
            },
        }
        .into_resource()?,
    )?;

    t.insert(
        format!("RdsInstance{i}"),
        DbInstance {
            engine: "mysql".into(),
            engine_version: cfg.db_engine_version.clone(),
            db_instance_class: cfg.db_instance_class.clone(),
            allocated_storage: cfg.db_allocated_storage_gib,
            availability_zone: select_az(i),
            db_subnet_group_name: ref_to("RdsSubnetGroup"),
            vpc_security_group_ids: vec![sec.database.clone()],
            master_username: secret_value(&secret_id, "username"),
            master_user_password: secret_value(&secret_id, "password"),
            multi_az: false,
        }
        .into_resource()?
        .with_deletion_policy(DeletionPolicy::Delete),
    )?;

    Ok(())
}

/// A public-segment instance: shared key pair, dynamic public address.
fn host(cfg: &Config, subnet: Value, security_group: Value) -> Instance {
    Instance {
        instance_type: cfg.instance_type.clone(),
        image_id: latest_amazon_linux2(),
        key_name: cfg.key_pair_name.clone(),
        subnet_id: subnet,
        security_group_ids: vec![security_group],
        associate_public_ip_address: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::{network, security};

    fn synth() -> Template {
        let cfg = Config::for_tests();
        let (_, net) = network::declare(&cfg).unwrap();
        let (_, sec) = security::declare(&cfg, &net).unwrap();
        declare(&cfg, &net, &sec).unwrap()
    }

    #[test]
    fn one_bastion_and_one_database_per_zone() {
        let t = synth();
        for i in 0..2 {
            assert!(t.resources.contains_key(&format!("BastionHost{i}")));
            assert!(t.resources.contains_key(&format!("RdsInstance{i}")));
        }
        assert_eq!(t.resources_of_kind(DbInstance::TYPE).count(), 2);
        // Plain + bastion per zone.
        assert_eq!(t.resources_of_kind(Instance::TYPE).count(), 4);
    }

    #[test]
    fn bastion_and_plain_instance_share_the_zone_public_segment() {
        let t = synth();
        for i in 0..2 {
            let expected = format!("network-zone{i}-public-subnet-id");
            for id in [format!("PublicInstance{i}"), format!("BastionHost{i}")] {
                assert_eq!(
                    t.resources[&id].properties["SubnetId"]["Fn::ImportValue"],
                    expected.as_str()
                );
            }
        }
    }

    #[test]
    fn database_is_pinned_to_the_zone_of_its_bastion() {
        let t = synth();
        for i in 0..2 {
            assert_eq!(
                t.resources[&format!("RdsInstance{i}")].properties["AvailabilityZone"]
                    ["Fn::Select"][0],
                i
            );
        }
    }

    #[test]
    fn every_bastion_gets_a_static_address() {
        let t = synth();
        for i in 0..2 {
            let eip = &t.resources[&format!("BastionEip{i}")];
            assert_eq!(eip.properties["InstanceId"]["Ref"], format!("BastionHost{i}"));
        }
    }

    #[test]
    fn credentials_are_generated_without_punctuation() {
        let t = synth();
        let secrets: Vec<_> = t.resources_of_kind(Secret::TYPE).collect();
        assert_eq!(secrets.len(), 2);
        for (_, secret) in secrets {
            let gen = &secret.properties["GenerateSecretString"];
            assert_eq!(gen["ExcludePunctuation"], true);
            assert_eq!(gen["GenerateStringKey"], "password");
            assert_eq!(
                gen["SecretStringTemplate"],
                "{\"username\":\"admin\"}"
            );
        }
    }

    #[test]
    fn no_secret_value_appears_in_the_template_text() {
        let t = synth();
        let text = serde_json::to_string(&t).unwrap();
        assert!(!text.contains("MasterUserPassword\":\""));
        assert!(text.contains("{{resolve:secretsmanager:"));
    }

    #[test]
    fn databases_are_single_az_with_destructive_teardown() {
        let t = synth();
        for (_, db) in t.resources_of_kind(DbInstance::TYPE) {
            assert_eq!(db.properties["MultiAz"], false);
            assert_eq!(db.properties["AllocatedStorage"], 20);
            assert_eq!(db.deletion_policy, Some(DeletionPolicy::Delete));
        }
    }

    #[test]
    fn subnet_group_spans_every_private_segment() {
        let t = synth();
        let ids = t.resources["RdsSubnetGroup"].properties["SubnetIds"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(ids.len(), 2);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(
                id["Fn::ImportValue"],
                format!("network-zone{i}-private-subnet-id")
            );
        }
    }

    #[test]
    fn workload_stack_exports_nothing() {
        let t = synth();
        assert_eq!(t.export_names().count(), 0);
    }

    #[test]
    fn key_pair_is_referenced_by_name_only() {
        let t = synth();
        for (_, inst) in t.resources_of_kind(Instance::TYPE) {
            assert_eq!(inst.properties["KeyName"], "bastion");
        }
    }
}
