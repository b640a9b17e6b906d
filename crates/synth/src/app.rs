//! Stack assembly: fixed declaration order, structural validation, and
//! template file output.
//!
//! The three stacks form a strict dependency chain. Validation runs before
//! anything is written and fails closed: an unresolved reference, an import
//! with no matching earlier export, or a broken zone layout stops the run
//! with nothing emitted.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use common::resources::{Descriptor, Subnet};
use common::template::Template;
use common::DeclError;

use crate::config::Config;
use crate::stacks;

pub const NETWORK_STACK: &str = "network-stack";
pub const SECURITY_STACK: &str = "security-stack";
pub const WORKLOAD_STACK: &str = "workload-stack";

/// The whole declaration: configuration in, three templates out.
pub struct App {
    cfg: Config,
}

/// A synthesised stack, named for the provisioning tool.
pub struct NamedTemplate {
    pub name: String,
    pub template: Template,
}

/// All stacks of one synthesis run, in declaration order.
pub struct Assembly {
    pub stacks: Vec<NamedTemplate>,
}

impl App {
    pub fn new(cfg: Config) -> Self {
        Self { cfg }
    }

    /// Build all three stacks in dependency order and validate the result.
    ///
    /// # Errors
    ///
    /// Returns the first declaration or validation failure; no partial
    /// assembly is ever returned.
    pub fn synth(&self) -> Result<Assembly> {
        let (network, net) = stacks::network::declare(&self.cfg)?;
        debug!(stack = NETWORK_STACK, "declared");
        let (security, sec) = stacks::security::declare(&self.cfg, &net)?;
        debug!(stack = SECURITY_STACK, "declared");
        let workload = stacks::workload::declare(&self.cfg, &net, &sec)?;
        debug!(stack = WORKLOAD_STACK, "declared");

        let assembly = Assembly {
            stacks: vec![
                NamedTemplate {
                    name: NETWORK_STACK.into(),
                    template: network,
                },
                NamedTemplate {
                    name: SECURITY_STACK.into(),
                    template: security,
                },
                NamedTemplate {
                    name: WORKLOAD_STACK.into(),
                    template: workload,
                },
            ],
        };
        assembly.validate(self.cfg.zone_count)?;
        Ok(assembly)
    }
}

impl Assembly {
    /// Structural validation over the emitted declaration graph.
    pub fn validate(&self, zone_count: usize) -> Result<(), DeclError> {
        let mut exports: BTreeSet<String> = BTreeSet::new();

        for stack in &self.stacks {
            let ids: BTreeSet<&str> = stack.template.resources.keys().map(String::as_str).collect();

            for (logical_id, resource) in &stack.template.resources {
                let mut refs = Vec::new();
                let mut imports = Vec::new();
                collect_tokens(&resource.properties, &mut refs, &mut imports);
                refs.extend(resource.depends_on.iter().cloned());

                for target in refs {
                    if !ids.contains(target.as_str()) {
                        return Err(DeclError::UnresolvedReference {
                            stack: stack.name.clone(),
                            resource: logical_id.clone(),
                            target,
                        });
                    }
                }
                for export in imports {
                    if !exports.contains(&export) {
                        return Err(DeclError::UnresolvedImport {
                            stack: stack.name.clone(),
                            export,
                        });
                    }
                }
            }

            for output in stack.template.outputs.values() {
                let mut refs = Vec::new();
                let mut imports = Vec::new();
                collect_tokens(&output.value, &mut refs, &mut imports);
                for target in refs {
                    if !ids.contains(target.as_str()) {
                        return Err(DeclError::UnresolvedReference {
                            stack: stack.name.clone(),
                            resource: "<output>".into(),
                            target,
                        });
                    }
                }
            }

            // Imports only resolve against stacks declared earlier, so the
            // three-stage chain stays strict.
            exports.extend(stack.template.export_names().map(str::to_owned));
        }

        self.check_zone_layout(zone_count)
    }

    fn check_zone_layout(&self, zone_count: usize) -> Result<(), DeclError> {
        let Some(network) = self.stacks.iter().find(|s| s.name == NETWORK_STACK) else {
            return Ok(());
        };
        let mut public = 0usize;
        let mut private = 0usize;
        for (_, subnet) in network.template.resources_of_kind(Subnet::TYPE) {
            match subnet.properties["MapPublicIpOnLaunch"].as_bool() {
                Some(true) => public += 1,
                _ => private += 1,
            }
        }
        if public != zone_count || private != zone_count {
            return Err(DeclError::MisalignedZones {
                zones: zone_count,
                expected: 2 * zone_count,
                actual: public + private,
            });
        }
        Ok(())
    }

    /// Write one `<stack>.template.json` per stack into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or a file cannot
    /// be written.
    pub fn write_to(&self, dir: &Path, pretty: bool) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;

        let mut written = Vec::with_capacity(self.stacks.len());
        for stack in &self.stacks {
            let path = dir.join(format!("{}.template.json", stack.name));
            let body = if pretty {
                serde_json::to_string_pretty(&stack.template)?
            } else {
                serde_json::to_string(&stack.template)?
            };
            fs::write(&path, body)
                .with_context(|| format!("failed to write {}", path.display()))?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Walk a property tree, collecting same-stack reference targets and
/// cross-stack import names.
///
/// Recognised intrinsics: `Ref`, `Fn::GetAtt`, `Fn::ImportValue`, and
/// `${Name}` substitutions inside `Fn::Sub` (pseudo-parameters containing
/// `::` are skipped).
fn collect_tokens(value: &Value, refs: &mut Vec<String>, imports: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                match (key.as_str(), inner) {
                    ("Ref", Value::String(target)) => refs.push(target.clone()),
                    ("Fn::GetAtt", Value::Array(parts)) => {
                        if let Some(Value::String(target)) = parts.first() {
                            refs.push(target.clone());
                        }
                    }
                    ("Fn::ImportValue", Value::String(name)) => imports.push(name.clone()),
                    ("Fn::Sub", Value::String(text)) => refs.extend(sub_variables(text)),
                    _ => collect_tokens(inner, refs, imports),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_tokens(item, refs, imports);
            }
        }
        _ => {}
    }
}

/// The `${Name}` variables of an `Fn::Sub` string.
fn sub_variables(text: &str) -> Vec<String> {
    let mut vars = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else { break };
        let name = &after[..end];
        if !name.contains("::") && !name.starts_with('!') {
            vars.push(name.to_owned());
        }
        rest = &after[end + 1..];
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::template::import_value;
    use serde_json::json;

    fn synth() -> Assembly {
        App::new(Config::for_tests()).synth().unwrap()
    }

    #[test]
    fn stacks_come_out_in_dependency_order() {
        let assembly = synth();
        let names: Vec<&str> = assembly.stacks.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![NETWORK_STACK, SECURITY_STACK, WORKLOAD_STACK]);
    }

    #[test]
    fn every_import_resolves_to_an_earlier_export() {
        // synth() already validates; this asserts it stays green end to end.
        let assembly = synth();
        assert!(assembly.validate(2).is_ok());
    }

    #[test]
    fn declaration_outputs_are_the_network_and_rule_set_handles_only() {
        let assembly = synth();
        let exports: Vec<&str> = assembly
            .stacks
            .iter()
            .flat_map(|s| s.template.export_names())
            .collect();
        // VPC + 2x2 segment exports + 3 rule sets; workload exports nothing.
        assert_eq!(exports.len(), 8);
        assert_eq!(assembly.stacks[2].template.export_names().count(), 0);
    }

    #[test]
    fn validate_rejects_import_with_no_exporter() {
        let mut assembly = synth();
        assembly.stacks[2]
            .template
            .insert(
                "Rogue",
                common::template::Resource {
                    kind: "AWS::EC2::Instance".into(),
                    properties: json!({ "SubnetId": import_value("no-such-export") }),
                    deletion_policy: None,
                    depends_on: Vec::new(),
                },
            )
            .unwrap();

        let err = assembly.validate(2).unwrap_err();
        assert!(matches!(err, DeclError::UnresolvedImport { export, .. } if export == "no-such-export"));
    }

    #[test]
    fn validate_rejects_dangling_local_reference() {
        let mut assembly = synth();
        assembly.stacks[0]
            .template
            .insert(
                "Rogue",
                common::template::Resource {
                    kind: "AWS::EC2::Route".into(),
                    properties: json!({ "GatewayId": { "Ref": "NoSuchGateway" } }),
                    deletion_policy: None,
                    depends_on: Vec::new(),
                },
            )
            .unwrap();

        let err = assembly.validate(2).unwrap_err();
        assert!(matches!(err, DeclError::UnresolvedReference { target, .. } if target == "NoSuchGateway"));
    }

    #[test]
    fn validate_checks_sub_variables() {
        let mut assembly = synth();
        assembly.stacks[2]
            .template
            .insert(
                "Rogue",
                common::template::Resource {
                    kind: "AWS::RDS::DBInstance".into(),
                    properties: json!({
                        "MasterUsername": common::template::secret_value("MissingSecret", "username")
                    }),
                    deletion_policy: None,
                    depends_on: Vec::new(),
                },
            )
            .unwrap();

        let err = assembly.validate(2).unwrap_err();
        assert!(matches!(err, DeclError::UnresolvedReference { target, .. } if target == "MissingSecret"));
    }

    #[test]
    fn validate_follows_get_att_targets() {
        let mut assembly = synth();
        assembly.stacks[0]
            .template
            .insert(
                "Rogue",
                common::template::Resource {
                    kind: "AWS::EC2::Route".into(),
                    properties: json!({
                        "GatewayId": common::template::get_att("NoSuchGateway", "InternetGatewayId")
                    }),
                    deletion_policy: None,
                    depends_on: Vec::new(),
                },
            )
            .unwrap();

        let err = assembly.validate(2).unwrap_err();
        assert!(matches!(err, DeclError::UnresolvedReference { target, .. } if target == "NoSuchGateway"));
    }

    #[test]
    fn validate_rejects_zone_without_private_segment() {
        let mut assembly = synth();
        let subnet = assembly.stacks[0]
            .template
            .resources
            .get_mut("PrivateSubnet1")
            .unwrap();
        subnet.properties["MapPublicIpOnLaunch"] = json!(true);

        let err = assembly.validate(2).unwrap_err();
        assert!(matches!(err, DeclError::MisalignedZones { zones: 2, .. }));
    }

    #[test]
    fn sub_variables_skips_pseudo_parameters() {
        let vars = sub_variables("${AWS::Region}-${RdsSecret0}-${AWS::AccountId}");
        assert_eq!(vars, vec!["RdsSecret0"]);
    }

    #[test]
    fn write_to_emits_one_file_per_stack() {
        let dir = tempfile::tempdir().unwrap();
        let assembly = synth();
        let written = assembly.write_to(dir.path(), true).unwrap();
        assert_eq!(written.len(), 3);
        for path in &written {
            let text = fs::read_to_string(path).unwrap();
            let parsed: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(parsed["AWSTemplateFormatVersion"], "2010-09-09");
        }
        assert!(dir.path().join("network-stack.template.json").exists());
    }

    #[test]
    fn single_zone_assembly_is_valid() {
        let mut cfg = Config::for_tests();
        cfg.zone_count = 1;
        let assembly = App::new(cfg).synth().unwrap();
        assert_eq!(
            assembly.stacks[2]
                .template
                .resources_of_kind("AWS::RDS::DBInstance")
                .count(),
            1
        );
    }
}
