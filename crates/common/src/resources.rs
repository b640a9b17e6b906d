//! Typed resource descriptors for everything the three stacks declare.
//!
//! Each descriptor serialises into the `Properties` block of a generic
//! [`Resource`] via [`Descriptor::into_resource`]. Property names use the
//! provider's PascalCase spelling.
//!
//! # Module invariants
//!
//! - **No secret material.** Descriptors carry *references* to credentials
//!   (dynamic secret lookups, key-pair names), never the values themselves.
//! - An [`IngressRule`] permits either an address source or a group source,
//!   never both.

use serde::Serialize;
use serde_json::Value;

use crate::cidr::Cidr;
use crate::template::Resource;

/// A typed descriptor that lowers into the generic template [`Resource`].
pub trait Descriptor: Serialize {
    /// Provider resource type, e.g. `"AWS::EC2::VPC"`.
    const TYPE: &'static str;

    /// Lower this descriptor into a template resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the properties fail to serialise to JSON.
    fn into_resource(self) -> Result<Resource, serde_json::Error>
    where
        Self: Sized,
    {
        Ok(Resource {
            kind: Self::TYPE.to_owned(),
            properties: serde_json::to_value(self)?,
            deletion_policy: None,
            depends_on: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Vpc {
    pub cidr_block: Cidr,
    pub enable_dns_support: bool,
    pub enable_dns_hostnames: bool,
}

impl Descriptor for Vpc {
    const TYPE: &'static str = "AWS::EC2::VPC";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Subnet {
    pub vpc_id: Value,
    pub cidr_block: Cidr,
    pub availability_zone: Value,
    pub map_public_ip_on_launch: bool,
}

impl Descriptor for Subnet {
    const TYPE: &'static str = "AWS::EC2::Subnet";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InternetGateway {}

impl Descriptor for InternetGateway {
    const TYPE: &'static str = "AWS::EC2::InternetGateway";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcGatewayAttachment {
    pub vpc_id: Value,
    pub internet_gateway_id: Value,
}

impl Descriptor for VpcGatewayAttachment {
    const TYPE: &'static str = "AWS::EC2::VPCGatewayAttachment";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteTable {
    pub vpc_id: Value,
}

impl Descriptor for RouteTable {
    const TYPE: &'static str = "AWS::EC2::RouteTable";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Route {
    pub route_table_id: Value,
    pub destination_cidr_block: Cidr,
    pub gateway_id: Value,
}

impl Descriptor for Route {
    const TYPE: &'static str = "AWS::EC2::Route";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubnetRouteTableAssociation {
    pub subnet_id: Value,
    pub route_table_id: Value,
}

impl Descriptor for SubnetRouteTableAssociation {
    const TYPE: &'static str = "AWS::EC2::SubnetRouteTableAssociation";
}

// ---------------------------------------------------------------------------
// Security groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityGroup {
    pub group_description: String,
    pub vpc_id: Value,
    pub security_group_ingress: Vec<IngressRule>,
}

impl Descriptor for SecurityGroup {
    const TYPE: &'static str = "AWS::EC2::SecurityGroup";
}

/// One inbound allow-rule. The source is either an address block or another
/// security group; the constructors keep the two mutually exclusive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IngressRule {
    pub ip_protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_ip: Option<Cidr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_security_group_id: Option<Value>,
    pub description: String,
}

impl IngressRule {
    /// Allow TCP traffic on `port` from an address block.
    pub fn tcp_from_cidr(port: u16, cidr: Cidr, description: impl Into<String>) -> Self {
        Self {
            ip_protocol: "tcp".into(),
            from_port: port,
            to_port: port,
            cidr_ip: Some(cidr),
            source_security_group_id: None,
            description: description.into(),
        }
    }

    /// Allow TCP traffic on `port` from members of another security group.
    pub fn tcp_from_group(port: u16, group_id: Value, description: impl Into<String>) -> Self {
        Self {
            ip_protocol: "tcp".into(),
            from_port: port,
            to_port: port,
            cidr_ip: None,
            source_security_group_id: Some(group_id),
            description: description.into(),
        }
    }

    /// `true` if this rule's source is an address block rather than a group.
    pub fn is_address_based(&self) -> bool {
        self.cidr_ip.is_some()
    }
}

// ---------------------------------------------------------------------------
// Compute
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Instance {
    pub instance_type: String,
    pub image_id: Value,
    /// Name of a key pair that must already exist in the target environment.
    pub key_name: String,
    pub subnet_id: Value,
    pub security_group_ids: Vec<Value>,
    pub associate_public_ip_address: bool,
}

impl Descriptor for Instance {
    const TYPE: &'static str = "AWS::EC2::Instance";
}

/// Image reference resolving to the latest Amazon Linux 2 AMI at apply time,
/// via the provider's public SSM parameter.
pub fn latest_amazon_linux2() -> Value {
    Value::String(
        "{{resolve:ssm:/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-x86_64-gp2}}".into(),
    )
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Eip {
    pub domain: String,
    pub instance_id: Value,
}

impl Descriptor for Eip {
    const TYPE: &'static str = "AWS::EC2::EIP";
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Secret {
    pub name: String,
    pub generate_secret_string: GenerateSecretString,
}

impl Descriptor for Secret {
    const TYPE: &'static str = "AWS::SecretsManager::Secret";
}

/// Instructs the secrets store to generate the credential value at creation
/// time. The declaration only ever carries this recipe, not the value.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GenerateSecretString {
    pub secret_string_template: String,
    pub generate_string_key: String,
    pub exclude_punctuation: bool,
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbSubnetGroup {
    pub db_subnet_group_description: String,
    pub subnet_ids: Vec<Value>,
}

impl Descriptor for DbSubnetGroup {
    const TYPE: &'static str = "AWS::RDS::DBSubnetGroup";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbInstance {
    pub engine: String,
    pub engine_version: String,
    pub db_instance_class: String,
    pub allocated_storage: u32,
    pub availability_zone: Value,
    pub db_subnet_group_name: Value,
    pub vpc_security_group_ids: Vec<Value>,
    pub master_username: Value,
    pub master_user_password: Value,
    pub multi_az: bool,
}

impl Descriptor for DbInstance {
    const TYPE: &'static str = "AWS::RDS::DBInstance";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{ref_to, secret_value};

    #[test]
    fn descriptor_lowers_with_pascal_case_properties() {
        let vpc = Vpc {
            cidr_block: "10.0.0.0/16".parse().unwrap(),
            enable_dns_support: true,
            enable_dns_hostnames: true,
        };
        let r = vpc.into_resource().unwrap();
        assert_eq!(r.kind, "AWS::EC2::VPC");
        assert_eq!(r.properties["CidrBlock"], "10.0.0.0/16");
        assert_eq!(r.properties["EnableDnsSupport"], true);
    }

    #[test]
    fn ingress_rule_sources_are_exclusive() {
        let by_addr = IngressRule::tcp_from_cidr(22, "203.0.113.10/32".parse().unwrap(), "ssh");
        assert!(by_addr.is_address_based());
        assert!(by_addr.source_security_group_id.is_none());

        let by_group = IngressRule::tcp_from_group(3306, ref_to("BastionSecurityGroup"), "mysql");
        assert!(!by_group.is_address_based());
        assert!(by_group.cidr_ip.is_none());
    }

    #[test]
    fn address_rule_omits_group_field_in_json() {
        let rule = IngressRule::tcp_from_cidr(22, "203.0.113.10/32".parse().unwrap(), "ssh");
        let v = serde_json::to_value(&rule).unwrap();
        assert_eq!(v["CidrIp"], "203.0.113.10/32");
        assert!(v.get("SourceSecurityGroupId").is_none());
    }

    #[test]
    fn secret_declares_generation_recipe_only() {
        let s = Secret {
            name: "rds-credentials-zone0".into(),
            generate_secret_string: GenerateSecretString {
                secret_string_template: "{\"username\":\"admin\"}".into(),
                generate_string_key: "password".into(),
                exclude_punctuation: true,
            },
        };
        let r = s.into_resource().unwrap();
        let gen = &r.properties["GenerateSecretString"];
        assert_eq!(gen["ExcludePunctuation"], true);
        assert_eq!(gen["GenerateStringKey"], "password");
        // No literal password anywhere in the properties.
        assert!(!r.properties.to_string().contains("Password\":\""));
    }

    #[test]
    fn db_instance_credentials_are_dynamic_references() {
        let db = DbInstance {
            engine: "mysql".into(),
            engine_version: "8.0".into(),
            db_instance_class: "db.t3.micro".into(),
            allocated_storage: 20,
            availability_zone: crate::template::select_az(0),
            db_subnet_group_name: ref_to("RdsSubnetGroup"),
            vpc_security_group_ids: vec![ref_to("DatabaseSecurityGroup")],
            master_username: secret_value("RdsSecret0", "username"),
            master_user_password: secret_value("RdsSecret0", "password"),
            multi_az: false,
        };
        let r = db.into_resource().unwrap();
        let pw = r.properties["MasterUserPassword"]["Fn::Sub"]
            .as_str()
            .unwrap();
        assert!(pw.starts_with("{{resolve:secretsmanager:"));
    }
}
