//! Configuration loading and validation for the synthesiser.
//!
//! All deployment parameters are read from environment variables at startup.
//! The process exits with a clear error message before any resource is
//! declared if a required variable is missing or invalid — in particular, the
//! trusted admin allow-list must be supplied externally and must not be
//! empty.

use anyhow::{Context, Result};
use serde::Deserialize;

use common::{Cidr, DeclError};

/// Validated synthesiser configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Comma-separated CIDR blocks allowed to reach instances over SSH.
    /// **Required.** Deployment-specific; never hard-coded in a stack.
    pub trusted_admin_cidrs: String,

    /// Name of a key pair that must already exist in the target environment.
    #[serde(default = "default_key_pair_name")]
    pub key_pair_name: String,

    /// Number of availability zones the network spans.
    #[serde(default = "default_zone_count")]
    pub zone_count: usize,

    /// CIDR block of the whole network.
    #[serde(default = "default_vpc_cidr")]
    pub vpc_cidr: String,

    /// Prefix length of each carved subnet segment.
    #[serde(default = "default_subnet_prefix_len")]
    pub subnet_prefix_len: u8,

    /// Size class for the plain and bastion compute instances.
    #[serde(default = "default_instance_type")]
    pub instance_type: String,

    /// Size class for the database instances.
    #[serde(default = "default_db_instance_class")]
    pub db_instance_class: String,

    /// MySQL engine version for the database instances.
    #[serde(default = "default_db_engine_version")]
    pub db_engine_version: String,

    /// Storage allocation per database instance, in GiB.
    #[serde(default = "default_db_allocated_storage_gib")]
    pub db_allocated_storage_gib: u32,

    /// Username placed in each generated credential record.
    #[serde(default = "default_db_admin_user")]
    pub db_admin_user: String,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_key_pair_name() -> String {
    "bastion".into()
}
fn default_zone_count() -> usize {
    2
}
fn default_vpc_cidr() -> String {
    "10.0.0.0/16".into()
}
fn default_subnet_prefix_len() -> u8 {
    24
}
fn default_instance_type() -> String {
    "t2.micro".into()
}
fn default_db_instance_class() -> String {
    "db.t3.micro".into()
}
fn default_db_engine_version() -> String {
    "8.0".into()
}
fn default_db_allocated_storage_gib() -> u32 {
    20
}
fn default_db_admin_user() -> String {
    "admin".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be
    /// parsed, or if [`Config::validate`] rejects the values.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// The trusted admin allow-list, parsed.
    ///
    /// # Errors
    ///
    /// Returns [`DeclError::EmptyAllowList`] if the list resolves to zero
    /// entries and [`DeclError::InvalidCidr`] for any malformed entry.
    pub fn trusted_cidrs(&self) -> Result<Vec<Cidr>, DeclError> {
        let cidrs = self
            .trusted_admin_cidrs
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Cidr>, DeclError>>()?;
        if cidrs.is_empty() {
            return Err(DeclError::EmptyAllowList);
        }
        Ok(cidrs)
    }

    /// The network's CIDR block, parsed.
    pub fn vpc_cidr(&self) -> Result<Cidr, DeclError> {
        self.vpc_cidr.parse()
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        // Parsed eagerly so a malformed list fails here, not mid-synthesis.
        self.trusted_cidrs()
            .context("TRUSTED_ADMIN_CIDRS is invalid")?;

        let vpc = self.vpc_cidr().context("VPC_CIDR is invalid")?;
        if self.subnet_prefix_len <= vpc.prefix_len() || self.subnet_prefix_len > 28 {
            anyhow::bail!(
                "SUBNET_PREFIX_LEN must be longer than the VPC prefix (/{}) and at most /28",
                vpc.prefix_len()
            );
        }
        if self.zone_count == 0 {
            anyhow::bail!("ZONE_COUNT must be at least 1");
        }
        if self.key_pair_name.trim().is_empty() {
            anyhow::bail!("KEY_PAIR_NAME is required and must not be empty");
        }
        if self.db_allocated_storage_gib == 0 {
            anyhow::bail!("DB_ALLOCATED_STORAGE_GIB must be > 0");
        }
        if self.db_admin_user.trim().is_empty()
            || !self.db_admin_user.chars().all(|c| c.is_ascii_alphanumeric())
        {
            anyhow::bail!("DB_ADMIN_USER must be non-empty and alphanumeric");
        }
        Ok(())
    }

    /// A two-zone configuration with a dummy allow-list, for stack tests.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            trusted_admin_cidrs: "203.0.113.10/32,198.51.100.7/32".into(),
            key_pair_name: default_key_pair_name(),
            zone_count: default_zone_count(),
            vpc_cidr: default_vpc_cidr(),
            subnet_prefix_len: default_subnet_prefix_len(),
            instance_type: default_instance_type(),
            db_instance_class: default_db_instance_class(),
            db_engine_version: default_db_engine_version(),
            db_allocated_storage_gib: default_db_allocated_storage_gib(),
            db_admin_user: default_db_admin_user(),
            log_level: default_log_level(),
        }
    }
}
