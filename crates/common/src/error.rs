//! Declaration-layer error types shared across crates.

use thiserror::Error;

/// Errors raised while building or validating the declaration graph.
///
/// Every variant is a **fail-closed** rejection: synthesis stops before any
/// template is written, so the provisioning tool never sees a partial or
/// unsound declaration.
#[derive(Debug, Error)]
pub enum DeclError {
    /// A CIDR string could not be parsed into a valid IPv4 block.
    #[error("invalid CIDR block {0:?}: {1}")]
    InvalidCidr(String, String),

    /// The trusted admin allow-list resolved to zero entries.
    #[error("trusted admin allow-list is empty; refusing to declare security groups without a source restriction")]
    EmptyAllowList,

    /// Two resources in the same stack were given the same logical id.
    #[error("duplicate logical id {0:?}")]
    DuplicateLogicalId(String),

    /// A resource references a logical id that does not exist in its stack.
    #[error("resource {resource:?} in stack {stack:?} references unknown logical id {target:?}")]
    UnresolvedReference {
        stack: String,
        resource: String,
        target: String,
    },

    /// A stack imports a value that no earlier stack exports.
    #[error("stack {stack:?} imports {export:?}, which no earlier stack exports")]
    UnresolvedImport { stack: String, export: String },

    /// The network declaration does not pair one public with one private
    /// segment per zone.
    #[error("zone layout invalid: expected {expected} subnet segments for {zones} zones, found {actual}")]
    MisalignedZones {
        zones: usize,
        expected: usize,
        actual: usize,
    },

    /// The database security group carries an address-based allow rule.
    #[error("database security group declares an address-based allow rule; only the bastion group may be a source")]
    DirectDatabaseAccess,

    /// A requested subnet does not fit inside its parent block.
    #[error("subnet carve out of range: block {block} cannot hold subnet index {index} at /{prefix_len}")]
    SubnetOutOfRange {
        block: String,
        prefix_len: u8,
        index: u32,
    },
}
