//! Shared declaration types, resource descriptors, and errors for the `infra-synth` stacks.

pub mod cidr;
pub mod error;
pub mod resources;
pub mod template;

pub use cidr::Cidr;
pub use error::DeclError;
