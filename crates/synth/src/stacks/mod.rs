//! The three stack builders, in strict dependency order:
//! network → security → workload.

pub mod network;
pub mod security;
pub mod workload;
