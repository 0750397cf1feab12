//! Cluster Gateway: the thin abstraction every other component uses to talk
//! to the cluster, in two client modes (backend identity, caller-impersonated)
//! with typed accessors for well-known kinds and a dynamic accessor for the
//! `AgenticSession` custom resource.

mod error;
pub mod gateway;
pub mod resources;

pub use error::GatewayError;
pub use gateway::{CallerIdentity, ClientMode, Gateway};
