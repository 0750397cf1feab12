//! Lifecycle Reconciler (§4.3): the Session state machine and the
//! API-triggered transitions (create/start/stop/delete/clone/patch/update).
//! The operator that watches Jobs/Pods and advances Creating -> Running ->
//! {Completed,Failed} is out of scope; this module owns the transitions
//! triggered by the HTTP API and the bookkeeping around them.

mod clone_session;
mod create;
mod delete;
mod error;
mod patch;
mod phase;
mod start;
mod stop;
mod update;

pub use clone_session::{clone, generate_clone_name};
pub use create::{create, CreateOptions};
pub use delete::delete;
pub use error::LifecycleError;
pub use patch::patch_annotations;
pub use phase::Phase;
pub use start::start;
pub use stop::{stop, StopOutcome};
pub use update::{update_display_name, update_spec, UpdateSpecOptions};
