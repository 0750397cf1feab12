//! Identity & Token Issuer (§4.2): per-session ServiceAccount + Role +
//! RoleBinding + Secret lifecycle, short-lived bearer token minting, and
//! on-demand Git token resolution.

mod error;
mod git_token;
mod provision;

pub use error::ProvisionError;
pub use git_token::{GitTokenResolver, NoopGitTokenResolver};
pub use provision::{ensure, provision};
