//! Content Access Router and Temp Content Pod Manager (§4.5, §4.6).

pub mod error;
pub mod router;
pub mod temp_pod;

pub use error::ContentRouterError;
pub use router::{resolve_forward_auth, ContentRouter, ForwardAuth};
