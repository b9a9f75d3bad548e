//! Signed delegation grants and the namespaced trust graph.
//!
//! A grant is a signed statement that one identity extends scopes over a
//! namespace to another identity, possibly with further delegation. The
//! trust graph indexes grants by the path decomposition of their grantee
//! and resolves authorization queries by walking delegation edges until a
//! grant whose subject contains the target namespace permits the scope.

pub mod error;
pub use error::Error;

pub mod chain;
pub mod grant;
pub mod graph;

pub use chain::ChainAuthority;
pub use grant::Grant;
pub use graph::{is_sub_name, Clock, SystemClock, TrustGraph, EXPIRATION_GRACE_SECS};
