//! Identity and credential primitives shared across the broker.

pub mod credentials;
pub mod id;

pub use credentials::*;
pub use id::*;
