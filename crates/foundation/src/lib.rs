pub mod frame;
pub mod range;

// Foundation crate: small, well-tested primitives only.
pub use frame::*;
pub use range::*;
