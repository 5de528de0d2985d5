// Foundation crate: small, well-tested primitives only.
pub mod bounds;
pub mod ids;

pub use bounds::*;
pub use ids::*;
