//! Filter data model for property search.
//!
//! The schema declares every recognized field together with its kind and
//! default, the store holds the current value of each field, and the
//! normalizer turns a store snapshot plus a map viewport into the minimal
//! wire payload.

pub mod error;
pub mod normalize;
pub mod schema;
pub mod store;
pub mod value;

pub use error::*;
pub use normalize::*;
pub use schema::*;
pub use store::*;
pub use value::*;
