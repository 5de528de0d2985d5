//! Filter query coordination: debounce, supersession and result publication.

pub mod coordinator;
pub mod metrics;
pub mod publisher;
pub mod scheduler;
pub mod viewport;

pub use coordinator::*;
pub use metrics::{Metrics, MetricsSnapshot};
pub use publisher::*;
pub use scheduler::*;
pub use viewport::*;
