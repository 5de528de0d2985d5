pub mod client;
pub mod inflight;
pub mod protocol;

pub use client::*;
pub use inflight::*;
pub use protocol::*;
