#![doc = "Common types shared across the IO-Link port workspace."]

pub mod config;
pub mod error;
pub mod isdu;
pub mod metrics;
pub mod state;

pub use config::*;
pub use error::*;
pub use isdu::*;
pub use metrics::*;
pub use state::*;
