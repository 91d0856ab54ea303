pub mod cli;
pub mod clients;
pub mod config;
pub mod mapping;
pub mod models;
pub mod reference;
pub mod singer;
pub mod sinks;
pub mod stats;
pub mod target;

// Convenient re-exports for tests and external callers
pub use clients::*;
pub use config::*;
pub use models::*;
pub use reference::*;
pub use sinks::*;
pub use stats::*;
pub use target::*;
