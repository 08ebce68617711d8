//! Strata build driver library
//!
//! Glue between the `strata` command line and the project crate: running
//! the configured compiler command and rendering its diagnostics.

pub mod external;
pub mod report;

pub use external::ExternalCompiler;
