//! Core definitions (errors, result helpers, cancellation), relied upon by all strata-* crates.

pub mod cancellation;
pub mod error;
pub mod macros;
pub mod result;

pub use cancellation::Cancellation;
pub use result::Result;
