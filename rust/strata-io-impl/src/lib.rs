//! Common implementations of the `strata-io` abstractions.

pub mod budget;
pub mod temp_file_store;
