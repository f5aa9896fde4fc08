//! volimport shared - types used by the import library, its CLI and tests.
//!
//! This crate contains the error taxonomy and the constants that must agree
//! between the pipeline and whatever drives it.

pub mod constants;
pub mod errors;

pub use errors::{ImportError, ImportResult};
