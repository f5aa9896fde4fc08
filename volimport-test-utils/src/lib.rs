//! Test doubles and fixtures shared by the volimport test suites.
//!
//! - `MockDataProvider` / `MockResumableDataProvider` - scripted providers recording the phases they ran
//! - `FakeImageOperations` - in-memory image tool with per-operation failure injection
//! - `FakeSpaceProbe` - reports fixed capacities and records what was probed
//! - `fixtures` - temp directory layouts and real qcow2 images

pub mod fixtures;
pub mod image;
pub mod provider;
pub mod space;

pub use fixtures::ImportDirs;
pub use image::{FakeImageOperations, Op};
pub use provider::{MockDataProvider, MockResumableDataProvider};
pub use space::FakeSpaceProbe;
