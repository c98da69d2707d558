//! Wire types for the hostshell UI boundary.
//!
//! This crate contains the serde-serializable types exchanged between the
//! session core and whatever surface renders it (toolbar, debug console,
//! headless driver). These types represent the shapes of data as they cross
//! that boundary.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization and unit conversion
//! * Unit-tagged: logical and physical rectangles are distinct types
//! * Stable: Changes only when the UI contract changes
//!
//! Orchestration lives in `hostshell`, native plumbing in `hs-runtime`.

pub mod geometry;
pub mod log;
pub mod network;
pub mod status;

pub use geometry::*;
pub use log::*;
pub use network::*;
pub use status::*;
