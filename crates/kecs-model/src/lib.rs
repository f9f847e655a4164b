//! Domain and wire types shared by the KECS control plane crates.
//!
//! Everything here serializes in the camelCase shape the ECS JSON protocol uses,
//! so the same types travel through storage, the engine and the HTTP surface.

mod domain;
pub use domain::*;

pub mod api;
