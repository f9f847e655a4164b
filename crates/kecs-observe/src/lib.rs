//! Process-wide logging setup for the KECS control plane.

mod logger;
pub use logger::*;
