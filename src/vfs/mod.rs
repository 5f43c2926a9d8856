//! Virtual filesystem core: naming, nodes, and the root directory.
//!
//! Submodules:
//! - `namespace`: turns the raw document listing into unique entry names
//! - `node`: per-open document buffers and the scratch file
//! - `dir`: the root directory; owns the current name generation

pub mod dir;
pub mod namespace;
pub mod node;
