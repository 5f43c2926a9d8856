//! Remote store boundary
//!
//! Submodules:
//! - `client`: the `DocStore` trait the filesystem core is written against
//! - `http`: transport for a HackMD-compatible HTTP API
//! - `mock`: in-memory backend for unit tests and local development
//!
//! Everything above this module talks to the note service only through
//! [`client::DocStore`]; session handling and JSON decoding stay in here.

pub mod client;
pub mod http;
pub mod mock;
