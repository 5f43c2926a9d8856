// Library crate for notefs: re-export internal modules for reuse by tests and external bins.

pub mod fuse;
pub mod store;
pub mod vfs;
