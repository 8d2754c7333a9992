//! Instance store backends.

pub mod filesystem;
