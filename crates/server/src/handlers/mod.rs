//! HTTP request handlers.

pub mod health;
pub mod stow;

pub use health::*;
pub use stow::*;
