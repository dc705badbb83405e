//! Module loading system
//!
//! Resolution state machine, caches and transformer registration.

pub mod loader;

pub use loader::{ModuleLoader, NullParent};
