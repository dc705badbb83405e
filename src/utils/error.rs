//! Error handling utilities for graceful degradation
//!
//! Best-effort steps of module loading (dumping, plugin registration) log
//! their failures and let resolution carry on.

use tracing::warn;

/// Execute an operation and log errors without failing
///
/// Returns `Some(T)` on success, `None` on error (after logging).
///
/// # Example
/// ```rust
/// use modloader::utils::log_error;
///
/// let result = log_error(|| std::fs::read("missing.mod"), "Failed to read image");
/// assert!(result.is_none());
/// ```
pub fn log_error<F, T, E>(operation: F, context: &str) -> Option<T>
where
    F: FnOnce() -> Result<T, E>,
    E: std::fmt::Display,
{
    match operation() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}: {}", context, e);
            None
        }
    }
}
