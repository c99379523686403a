//! API request handlers.

/// Liveness endpoint.
pub mod health;
/// Research request, streaming, and phase vocabulary handlers.
pub mod research;
