// Courier - declarative HTTP API clients for Rust
//
// API surfaces are plain structs bound to shared transports; calls complete
// through promises that run interceptors and re-authentication before the
// caller's handlers.

// Re-export the networking layer
pub use courier_net::*;

/// Prelude for common imports.
///
/// ```
/// use courier::prelude::*;
/// ```
pub mod prelude {
    pub use courier_net::prelude::*;
}
