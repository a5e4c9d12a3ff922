/// Router Module Index
///
/// Routing split by access level. Access control is attached per module with Axum layers,
/// so an endpoint cannot end up exposed by accident.

/// Routes accessible to everyone (health checks).
pub mod public;

/// Routes protected by the `AuthUser` middleware. Every category read is made for the
/// authenticated principal.
pub mod authenticated;

/// Routes restricted to principals holding the manage capability.
pub mod admin;
