//! Router Module Index
//!
//! Splits the API by access level. Authentication is applied to a whole module as a
//! router layer, so a handler cannot be exposed unauthenticated by accident. Role checks
//! live in the handlers, since every resource mixes roles across its methods.

/// Routes open to anonymous clients: health check, registration and login.
pub mod public;

/// Routes behind the bearer-token layer: patients, doctors and appointments.
pub mod authenticated;
