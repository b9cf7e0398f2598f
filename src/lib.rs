#![doc = "The `crewdeck` library crate."]
#![doc = ""]
#![doc = "This crate contains the core business logic for the Crewdeck backend:"]
#![doc = "credential issuance and verification (access/refresh tokens), the"]
#![doc = "per-request authentication gate, role-based project membership with the"]
#![doc = "last-admin invariant, and the project invitation lifecycle. Routing,"]
#![doc = "configuration, and error handling live here as well; the main binary"]
#![doc = "(`main.rs`) only wires the pieces together and runs the server."]

pub mod auth;
pub mod config;
pub mod error;
pub mod invitations;
pub mod membership;
pub mod models;
pub mod notify;
pub mod routes;

// Re-export key types if desired for easier use of the library crate.
// Example:
// pub use crate::error::AppError;
// pub use crate::models::user::User;
