//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, outer middleware)
//!     → security::rate_limit (per-client admission)
//!     → auth::authenticate (attach principal)
//!     → auth::authorize (per-route tier gate)
//!     → handlers.rs / movies.rs / users.rs
//!     → error.rs (rejections and faults as JSON)
//! ```

pub mod error;
pub mod handlers;
pub mod movies;
pub mod server;
pub mod users;

pub use error::ApiError;
pub use server::{AppState, Collaborators, HttpServer};
