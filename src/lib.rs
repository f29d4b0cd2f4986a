//! Movie catalog API server.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌───────────────────────────────────────────────────────────┐
//!                   │                   LifecycleController                     │
//!                   │        bind → serve → signal → drain → stop               │
//!                   │                                                           │
//!  Client Request   │  ┌──────────┐   ┌─────────────┐   ┌────────────────────┐  │
//!  ─────────────────┼─▶│  outer   │──▶│ RateLimiter │──▶│ TokenAuthenticator │  │
//!                   │  │  layers  │   │ (per IP)    │   │ (attach principal) │  │
//!                   │  └──────────┘   └─────────────┘   └─────────┬──────────┘  │
//!                   │                                             ▼             │
//!                   │                 ┌──────────┐      ┌────────────────────┐  │
//!  Client Response  │                 │ handlers │◀─────│ Gate (tiers per    │  │
//!  ◀────────────────┼─────────────────│          │      │ route)             │  │
//!                   │                 └────┬─────┘      └────────────────────┘  │
//!                   │                      ▼                                    │
//!                   │            BackgroundTaskRunner (tracked, drained)        │
//!                   └───────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod catalog;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod notify;
pub mod observability;
pub mod security;

pub use config::schema::ApiConfig;
pub use http::HttpServer;
pub use lifecycle::{LifecycleController, Shutdown};
