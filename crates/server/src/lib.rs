//! HTTP server for the bundler.
//!
//! This crate provides:
//! - Handshake verification for every app-scoped route
//! - Push: apply a client listing and rebuild the bundle footers
//! - Pull: ship missing assets and the current footer
//! - Submit: snapshot the development files under a submission id
//! - Healthcheck and Prometheus metrics

pub mod archive;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod icons;
pub mod locks;
pub mod metrics;
pub mod notify;
pub mod packager;
pub mod project;
pub mod registry;
pub mod routes;
pub mod state;

pub use auth::{TraceId, VerifiedHandshake};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
