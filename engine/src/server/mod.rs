//! axum wiring: shared state, health checks and the route table.
//!
//! Handlers themselves live in [`crate::api`].

pub mod health;
pub mod routes;
pub mod state;

pub use health::{health_check, readiness_check};
pub use routes::build_router;
pub use state::AppState;
