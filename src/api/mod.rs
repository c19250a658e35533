//! API layer - HTTP endpoint handlers organized by concern.

mod actor;
mod health;
mod metrics;
mod render;
mod routes;
mod template;
mod usage;
mod variables;

pub use actor::{Actor, ACTOR_HEADER, DEFAULT_ACTOR};
pub use health::health;
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
