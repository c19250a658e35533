// Template model & engine
pub mod condition;
pub mod lifecycle;
pub mod render;
pub mod resolver;
pub mod template;
pub mod validation;

// External seams
pub mod collaborators;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod config;
pub mod error;
pub mod metrics;
