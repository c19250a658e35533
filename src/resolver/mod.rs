//! Variable resolution with a pluggable TTL cache.
//!
//! This module provides:
//! - `VariableResolver`: cache → context → definition → source dispatch
//! - `VariableCache` trait with in-memory and Redis backends
//! - `create_variable_cache` factory driven by configuration
//! - Declared variable validation rules

mod cache;
mod engine;
mod factory;
mod memory_cache;
mod redis_cache;
mod rules;

pub use cache::{CacheStats, VariableCache};
pub use engine::{Resolution, ResolutionSource, ResolverConfig, VariableResolver, VariableScope};
pub use factory::create_variable_cache;
pub use memory_cache::MemoryVariableCache;
pub use redis_cache::RedisVariableCache;
pub use rules::check_rule;
