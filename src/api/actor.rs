//! Acting user extraction.
//!
//! Authentication happens upstream; the host forwards the authenticated user
//! id in a header and the engine only records and checks it.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

pub const ACTOR_HEADER: &str = "x-user-id";

pub const DEFAULT_ACTOR: &str = "system";

/// The user performing the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

impl Actor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_ACTOR);

        Ok(Actor(actor.to_string()))
    }
}
