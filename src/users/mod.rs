use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod media;
#[cfg(test)]
pub mod memory;
pub mod repo;
pub mod repo_types;
mod services;

pub fn router() -> Router<AppState> {
    handlers::profile_routes()
}
