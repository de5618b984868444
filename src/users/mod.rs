use crate::state::AppState;
use axum::Router;

pub mod avatars;
pub mod cache;
mod dto;
pub mod errors;
pub(crate) mod extractors;
pub mod handlers;
pub mod model;
mod password;
pub mod repo;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
