use crate::{auth::jwt::JwtKeys, state::AppState};
use axum::Router;

mod dto;
pub mod handlers;
pub mod jwt;
pub(crate) mod middleware;
pub mod password;

pub fn router(keys: JwtKeys) -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::profile_routes(keys))
}
