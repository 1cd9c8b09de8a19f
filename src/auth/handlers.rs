use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, TokenResponse},
        jwt::JwtKeys,
        middleware::{require_bearer, AuthUser},
        password::{hash_password, verify_password_or_dummy},
    },
    error::AppError,
    state::AppState,
    users::{
        dto::{CreateUserRequest, PublicUser},
        repo::StoreError,
        repo_types::NewUser,
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
}

pub fn profile_routes(keys: JwtKeys) -> Router<AppState> {
    Router::new()
        .route("/auth/profile", get(profile))
        .route_layer(middleware::from_fn_with_state(keys, require_bearer))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<Json<PublicUser>, AppError> {
    let Json(mut payload) = payload.map_err(|e| {
        warn!(error = %e, "signup body rejected");
        AppError::validation("Invalid input")
    })?;
    payload.validate().inspect_err(|e| warn!(error = %e, "signup validation failed"))?;

    let password_hash = hash_password(&payload.password)?;
    let user = state
        .store
        .create(NewUser {
            name: payload.name,
            email: payload.email,
            password_hash,
        })
        .await?;

    info!(user_id = user.id, email = %user.email, "user signed up");
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let Json(mut payload) = payload.map_err(|e| {
        warn!(error = %e, "login body rejected");
        AppError::validation("Invalid input")
    })?;
    payload.validate()?;

    let user = match state.store.get_by_email(&payload.email).await {
        Ok(u) => u,
        Err(StoreError::NotFound) => {
            verify_password_or_dummy(&payload.password, None);
            warn!(email = %payload.email, "login unknown email");
            return Err(AppError::Unauthorized);
        }
        Err(e) => return Err(e.into()),
    };

    if !verify_password_or_dummy(&payload.password, Some(&user.password_hash)) {
        warn!(user_id = user.id, "login invalid password");
        return Err(AppError::Unauthorized);
    }

    let token = JwtKeys::from_ref(&state).issue(user.id)?;
    info!(user_id = user.id, "user logged in");
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state))]
pub async fn profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = state.store.get(user_id).await.inspect_err(|e| {
        warn!(error = %e, user_id, "profile lookup failed");
    })?;
    Ok(Json(user.into()))
}
