use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{get, patch},
    Json, Router,
};
use tracing::instrument;

use super::{
    repo_types::{ChannelProfile, MediaSlot, PublicUser, WatchedVideo},
    services,
};
use crate::{
    auth::{extractors::AuthUser, handlers::read_multipart},
    error::{ApiResponse, AppError},
    state::AppState,
};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/users/current-user", get(current_user))
        .route("/users/c/:username", get(channel_profile))
        .route("/users/history", get(watch_history))
        .route(
            "/users/avatar",
            patch(update_avatar).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/users/cover-image",
            patch(update_cover_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
}

#[instrument(skip(user), fields(user_id = %user.id))]
pub async fn current_user(AuthUser(user): AuthUser) -> Json<ApiResponse<PublicUser>> {
    ApiResponse::ok("Current user details", user)
}

async fn update_media(
    state: &AppState,
    user: &PublicUser,
    slot: MediaSlot,
    field: &str,
    mp: Multipart,
) -> Result<PublicUser, AppError> {
    let (_, files) = read_multipart(mp).await?;
    let upload = files
        .into_iter()
        .find(|(name, _)| name == field)
        .map(|(_, upload)| upload);
    services::replace_media(&state.sessions, user.id, slot, upload).await
}

#[instrument(skip(state, user, mp), fields(user_id = %user.id))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mp: Multipart,
) -> Result<Json<ApiResponse<PublicUser>>, AppError> {
    let updated = update_media(&state, &user, MediaSlot::Avatar, "avatar", mp).await?;
    Ok(ApiResponse::ok("User avatar updated successfully", updated))
}

#[instrument(skip(state, user, mp), fields(user_id = %user.id))]
pub async fn update_cover_image(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mp: Multipart,
) -> Result<Json<ApiResponse<PublicUser>>, AppError> {
    let updated = update_media(&state, &user, MediaSlot::CoverImage, "coverImage", mp).await?;
    Ok(ApiResponse::ok("User cover image updated successfully", updated))
}

#[instrument(skip(state, user), fields(viewer = %user.id))]
pub async fn channel_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<ChannelProfile>>, AppError> {
    let profile = services::channel_profile(&state.sessions, &username, user.id).await?;
    Ok(ApiResponse::ok("Channel profile fetched successfully", profile))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn watch_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<ApiResponse<Vec<WatchedVideo>>>, AppError> {
    let history = services::watch_history(&state.sessions, user.id).await?;
    Ok(ApiResponse::ok("User watch history fetched successfully", history))
}
