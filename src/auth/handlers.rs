use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, instrument, warn};

use super::{
    cookies::{self, REFRESH_COOKIE},
    dto::{ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest, TokenPair},
    extractors::AuthUser,
    services::Registration,
};
use crate::{
    error::{ApiResponse, AppError},
    state::AppState,
    users::{media::Upload, repo_types::PublicUser},
};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const MAX_JSON_BYTES: usize = 16 * 1024;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/register",
            post(register).layer(DefaultBodyLimit::max(2 * MAX_UPLOAD_BYTES)),
        )
        .route(
            "/users/login",
            post(login).layer(DefaultBodyLimit::max(MAX_JSON_BYTES)),
        )
        .route(
            "/users/refresh-token",
            post(refresh).layer(DefaultBodyLimit::max(MAX_JSON_BYTES)),
        )
        .route("/users/logout", post(logout))
        .route(
            "/users/change-password",
            post(change_password).layer(DefaultBodyLimit::max(MAX_JSON_BYTES)),
        )
}

/// Unwrap a JSON body, reporting malformed input as a validation error.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value).map_err(|e| {
        warn!(error = %e, "request body rejected");
        AppError::validation(format!("Invalid request body: {e}"))
    })
}

/// Drain a multipart body into text fields and image files.
pub(crate) async fn read_multipart(
    mut mp: Multipart,
) -> Result<(Vec<(String, String)>, Vec<(String, Upload)>), AppError> {
    let mut fields = Vec::new();
    let mut files = Vec::new();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("invalid multipart body: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if field.file_name().is_some() {
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let body = field
                .bytes()
                .await
                .map_err(|e| AppError::validation(format!("invalid upload: {e}")))?;
            files.push((name, Upload { body, content_type }));
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::validation(format!("invalid field: {e}")))?;
            fields.push((name, text));
        }
    }
    Ok((fields, files))
}

/// POST /users/register (multipart): fullname, username, email, password,
/// avatar file, optional coverImage file.
#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    mp: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<PublicUser>>), AppError> {
    let (fields, files) = read_multipart(mp).await?;
    let mut reg = Registration::default();
    for (name, value) in fields {
        match name.as_str() {
            "fullname" => reg.fullname = value,
            "username" => reg.username = value,
            "email" => reg.email = value,
            "password" => reg.password = value,
            _ => {}
        }
    }
    for (name, upload) in files {
        match name.as_str() {
            "avatar" => reg.avatar = Some(upload),
            "coverImage" => reg.cover_image = Some(upload),
            _ => {}
        }
    }

    let user = state.sessions.register(reg).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("User created successfully", user),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<ApiResponse<LoginResponse>>), AppError> {
    let payload = json_body(payload)?;
    let out = state
        .sessions
        .login(&payload.email, &payload.password)
        .await?;
    let jar = cookies::with_tokens(jar, &out.tokens, state.config.session.secure_cookies);
    Ok((jar, ApiResponse::ok("User login successful", out)))
}

#[instrument(skip(state, jar, body))]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<ApiResponse<TokenPair>>), AppError> {
    // cookie first; a request without a JSON body is allowed
    let incoming = match jar.get(REFRESH_COOKIE) {
        Some(cookie) => Some(cookie.value().to_string()),
        None => match body {
            Err(JsonRejection::MissingJsonContentType(_)) => None,
            body => json_body(body)?.refresh_token,
        },
    };

    let tokens = state.sessions.refresh(incoming.as_deref()).await?;
    let jar = cookies::with_tokens(jar, &tokens, state.config.session.secure_cookies);
    Ok((jar, ApiResponse::ok("Access token refreshed successfully", tokens)))
}

#[instrument(skip(state, jar, user), fields(user_id = %user.id))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    AuthUser(user): AuthUser,
) -> Result<(CookieJar, Json<ApiResponse<()>>), AppError> {
    state.sessions.logout(user.id).await?;
    Ok((
        cookies::without_tokens(jar, state.config.session.secure_cookies),
        ApiResponse::message("User logged out successfully"),
    ))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let payload = json_body(payload)?;
    state
        .sessions
        .change_password(user.id, &payload.old_password, &payload.new_password)
        .await?;
    info!("password change accepted");
    Ok(ApiResponse::message("Password changed successfully"))
}
