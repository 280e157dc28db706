//! Registration, sign-in and token lifecycle

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use common::{
    models::{LoginCredentials, NewUser, RefreshTokenRequest, TokenResponse, UpdateProfile, User},
    validation::{validate_email, validate_full_name, validate_password, validate_whatsapp_number},
};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    error::{ApiError, ApiResult},
    jwt::TokenType,
    middleware::AuthUser,
    repositories::user::verify_password,
    state::AppState,
};

/// Issue an access/refresh pair and open the refresh session
async fn issue_tokens(state: &AppState, user: &User) -> ApiResult<TokenResponse> {
    let access = state
        .jwt_service
        .generate_access_token(user)
        .map_err(ApiError::internal("Failed to generate access token"))?;
    let refresh = state
        .jwt_service
        .generate_refresh_token(user)
        .map_err(ApiError::internal("Failed to generate refresh token"))?;

    state
        .refresh_sessions
        .create(&refresh.claims)
        .await
        .map_err(ApiError::internal("Failed to store refresh session"))?;

    Ok(TokenResponse {
        access_token: access.token,
        refresh_token: refresh.token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_service.access_token_expiry(),
    })
}

fn ensure_can_sign_in(user: &User) -> ApiResult<()> {
    if user.is_blocked {
        return Err(ApiError::Forbidden("Account is blocked".to_string()));
    }
    if !user.is_approved {
        return Err(ApiError::Forbidden(
            "Account is awaiting approval".to_string(),
        ));
    }
    Ok(())
}

/// Student self-registration
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> ApiResult<impl IntoResponse> {
    validate_email(&payload.email)?;
    validate_password(&payload.password)?;
    validate_full_name(&payload.full_name)?;
    if let Some(number) = &payload.whatsapp_number {
        validate_whatsapp_number(number)?;
    }

    let user = state
        .user_repository
        .create(&payload)
        .await
        .map_err(ApiError::internal("Failed to create user"))?
        .ok_or_else(|| ApiError::Conflict("Email is already registered".to_string()))?;

    info!("Registered user {}", user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginCredentials>,
) -> ApiResult<Json<TokenResponse>> {
    info!("Login attempt for user: {}", payload.email);

    if !state.rate_limiter.is_allowed(&payload.email).await {
        return Err(ApiError::TooManyRequests);
    }

    let credentials = state
        .user_repository
        .find_credentials(&payload.email)
        .await
        .map_err(ApiError::internal("Failed to look up user"))?;

    let user = match credentials {
        Some((user, hash))
            if verify_password(&hash, &payload.password)
                .map_err(ApiError::internal("Failed to verify password"))? =>
        {
            user
        }
        _ => {
            state.rate_limiter.record_failure(&payload.email).await;
            warn!("Failed login for {}", payload.email);
            return Err(ApiError::Unauthorized);
        }
    };

    ensure_can_sign_in(&user)?;
    state.rate_limiter.reset(&payload.email).await;

    let tokens = issue_tokens(&state, &user).await?;
    info!("User {} signed in", user.id);
    Ok(Json(tokens))
}

/// Refresh token endpoint
///
/// The presented refresh token is consumed; a second use of the same token
/// is rejected.
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let claims = state
        .jwt_service
        .validate_token_of_type(&payload.refresh_token, TokenType::Refresh)
        .map_err(|e| {
            warn!("Rejected refresh token: {}", e);
            ApiError::Unauthorized
        })?;

    let consumed = state
        .refresh_sessions
        .consume(&claims)
        .await
        .map_err(ApiError::internal("Failed to consume refresh session"))?;
    if !consumed {
        warn!("Refresh token {} reused or revoked", claims.jti);
        return Err(ApiError::Unauthorized);
    }

    let user = state
        .user_repository
        .find_by_id(claims.sub)
        .await
        .map_err(ApiError::internal("Failed to load user"))?
        .ok_or(ApiError::Unauthorized)?;
    ensure_can_sign_in(&user)?;

    let tokens = issue_tokens(&state, &user).await?;
    info!("Rotated refresh token for user {}", user.id);
    Ok(Json(tokens))
}

/// Logout endpoint
///
/// Revokes the refresh session and, when the caller also presents its
/// access token, blacklists that too. Repeating a logout succeeds.
pub async fn logout(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Json(payload): Json<RefreshTokenRequest>,
) -> ApiResult<impl IntoResponse> {
    let claims = state
        .jwt_service
        .validate_token_of_type(&payload.refresh_token, TokenType::Refresh)
        .map_err(|_| ApiError::Unauthorized)?;

    state
        .refresh_sessions
        .revoke(claims.jti)
        .await
        .map_err(ApiError::internal("Failed to revoke refresh session"))?;
    state
        .jwt_service
        .blacklist_token(&state.redis_pool, &claims)
        .await
        .map_err(ApiError::internal("Failed to blacklist refresh token"))?;

    if let Some(TypedHeader(Authorization(bearer))) = bearer {
        match state
            .jwt_service
            .validate_token_of_type(bearer.token(), TokenType::Access)
        {
            Ok(access) if access.sub == claims.sub => state
                .jwt_service
                .blacklist_token(&state.redis_pool, &access)
                .await
                .map_err(ApiError::internal("Failed to blacklist access token"))?,
            _ => warn!("Ignoring unusable access token on logout"),
        }
    }

    info!("User {} logged out", claims.sub);
    Ok(Json(json!({"message": "Logged out successfully"})))
}

/// The signed-in user's profile
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<User>> {
    let user = state
        .user_repository
        .find_by_id(auth.id)
        .await
        .map_err(ApiError::internal("Failed to load user"))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Self-service profile edit
pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<UpdateProfile>,
) -> ApiResult<Json<User>> {
    if let Some(full_name) = &payload.full_name {
        validate_full_name(full_name)?;
    }
    if let Some(number) = &payload.whatsapp_number {
        validate_whatsapp_number(number)?;
    }

    let user = state
        .user_repository
        .update_profile(auth.id, &payload)
        .await
        .map_err(ApiError::internal("Failed to update profile"))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}
