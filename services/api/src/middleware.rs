//! Authentication middleware for JWT token validation

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use common::models::Role;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{error::ApiError, jwt::TokenType, state::AppState};

/// Authenticated user information
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owners and admins may see a resource
    pub fn can_access(&self, owner_id: Uuid) -> bool {
        self.id == owner_id || self.is_admin()
    }
}

/// Authentication middleware
///
/// Accepts a valid, unrevoked access token of an account that still exists
/// and is not blocked. The role is read from the database so role changes
/// take effect on the next request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(ApiError::Unauthorized)?;

    let claims = state
        .jwt_service
        .validate_token_of_type(bearer.token(), TokenType::Access)
        .map_err(|e| {
            warn!("Rejected access token: {}", e);
            ApiError::Unauthorized
        })?;

    let is_blacklisted = state
        .jwt_service
        .is_token_blacklisted(&state.redis_pool, claims.jti)
        .await
        .map_err(|e| {
            error!("Failed to check if token is blacklisted: {}", e);
            ApiError::InternalServerError
        })?;

    if is_blacklisted {
        return Err(ApiError::Unauthorized);
    }

    let user = state
        .user_repository
        .find_by_id(claims.sub)
        .await
        .map_err(ApiError::internal("Failed to load authenticated user"))?
        .ok_or(ApiError::Unauthorized)?;

    if user.is_blocked {
        return Err(ApiError::Forbidden("Account is blocked".to_string()));
    }

    req.extensions_mut().insert(AuthUser {
        id: user.id,
        role: user.role,
    });

    Ok(next.run(req).await)
}

/// Admin guard, layered inside [`auth_middleware`]
pub async fn admin_middleware(req: Request, next: Next) -> Result<Response, ApiError> {
    let user = req
        .extensions()
        .get::<AuthUser>()
        .ok_or(ApiError::Unauthorized)?;

    if !user.is_admin() {
        warn!("User {} denied admin access", user.id);
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Extension, Router,
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
    };
    use tower::ServiceExt;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn test_access_rules() {
        let student = user(Role::Student);
        let admin = user(Role::Admin);

        assert!(student.can_access(student.id));
        assert!(!student.can_access(Uuid::new_v4()));
        assert!(admin.can_access(Uuid::new_v4()));
    }

    fn guarded(as_user: Option<AuthUser>) -> Router {
        let router = Router::new()
            .route("/admin", get(|| async { "ok" }))
            .layer(middleware::from_fn(admin_middleware));
        match as_user {
            Some(u) => router.layer(Extension(u)),
            None => router,
        }
    }

    async fn status_for(as_user: Option<AuthUser>) -> StatusCode {
        guarded(as_user)
            .oneshot(HttpRequest::get("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_admin_guard() {
        assert_eq!(status_for(Some(user(Role::Admin))).await, StatusCode::OK);
        assert_eq!(
            status_for(Some(user(Role::Student))).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_for(None).await, StatusCode::UNAUTHORIZED);
    }
}
