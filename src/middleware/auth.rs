//! JWT Authentication Middleware
//!
//! The identity provider issues user tokens signed with a shared HS256
//! secret; this backend only verifies them. There is no token issuance or
//! refresh handling here.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{utils::error::ErrorResponse, AppState};

/// Claims carried by provider-issued user tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User email, when the provider includes it
    #[serde(default)]
    pub email: Option<String>,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    #[serde(default)]
    pub iat: Option<i64>,
    /// Provider role claim (e.g. "authenticated")
    #[serde(default)]
    pub role: Option<String>,
}

/// Authenticated user information extracted from a verified token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

impl TryFrom<Claims> for AuthUser {
    type Error = &'static str;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&claims.sub).map_err(|_| "Invalid user ID in token")?;
        Ok(Self {
            id,
            email: claims.email,
        })
    }
}

impl AuthUser {
    /// Get the user ID
    pub fn user_id(&self) -> Uuid {
        self.id
    }
}

/// Extractor for AuthUser from request extensions
///
/// This allows using AuthUser as a handler parameter after auth middleware has run.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().cloned().ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new(
                    "unauthorized",
                    "Authentication required",
                )),
            )
        })
    }
}

/// Validate and decode a provider-issued token
pub fn validate_token(token: &str, secret: &str) -> Result<TokenData<Claims>, AuthError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    // The provider sets aud to "authenticated"; not all tooling does, so the
    // claim is not required.
    validation.validate_aud = false;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })
}

/// Authentication error types
#[derive(Debug, PartialEq)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    TokenExpired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing authentication token"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid authentication token"),
            AuthError::TokenExpired => {
                (StatusCode::UNAUTHORIZED, "Authentication token has expired")
            }
        };

        let body = ErrorResponse::new("unauthorized", message);

        (status, Json(body)).into_response()
    }
}

/// Authentication middleware
///
/// Verifies the bearer token and injects an AuthUser into request extensions
/// for downstream handlers and extractors.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = extract_bearer_token(&request).ok_or(AuthError::MissingToken)?;

    let token_data = validate_token(&token, &state.config.auth.jwt_secret)?;

    let auth_user = AuthUser::try_from(token_data.claims).map_err(|_| AuthError::InvalidToken)?;

    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-that-is-at-least-32-characters-long";

    fn make_token(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn valid_claims() -> Claims {
        let now = chrono::Utc::now().timestamp();
        Claims {
            sub: Uuid::new_v4().to_string(),
            email: Some("user@example.com".to_string()),
            exp: now + 3600,
            iat: Some(now),
            role: Some("authenticated".to_string()),
        }
    }

    #[test]
    fn test_validate_token_roundtrip() {
        let claims = valid_claims();
        let token = make_token(&claims, SECRET);

        let decoded = validate_token(&token, SECRET).unwrap();
        assert_eq!(decoded.claims.sub, claims.sub);
        assert_eq!(decoded.claims.email, claims.email);
    }

    #[test]
    fn test_validate_token_rejects_wrong_secret() {
        let token = make_token(&valid_claims(), SECRET);
        let err = validate_token(&token, "another-secret-also-32-characters-xx").unwrap_err();
        assert_eq!(err, AuthError::InvalidToken);
    }

    #[test]
    fn test_validate_token_rejects_expired() {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            exp: now - 3600,
            ..valid_claims()
        };
        let token = make_token(&claims, SECRET);
        let err = validate_token(&token, SECRET).unwrap_err();
        assert_eq!(err, AuthError::TokenExpired);
    }

    #[test]
    fn test_auth_user_requires_uuid_subject() {
        let claims = Claims {
            sub: "not-a-uuid".to_string(),
            ..valid_claims()
        };
        assert!(AuthUser::try_from(claims).is_err());

        let claims = valid_claims();
        let user = AuthUser::try_from(claims.clone()).unwrap();
        assert_eq!(user.id.to_string(), claims.sub);
    }

    #[test]
    fn test_minimal_claims_deserialize() {
        // Tokens from CLI tooling may carry only sub and exp
        let json = format!(
            r#"{{"sub": "{}", "exp": {}}}"#,
            Uuid::new_v4(),
            chrono::Utc::now().timestamp() + 60
        );
        let claims: Claims = serde_json::from_str(&json).unwrap();
        assert!(claims.email.is_none());
        assert!(claims.role.is_none());
    }
}
