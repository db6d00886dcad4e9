//! Bearer-token middleware. Successful verification injects an `Identity`
//! into request extensions; everything else is a 401 with a tagged reason.

use super::jwt::JwtHandler;
use super::models::Identity;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

pub async fn auth_middleware(
    State(jwt_handler): State<Arc<JwtHandler>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    // WebSocket clients pass the token as a query parameter.
    let token_from_query = req.uri().query().and_then(|query| {
        query
            .split('&')
            .find(|pair| pair.starts_with("token="))
            .and_then(|pair| pair.split('=').nth(1))
            .map(|t| t.to_string())
    });

    let token_from_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.to_string());

    let token = token_from_query
        .or(token_from_header)
        .ok_or(AuthRejection::MissingToken)?;

    let claims = jwt_handler
        .validate_token(&token)
        .map_err(|_| AuthRejection::InvalidToken)?;

    req.extensions_mut().insert(Identity {
        subject: claims.sub,
        role: claims.role,
    });

    Ok(next.run(req).await)
}

#[derive(Debug)]
pub enum AuthRejection {
    MissingToken,
    InvalidToken,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::MissingToken => "Missing authorization token",
            Self::InvalidToken => "Invalid or expired token",
        };
        (StatusCode::UNAUTHORIZED, message).into_response()
    }
}
