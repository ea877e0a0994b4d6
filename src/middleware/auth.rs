//! Minimal signed-cookie authentication.
//!
//! The wider auth surface (registration, login pages, password handling)
//! lives outside this service; here we only honor the contract: a cookie
//! carrying an HMAC-signed user id, resolved to an Active user before any
//! handler runs.

use axum::{
    extract::{Request, State},
    http::header::COOKIE,
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::models::users::User;
use crate::queries::users as user_queries;
use crate::state::AppState;

pub const AUTH_COOKIE_NAME: &str = "auth_token";

type HmacSha256 = Hmac<Sha256>;

/// The user resolved from the session cookie, attached as an extension.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser(pub User);

/// Produce the cookie value for a user id: `{id}.{hex hmac}`.
pub fn sign_session(secret: &str, user_id: i32) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(user_id.to_string().as_bytes());
    format!("{}.{}", user_id, hex::encode(mac.finalize().into_bytes()))
}

/// Verify a cookie value and recover the user id.
pub fn verify_session(secret: &str, token: &str) -> Option<i32> {
    let (user_id, signature) = token.split_once('.')?;
    let user_id: i32 = user_id.parse().ok()?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(user_id.to_string().as_bytes());
    let signature = hex::decode(signature).ok()?;
    mac.verify_slice(&signature).ok()?;
    Some(user_id)
}

fn cookie_value<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    let header = request.headers().get(COOKIE)?.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}

/// Reject unauthenticated requests and requests from non-Active users.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let token = cookie_value(&request, AUTH_COOKIE_NAME)
        .ok_or_else(|| Error::Authentication("Missing session cookie".to_string()))?;

    let user_id = verify_session(state.config.auth.secret_key.expose_secret(), token)
        .ok_or_else(|| Error::Authentication("Invalid session cookie".to_string()))?;

    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    let user = user_queries::get_user_by_id(&mut conn, user_id)
        .await?
        .ok_or_else(|| Error::Authentication("Unknown user".to_string()))?;

    if !user.is_active() {
        return Err(Error::Forbidden("Account is not active".to_string()));
    }

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let token = sign_session("test-secret", 42);
        assert_eq!(verify_session("test-secret", &token), Some(42));
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let token = sign_session("test-secret", 42);
        let forged = token.replacen("42", "43", 1);
        assert_eq!(verify_session("test-secret", &forged), None);
        assert_eq!(verify_session("other-secret", &token), None);
        assert_eq!(verify_session("test-secret", "garbage"), None);
        assert_eq!(verify_session("test-secret", "42.nothex"), None);
    }
}
