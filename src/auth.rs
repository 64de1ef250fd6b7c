use crate::{
    config::AppState,
    model::Actor,
    utils::{http_err, HttpError},
};

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,            // user id
    pub exp: usize,
}

pub fn issue_token(secret: &str, user_id: Uuid, ttl_secs: i64) -> anyhow::Result<String> {
    let exp = chrono::Utc::now().timestamp() + ttl_secs;
    let claims = Claims { sub: user_id.to_string(), exp: exp.max(0) as usize };
    Ok(encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))?)
}

pub fn verify_token(secret: &str, token: &str) -> Result<Actor, String> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| e.to_string())?;
    let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| "token subject is not a user id".to_string())?;
    Ok(Actor::new(user_id))
}

impl FromRequestParts<AppState> for Actor {
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| http_err(StatusCode::UNAUTHORIZED, "missing bearer token"))?;

        verify_token(&state.cfg.auth.jwt_secret, token.trim()).map_err(|e| {
            debug!(error = %e, "rejected bearer token");
            http_err(StatusCode::UNAUTHORIZED, "invalid bearer token")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let user = Uuid::new_v4();
        let token = issue_token("k", user, 60).unwrap();
        assert_eq!(verify_token("k", &token).unwrap(), Actor::new(user));
        assert!(verify_token("other", &token).is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let token = issue_token("k", Uuid::new_v4(), -3_600).unwrap();
        assert!(verify_token("k", &token).is_err());
    }
}
