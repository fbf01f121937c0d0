use actix_web::{http::header::HeaderValue, HttpRequest};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::num::ParseIntError;

use crate::config::Config;
use crate::errors::ApiError;
use crate::schemas::MemberId;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, PartialEq, Eq)]
pub enum AuthorizationLevel {
    Bot,
    Frontend(MemberId),
}

/// Client identity as the frontend presents it: the fields it was issued
/// plus an HMAC signature over them, keyed off the API token.
#[derive(Deserialize, Debug, Clone)]
struct ClientIdentity {
    member_id: String,
    issued_at: String,
    signature: String,
}

/// Gate used by every mutating handler. When no API token is configured
/// the check is disabled and callers pass as the bot.
pub fn authorize(request: &HttpRequest, config: &Config) -> Result<AuthorizationLevel, ApiError> {
    let Some(token) = config.bot_token.as_deref() else {
        return Ok(AuthorizationLevel::Bot);
    };
    check_authorization_level(request, token).ok_or(ApiError::Unauthorized)
}

pub fn check_authorization_level(
    request: &HttpRequest,
    bot_token: &str,
) -> Option<AuthorizationLevel> {
    let authorization = request
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(HeaderValue::to_str)?
        .ok()?;
    if authorization == bot_token {
        return Some(AuthorizationLevel::Bot);
    }
    let identity: ClientIdentity = serde_json::from_str(authorization).ok()?;
    let signature = identity
        .signature
        .chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|pair| u8::from_str_radix(&String::from_iter(pair), 16))
        .collect::<Result<Vec<u8>, ParseIntError>>()
        .ok()?;
    if compute_signature(&identity, bot_token) == signature {
        Some(AuthorizationLevel::Frontend(identity.member_id))
    } else {
        None
    }
}

fn compute_signature(identity: &ClientIdentity, bot_token: &str) -> Vec<u8> {
    let payload = [
        ("issued_at", identity.issued_at.as_str()),
        ("member_id", identity.member_id.as_str()),
    ]
    .into_iter()
    .map(|(field, value)| format!("{field}={value}"))
    .collect::<Vec<_>>()
    .join("\n");

    let mut sha256_hasher = Sha256::new();
    sha256_hasher.update(bot_token.as_bytes());
    let key = sha256_hasher.finalize();

    let mut hmac_hasher =
        HmacSha256::new_from_slice(&key).expect("hmac key can be any length");
    hmac_hasher.update(payload.as_bytes());
    hmac_hasher.finalize().into_bytes().to_vec()
}
