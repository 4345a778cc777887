// Token decoding without signature verification

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode as jwt_decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use super::types::{Claims, Token};
use crate::error::TokenError;

/// Decode a token's claims without contacting the network
///
/// The signature is never checked; the server stays the authority on validity.
/// Only structure and the `exp`/`iat` relationship are enforced here.
pub fn decode(token: &str) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = jwt_decode::<Map<String, Value>>(
        token,
        &DecodingKey::from_secret(b"ignored"),
        &validation,
    )
    .map_err(|e| TokenError::Malformed(e.to_string()))?;

    let raw = data.claims;

    let exp = timestamp_claim(&raw, "exp")?
        .ok_or_else(|| TokenError::Malformed("missing exp claim".to_string()))?;
    let iat = timestamp_claim(&raw, "iat")?.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    if exp <= iat {
        return Err(TokenError::InvalidLifetime);
    }

    let subject = raw
        .get("sub")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(Claims {
        issued_at: iat,
        expires_at: exp,
        subject,
        raw,
    })
}

impl Token {
    /// Pair a raw token with its decoded claims
    pub fn parse(raw: impl Into<String>) -> Result<Self, TokenError> {
        let raw = raw.into();
        let claims = decode(&raw)?;
        Ok(Self { raw, claims })
    }
}

/// Whether a token is close enough to expiry to renew it before sending
///
/// A margin reaching past the start of representable time always asks for a refresh.
pub fn needs_refresh(claims: &Claims, now: DateTime<Utc>, margin: Duration) -> bool {
    match claims.expires_at.checked_sub_signed(margin) {
        Some(deadline) => now >= deadline,
        None => true,
    }
}

/// Read a seconds-since-epoch claim, accepting integer or float encodings
fn timestamp_claim(
    raw: &Map<String, Value>,
    name: &str,
) -> Result<Option<DateTime<Utc>>, TokenError> {
    let Some(value) = raw.get(name) else {
        return Ok(None);
    };

    let secs = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .ok_or_else(|| TokenError::Malformed(format!("{} claim is not a number", name)))?;

    DateTime::from_timestamp(secs, 0)
        .map(Some)
        .ok_or_else(|| TokenError::Malformed(format!("{} claim out of range", name)))
}
