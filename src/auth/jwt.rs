use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::{config::JwtConfig, state::AppState};

/// Lifetime of every issued session token.
pub const TOKEN_TTL: Duration = Duration::hours(72);

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
}

/// JWT payload of a session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // account id
    pub iat: i64,
    pub exp: i64,
}

/// Signing and verification keys derived from the process-wide secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self::new(cfg.secret.as_bytes())
    }
}

impl JwtKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    fn sign(&self, claims: &Claims) -> anyhow::Result<String> {
        Ok(encode(&Header::new(ALGORITHM), claims, &self.encoding)?)
    }

    /// Issues a token for `user_id` expiring `TOKEN_TTL` from now.
    pub fn issue(&self, user_id: i64) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + TOKEN_TTL).unix_timestamp(),
        };
        let token = self.sign(&claims)?;
        debug!(user_id, "jwt signed");
        Ok(token)
    }

    /// Returns the subject of a well-signed, unexpired HS256 token.
    pub fn validate(&self, token: &str) -> Result<i64, TokenError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;

        if data.claims.exp <= OffsetDateTime::now_utc().unix_timestamp() {
            debug!("jwt expires this second");
            return Err(TokenError::Expired);
        }

        let user_id = data.claims.sub.parse::<i64>().map_err(|_| {
            debug!("jwt subject is not an account id");
            TokenError::Invalid
        })?;
        debug!(user_id, "jwt verified");
        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::new(b"test-secret")
    }

    fn now() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }

    #[test]
    fn issue_and_validate_roundtrip() {
        let keys = keys();
        let token = keys.issue(42).expect("issue");
        assert_eq!(keys.validate(&token), Ok(42));
    }

    #[test]
    fn issued_token_expires_in_72_hours() {
        let keys = keys();
        let token = keys.issue(1).unwrap();
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        let claims = decode::<Claims>(&token, &keys.decoding, &validation)
            .unwrap()
            .claims;
        assert_eq!(claims.exp - claims.iat, 72 * 3600);
        assert_eq!(claims.sub, "1");
    }

    #[test]
    fn expired_token_is_rejected_as_expired() {
        let keys = keys();
        let token = keys
            .sign(&Claims {
                sub: "7".into(),
                iat: now() - 7200,
                exp: now() - 3600,
            })
            .unwrap();
        assert_eq!(keys.validate(&token), Err(TokenError::Expired));
    }

    #[test]
    fn token_expiring_now_is_rejected() {
        let keys = keys();
        let now = now();
        let token = keys
            .sign(&Claims {
                sub: "9".into(),
                iat: now - 10,
                exp: now,
            })
            .unwrap();
        assert_eq!(keys.validate(&token), Err(TokenError::Expired));
    }

    #[test]
    fn token_from_other_secret_is_invalid() {
        let token = JwtKeys::new(b"another-secret").issue(3).unwrap();
        assert_eq!(keys().validate(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn token_with_other_algorithm_is_invalid() {
        let claims = Claims {
            sub: "3".into(),
            iat: now(),
            exp: now() + 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert_eq!(keys().validate(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let keys = keys();
        let token = keys.issue(5).unwrap();
        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        let forged = keys.issue(6).unwrap();
        parts[1] = forged.split('.').nth(1).unwrap().to_string();
        parts[2] = "AAAA".into();
        assert_eq!(keys.validate(&parts.join(".")), Err(TokenError::Invalid));
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(keys().validate("invalid.token.here"), Err(TokenError::Invalid));
        assert_eq!(keys().validate(""), Err(TokenError::Invalid));
    }

    #[test]
    fn missing_or_non_numeric_subject_is_invalid() {
        #[derive(Serialize)]
        struct NoSub {
            exp: i64,
        }
        let keys = keys();
        let token = encode(
            &Header::new(ALGORITHM),
            &NoSub { exp: now() + 3600 },
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert_eq!(keys.validate(&token), Err(TokenError::Invalid));

        let token = keys
            .sign(&Claims {
                sub: "alice".into(),
                iat: now(),
                exp: now() + 3600,
            })
            .unwrap();
        assert_eq!(keys.validate(&token), Err(TokenError::Invalid));
    }
}
