use expensa_core::AppError;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims read from the identity provider's token. Unknown claims are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.leeway = 30;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<JwtClaims, AppError> {
        decode::<JwtClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                AppError::Unauthorized("Invalid or expired token".to_string())
            })
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-test-secret-test-secret";

    fn token(secret: &str, exp: i64) -> (Uuid, String) {
        let sub = Uuid::new_v4();
        let claims = JwtClaims {
            sub,
            email: Some("a@example.com".to_string()),
            exp,
            iat: None,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        (sub, token)
    }

    #[test]
    fn accepts_valid_token() {
        let verifier = JwtVerifier::new(SECRET);
        let (sub, token) = token(SECRET, (Utc::now() + Duration::hours(1)).timestamp());
        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims.sub, sub);
        assert_eq!(claims.email.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn rejects_wrong_secret_and_expired_tokens() {
        let verifier = JwtVerifier::new(SECRET);
        let (_, forged) = token("another-secret-another-secret-12345", (Utc::now() + Duration::hours(1)).timestamp());
        assert!(matches!(verifier.verify(&forged), Err(AppError::Unauthorized(_))));

        let (_, expired) = token(SECRET, (Utc::now() - Duration::hours(1)).timestamp());
        assert!(matches!(verifier.verify(&expired), Err(AppError::Unauthorized(_))));
    }
}
