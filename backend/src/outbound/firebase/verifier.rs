//! `IdentityVerifier` implementation for Firebase ID tokens.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use reqwest::{Client, Url};
use serde::Deserialize;

use super::jwks::JwkCache;
use crate::domain::ports::{IdentityVerificationError, IdentityVerifier, VerifiedClaims};
use crate::domain::{EmailAddress, SubjectId};

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

/// Verifies tokens issued for one Firebase project.
pub struct FirebaseTokenVerifier {
    project_id: String,
    keys: JwkCache,
}

impl FirebaseTokenVerifier {
    /// Verifier fetching keys from `jwks_url` (normally
    /// [`super::FIREBASE_JWKS_URL`]) on demand.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(
        project_id: impl Into<String>,
        jwks_url: Url,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_cache(project_id, JwkCache::new(client, jwks_url)))
    }

    pub fn with_cache(project_id: impl Into<String>, keys: JwkCache) -> Self {
        Self {
            project_id: project_id.into(),
            keys,
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.project_id.as_str()]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);
        validation
    }
}

fn map_jwt_error(error: &jsonwebtoken::errors::Error) -> IdentityVerificationError {
    match error.kind() {
        ErrorKind::ExpiredSignature => IdentityVerificationError::expired("token has expired"),
        _ => IdentityVerificationError::invalid(format!("token rejected: {error}")),
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseTokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, IdentityVerificationError> {
        let header = decode_header(token).map_err(|error| map_jwt_error(&error))?;
        if header.alg != Algorithm::RS256 {
            return Err(IdentityVerificationError::invalid("unexpected signing algorithm"));
        }
        let kid = header
            .kid
            .ok_or_else(|| IdentityVerificationError::invalid("token has no key id"))?;
        let jwk = self.keys.key(&kid).await?;
        let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map_err(|error| IdentityVerificationError::unavailable(format!("bad signing key: {error}")))?;

        let data = decode::<FirebaseClaims>(token, &key, &self.validation())
            .map_err(|error| map_jwt_error(&error))?;

        let subject = SubjectId::new(data.claims.sub)
            .map_err(|_| IdentityVerificationError::invalid("token has an empty subject"))?;
        // A malformed email claim is treated as absent.
        let email = data
            .claims
            .email
            .and_then(|raw| EmailAddress::new(raw).ok());
        Ok(VerifiedClaims { subject, email })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::firebase::Jwk;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::{Value, json};

    const PROJECT: &str = "fleet-test";
    const SIGNING_KEY: &str = include_str!("testdata/signing_key.pem");
    const JWKS: &str = include_str!("testdata/jwks.json");

    fn verifier() -> FirebaseTokenVerifier {
        let set: Value = serde_json::from_str(JWKS).expect("jwks fixture");
        let keys: Vec<Jwk> = serde_json::from_value(set["keys"].clone()).expect("keys");
        // Unroutable URL: any refetch fails as unavailable.
        let url = Url::parse("http://127.0.0.1:9/jwks").expect("url");
        FirebaseTokenVerifier::with_cache(PROJECT, JwkCache::with_keys(Client::new(), url, keys))
    }

    fn token(kid: &str, claims: Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_owned());
        let key = EncodingKey::from_rsa_pem(SIGNING_KEY.as_bytes()).expect("signing key");
        encode(&header, &claims, &key).expect("token")
    }

    fn claims(exp_offset: i64, audience: &str) -> Value {
        let now = Utc::now().timestamp();
        json!({
            "sub": "uid-123",
            "email": "ada@example.com",
            "aud": audience,
            "iss": format!("https://securetoken.google.com/{audience}"),
            "iat": now - 10,
            "exp": now + exp_offset,
        })
    }

    #[tokio::test]
    async fn accepts_valid_token() {
        let verified = verifier()
            .verify(&token("test-key-1", claims(600, PROJECT)))
            .await
            .expect("token should verify");

        assert_eq!(verified.subject.as_str(), "uid-123");
        assert_eq!(
            verified.email.as_ref().map(EmailAddress::as_str),
            Some("ada@example.com")
        );
    }

    #[tokio::test]
    async fn expired_token_is_reported_as_expired() {
        let err = verifier()
            .verify(&token("test-key-1", claims(-3600, PROJECT)))
            .await
            .expect_err("expired");
        assert!(matches!(err, IdentityVerificationError::Expired { .. }));
    }

    #[tokio::test]
    async fn foreign_project_is_invalid() {
        let err = verifier()
            .verify(&token("test-key-1", claims(600, "someone-else")))
            .await
            .expect_err("wrong audience");
        assert!(matches!(err, IdentityVerificationError::Invalid { .. }));
    }

    #[tokio::test]
    async fn garbage_is_invalid() {
        let err = verifier().verify("not-a-jwt").await.expect_err("garbage");
        assert!(matches!(err, IdentityVerificationError::Invalid { .. }));
    }

    #[tokio::test]
    async fn unknown_key_with_unreachable_endpoint_is_unavailable() {
        let err = verifier()
            .verify(&token("rotated-key", claims(600, PROJECT)))
            .await
            .expect_err("unknown kid");
        assert!(matches!(err, IdentityVerificationError::Unavailable { .. }));
    }
}
