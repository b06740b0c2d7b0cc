//! Signing key cache for Firebase ID tokens.

use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::ports::IdentityVerificationError;

/// Google endpoint publishing the keys that sign Firebase ID tokens.
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kid: String,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

/// Keys cached in memory and refetched when an unknown `kid` shows up.
pub struct JwkCache {
    client: Client,
    url: Url,
    keys: RwLock<Vec<Jwk>>,
}

impl JwkCache {
    pub fn new(client: Client, url: Url) -> Self {
        Self::with_keys(client, url, Vec::new())
    }

    /// Seed the cache, for example with keys fetched at start-up.
    pub fn with_keys(client: Client, url: Url, keys: Vec<Jwk>) -> Self {
        Self {
            client,
            url,
            keys: RwLock::new(keys),
        }
    }

    /// Key for `kid`, refreshing the set once on a miss.
    pub async fn key(&self, kid: &str) -> Result<Jwk, IdentityVerificationError> {
        if let Some(key) = self.cached(kid).await {
            return Ok(key);
        }

        let fetched = self.fetch().await?;
        debug!(keys = fetched.len(), "refreshed identity signing keys");
        *self.keys.write().await = fetched;

        self.cached(kid)
            .await
            .ok_or_else(|| IdentityVerificationError::invalid("unknown signing key"))
    }

    async fn cached(&self, kid: &str) -> Option<Jwk> {
        self.keys
            .read()
            .await
            .iter()
            .find(|key| key.kid == kid)
            .cloned()
    }

    async fn fetch(&self) -> Result<Vec<Jwk>, IdentityVerificationError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|error| IdentityVerificationError::unavailable(error.to_string()))?;
        if !response.status().is_success() {
            return Err(IdentityVerificationError::unavailable(format!(
                "key endpoint returned status {}",
                response.status().as_u16()
            )));
        }
        let set: JwkSet = response
            .json()
            .await
            .map_err(|error| IdentityVerificationError::unavailable(error.to_string()))?;
        Ok(set.keys)
    }
}
