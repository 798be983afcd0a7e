//! Stream key issuance and resolution.
//!
//! A stream key is `<token-id-hex>.<hmac-sha256-hex>`. The signature lets a
//! key be checked without touching the database, and the token id indexes a
//! TTL cache holding the absolute path of the file being streamed.

use std::path::PathBuf;
use std::time::Duration;

use hmac::{Hmac, Mac};
use moka::sync::Cache;
use rh_core::config::StreamConfig;
use rh_core::{Error, Result, StreamTokenId};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maps opaque stream keys to files on disk.
pub trait StreamTokenResolver: Send + Sync {
    /// Cache `path` under `token_id` and return the key handed to clients.
    fn issue(&self, token_id: StreamTokenId, path: PathBuf) -> String;

    /// Verify `key` and extract its token id. Malformed or forged keys are a
    /// validation error.
    fn token_id(&self, key: &str) -> Result<StreamTokenId>;

    /// Path for `key`, or `None` if the token expired or was completed.
    fn resolve(&self, key: &str) -> Result<Option<PathBuf>>;

    /// Forget the cached path for `token_id`.
    fn invalidate(&self, token_id: StreamTokenId);
}

/// HMAC-signed keys over a moka TTL cache.
pub struct StreamTokenService {
    mac: HmacSha256,
    cache: Cache<StreamTokenId, PathBuf>,
}

impl StreamTokenService {
    /// Build the service. With no secret a random one is generated, so keys
    /// only stay valid for the life of the process.
    pub fn new(secret: Option<&str>, ttl: Duration, capacity: u64) -> Result<Self> {
        let mac = match secret {
            Some(secret) => HmacSha256::new_from_slice(secret.as_bytes()),
            None => HmacSha256::new_from_slice(&rand::random::<[u8; 32]>()),
        }
        .map_err(|e| Error::Internal(format!("invalid stream token secret: {e}")))?;

        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Ok(Self { mac, cache })
    }

    pub fn from_config(config: &StreamConfig) -> Result<Self> {
        Self::new(
            config.token_secret.as_deref(),
            Duration::from_secs(config.token_ttl_secs),
            config.token_cache_capacity,
        )
    }

    fn sign(&self, id: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        mac
    }
}

impl StreamTokenResolver for StreamTokenService {
    fn issue(&self, token_id: StreamTokenId, path: PathBuf) -> String {
        let id = token_id.simple();
        let signature = hex::encode(self.sign(&id).finalize().into_bytes());
        self.cache.insert(token_id, path);
        format!("{id}.{signature}")
    }

    fn token_id(&self, key: &str) -> Result<StreamTokenId> {
        let (id, signature) = key
            .split_once('.')
            .ok_or_else(|| Error::Validation("malformed stream key".into()))?;

        let token_id: StreamTokenId = id
            .parse()
            .map_err(|_| Error::Validation("malformed stream key".into()))?;
        let signature =
            hex::decode(signature).map_err(|_| Error::Validation("malformed stream key".into()))?;

        self.sign(id)
            .verify_slice(&signature)
            .map_err(|_| Error::Validation("stream key signature mismatch".into()))?;

        Ok(token_id)
    }

    fn resolve(&self, key: &str) -> Result<Option<PathBuf>> {
        let token_id = self.token_id(key)?;
        Ok(self.cache.get(&token_id))
    }

    fn invalidate(&self, token_id: StreamTokenId) {
        self.cache.invalidate(&token_id);
    }
}
