//! Presigned artifact URLs.
//!
//! A URL carries its expiry and a keyed BLAKE3 MAC over `"{key}\n{expires}"`.
//! Anyone holding the URL can read the artifact until it expires; nothing else
//! is needed to authorize the request.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use thiserror::Error;

use super::{StorageKey, StoreError};

const KEY_CONTEXT: &str = "invoicer 2024 artifact url signing";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("presigned url expired")]
    Expired,
    #[error("presigned url signature mismatch")]
    BadSignature,
}

#[derive(Clone)]
pub struct UrlSigner {
    mac_key: [u8; 32],
    base_url: String,
}

impl core::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: &[u8], base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            mac_key: blake3::derive_key(KEY_CONTEXT, secret),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn mac(&self, key: &StorageKey, expires: i64) -> blake3::Hash {
        let message = format!("{key}\n{expires}");
        blake3::keyed_hash(&self.mac_key, message.as_bytes())
    }

    /// Sign `key` for `ttl` starting at `now`. Expiry has one-second resolution.
    pub fn sign(
        &self,
        key: &StorageKey,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<PresignedUrl, StoreError> {
        let presign_err = |reason: &str| StoreError::Presign {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let ttl = chrono::Duration::from_std(ttl).map_err(|_| presign_err("ttl out of range"))?;
        let expires = now
            .checked_add_signed(ttl)
            .ok_or_else(|| presign_err("expiry out of range"))?
            .timestamp();
        let expires_at = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or_else(|| presign_err("expiry out of range"))?;

        let signature = hex::encode(self.mac(key, expires).as_bytes());
        Ok(PresignedUrl {
            url: format!(
                "{}/artifacts/{key}?expires={expires}&signature={signature}",
                self.base_url
            ),
            expires_at,
        })
    }

    /// Check a presented `(expires, signature)` pair for `key` at `now`.
    pub fn verify(
        &self,
        key: &StorageKey,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let presented: [u8; 32] = hex::decode(signature)
            .ok()
            .and_then(|raw| raw.try_into().ok())
            .ok_or(SignatureError::BadSignature)?;

        // blake3::Hash equality is constant-time.
        if blake3::Hash::from(presented) != self.mac(key, expires) {
            return Err(SignatureError::BadSignature);
        }
        if now.timestamp() > expires {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact_store::DEFAULT_PRESIGN_TTL as DEFAULT_TTL;

    fn parse_query(url: &str) -> (i64, String) {
        let query = url.split_once('?').unwrap().1;
        let mut expires = 0;
        let mut signature = String::new();
        for pair in query.split('&') {
            let (k, v) = pair.split_once('=').unwrap();
            match k {
                "expires" => expires = v.parse().unwrap(),
                "signature" => signature = v.to_string(),
                _ => {}
            }
        }
        (expires, signature)
    }

    #[test]
    fn signed_url_verifies_until_expiry() {
        let signer = UrlSigner::new(b"secret", "http://localhost:8080/");
        let key = StorageKey::parse("INV1.pdf").unwrap();
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let presigned = signer.sign(&key, DEFAULT_TTL, now).unwrap();
        assert!(presigned.url.starts_with("http://localhost:8080/artifacts/INV1.pdf?expires="));
        assert_eq!(presigned.expires_at, now + chrono::Duration::minutes(15));

        let (expires, signature) = parse_query(&presigned.url);
        assert_eq!(signer.verify(&key, expires, &signature, now), Ok(()));
        assert_eq!(
            signer.verify(&key, expires, &signature, presigned.expires_at),
            Ok(())
        );
        assert_eq!(
            signer.verify(&key, expires, &signature, presigned.expires_at + chrono::Duration::seconds(1)),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn tampering_is_detected() {
        let signer = UrlSigner::new(b"secret", "http://h");
        let key = StorageKey::parse("INV1.pdf").unwrap();
        let other = StorageKey::parse("INV2.pdf").unwrap();
        let now = Utc::now();
        let (expires, signature) = parse_query(&signer.sign(&key, DEFAULT_TTL, now).unwrap().url);

        assert_eq!(signer.verify(&other, expires, &signature, now), Err(SignatureError::BadSignature));
        assert_eq!(signer.verify(&key, expires + 60, &signature, now), Err(SignatureError::BadSignature));
        assert_eq!(signer.verify(&key, expires, "zz", now), Err(SignatureError::BadSignature));

        let foreign = UrlSigner::new(b"other-secret", "http://h");
        assert_eq!(foreign.verify(&key, expires, &signature, now), Err(SignatureError::BadSignature));
    }
}
