//! Process configuration, read from environment variables.
//!
//! Required settings are checked up front and reported together, so a
//! misconfigured deployment fails once with the full list instead of one
//! variable at a time.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use invoicer_invoicing::attributes;

use crate::invoice_table::SecondaryIndex;

const DEV_PRESIGN_SECRET: &str = "invoicer-dev-presign-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Everything in process memory.
    Memory,
    /// Artifacts on the local filesystem, tables in memory.
    Fs,
    /// Artifacts on the filesystem, tables and pointers in Postgres.
    Postgres,
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "fs" => Ok(Self::Fs),
            "postgres" => Ok(Self::Postgres),
            other => Err(invalid(
                "STORAGE_BACKEND",
                format!("unknown backend {other:?} (expected memory, fs or postgres)"),
            )),
        }
    }
}

/// Environment as read, before validation. Keys are lowercased by `config`.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    aws_region: Option<String>,
    invoice_table: Option<String>,
    pointer_table: Option<String>,
    artifact_bucket: Option<String>,
    customer_index_name: Option<String>,
    customer_index_hash_key: Option<String>,

    listen_addr: Option<String>,
    public_base_url: Option<String>,
    presign_secret: Option<String>,
    presign_ttl_secs: Option<u64>,
    step_timeout_ms: Option<u64>,
    max_batch_size: Option<usize>,
    batch_window_ms: Option<u64>,
    max_concurrent_records: Option<usize>,
    storage_backend: Option<String>,
    artifact_root: Option<String>,
    database_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub region: String,
    pub invoice_table: String,
    pub pointer_table: String,
    pub artifact_bucket: String,
    pub customer_index: SecondaryIndex,

    pub listen_addr: SocketAddr,
    pub public_base_url: String,
    pub presign_secret: String,
    pub presign_ttl: Duration,
    pub step_timeout: Duration,
    pub max_batch_size: usize,
    pub batch_window: Duration,
    pub max_concurrent_records: usize,
    pub storage: StorageBackend,
    pub artifact_root: PathBuf,
    pub database_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::default().try_parsing(true))
    }

    /// Load from an explicit `Environment` source (tests inject a map).
    pub fn from_environment(env: Environment) -> Result<Self, ConfigError> {
        let raw: RawConfig = Config::builder()
            .add_source(env)
            .build()?
            .try_deserialize()?;
        Self::from_raw(raw)
    }

    /// Load from explicit `(VARIABLE, value)` pairs instead of the process
    /// environment.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: config::Map<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_environment(Environment::default().try_parsing(true).source(Some(map)))
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let mut required = |key: &'static str, value: Option<String>| -> String {
            match value.map(|v| v.trim().to_string()) {
                Some(v) if !v.is_empty() => v,
                _ => {
                    missing.push(key);
                    String::new()
                }
            }
        };

        let region = required("AWS_REGION", raw.aws_region);
        let invoice_table = required("INVOICE_TABLE", raw.invoice_table);
        let pointer_table = required("POINTER_TABLE", raw.pointer_table);
        let artifact_bucket = required("ARTIFACT_BUCKET", raw.artifact_bucket);
        let index_name = required("CUSTOMER_INDEX_NAME", raw.customer_index_name);
        let hash_key = required("CUSTOMER_INDEX_HASH_KEY", raw.customer_index_hash_key);

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        validate_name("INVOICE_TABLE", &invoice_table)?;
        validate_name("POINTER_TABLE", &pointer_table)?;
        validate_name("ARTIFACT_BUCKET", &artifact_bucket)?;
        validate_name("CUSTOMER_INDEX_NAME", &index_name)?;
        if !attributes::STRING_KEYS.contains(&hash_key.as_str()) {
            return Err(invalid(
                "CUSTOMER_INDEX_HASH_KEY",
                format!("{hash_key:?} is not a string invoice attribute"),
            ));
        }

        let listen_addr = raw
            .listen_addr
            .as_deref()
            .unwrap_or("0.0.0.0:8080")
            .parse::<SocketAddr>()
            .map_err(|e| invalid("LISTEN_ADDR", e.to_string()))?;

        let public_base_url = raw
            .public_base_url
            .unwrap_or_else(|| "http://localhost:8080".to_string());
        if !(public_base_url.starts_with("http://") || public_base_url.starts_with("https://")) {
            return Err(invalid("PUBLIC_BASE_URL", "must be an http(s) URL"));
        }

        let presign_secret = match raw.presign_secret {
            Some(s) if s.is_empty() => {
                return Err(invalid("PRESIGN_SECRET", "must not be empty when set"));
            }
            Some(s) => s,
            None => {
                warn!("PRESIGN_SECRET not set; using the development secret");
                DEV_PRESIGN_SECRET.to_string()
            }
        };

        let presign_ttl = Duration::from_secs(positive("PRESIGN_TTL_SECS", raw.presign_ttl_secs, 900)?);
        let step_timeout = Duration::from_millis(positive("STEP_TIMEOUT_MS", raw.step_timeout_ms, 10_000)?);
        let batch_window = Duration::from_millis(positive("BATCH_WINDOW_MS", raw.batch_window_ms, 250)?);
        let max_batch_size = positive("MAX_BATCH_SIZE", raw.max_batch_size, 100)?;
        let max_concurrent_records =
            positive("MAX_CONCURRENT_RECORDS", raw.max_concurrent_records, 16)?;

        let storage = match raw.storage_backend.as_deref() {
            None => StorageBackend::Memory,
            Some(s) => s.parse()?,
        };
        let database_url = raw.database_url.filter(|u| !u.trim().is_empty());
        if storage == StorageBackend::Postgres {
            if cfg!(not(feature = "postgres")) {
                return Err(invalid("STORAGE_BACKEND", "built without postgres support"));
            }
            if database_url.is_none() {
                return Err(ConfigError::Missing(vec!["DATABASE_URL"]));
            }
        }

        Ok(Self {
            region,
            invoice_table,
            pointer_table,
            artifact_bucket,
            customer_index: SecondaryIndex::new(index_name, hash_key),
            listen_addr,
            public_base_url,
            presign_secret,
            presign_ttl,
            step_timeout,
            max_batch_size,
            batch_window,
            max_concurrent_records,
            storage,
            artifact_root: PathBuf::from(raw.artifact_root.unwrap_or_else(|| "./data".to_string())),
            database_url,
        })
    }
}

fn validate_name(key: &'static str, value: &str) -> Result<(), ConfigError> {
    let ok = value.len() <= 255
        && !value.starts_with('.')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(invalid(key, format!("{value:?} may only contain [A-Za-z0-9_.-]")))
    }
}

fn positive<T>(key: &'static str, value: Option<T>, default: T) -> Result<T, ConfigError>
where
    T: PartialOrd + Default + Copy,
{
    let v = value.unwrap_or(default);
    if v > T::default() {
        Ok(v)
    } else {
        Err(invalid(key, "must be greater than zero"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        AppConfig::from_pairs(pairs.iter().copied())
    }

    const REQUIRED: [(&str, &str); 6] = [
        ("AWS_REGION", "eu-west-1"),
        ("INVOICE_TABLE", "Invoices"),
        ("POINTER_TABLE", "InvoicePdfs"),
        ("ARTIFACT_BUCKET", "invoice-pdfs"),
        ("CUSTOMER_INDEX_NAME", "CustomerIndex"),
        ("CUSTOMER_INDEX_HASH_KEY", "CustomerID"),
    ];

    #[test]
    fn required_only_uses_defaults() {
        let cfg = load(&REQUIRED).unwrap();
        assert_eq!(cfg.region, "eu-west-1");
        assert_eq!(cfg.customer_index, SecondaryIndex::new("CustomerIndex", "CustomerID"));
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.presign_ttl, Duration::from_secs(900));
        assert_eq!(cfg.step_timeout, Duration::from_secs(10));
        assert_eq!(cfg.max_batch_size, 100);
        assert_eq!(cfg.max_concurrent_records, 16);
        assert_eq!(cfg.storage, StorageBackend::Memory);
        assert_eq!(cfg.presign_secret, DEV_PRESIGN_SECRET);
    }

    #[test]
    fn all_missing_settings_are_reported_together() {
        let err = load(&[("AWS_REGION", "eu-west-1"), ("INVOICE_TABLE", " ")]).unwrap_err();
        match err {
            ConfigError::Missing(keys) => assert_eq!(
                keys,
                [
                    "INVOICE_TABLE",
                    "POINTER_TABLE",
                    "ARTIFACT_BUCKET",
                    "CUSTOMER_INDEX_NAME",
                    "CUSTOMER_INDEX_HASH_KEY"
                ]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn hash_key_must_be_an_invoice_attribute() {
        let mut pairs = REQUIRED.to_vec();
        pairs[5] = ("CUSTOMER_INDEX_HASH_KEY", "Customer");
        let err = load(&pairs).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CUSTOMER_INDEX_HASH_KEY", .. }));
    }

    #[test]
    fn hash_key_must_be_a_string_attribute() {
        for key in ["TotalAmount", "ProductList"] {
            let mut pairs = REQUIRED.to_vec();
            pairs[5] = ("CUSTOMER_INDEX_HASH_KEY", key);
            let err = load(&pairs).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: "CUSTOMER_INDEX_HASH_KEY", .. }),
                "{key} accepted"
            );
        }

        let mut pairs = REQUIRED.to_vec();
        pairs[5] = ("CUSTOMER_INDEX_HASH_KEY", "InvoiceDate");
        let config = load(&pairs).unwrap();
        assert_eq!(config.customer_index.hash_key, "InvoiceDate");
    }

    #[test]
    fn optional_overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("PRESIGN_SECRET", "s3cret"),
            ("PRESIGN_TTL_SECS", "60"),
            ("MAX_BATCH_SIZE", "10"),
            ("STORAGE_BACKEND", "fs"),
            ("ARTIFACT_ROOT", "/tmp/artifacts"),
        ]);
        let cfg = load(&pairs).unwrap();
        assert_eq!(cfg.listen_addr.port(), 9000);
        assert_eq!(cfg.presign_secret, "s3cret");
        assert_eq!(cfg.presign_ttl, Duration::from_secs(60));
        assert_eq!(cfg.max_batch_size, 10);
        assert_eq!(cfg.storage, StorageBackend::Fs);
        assert_eq!(cfg.artifact_root, PathBuf::from("/tmp/artifacts"));
    }

    #[test]
    fn rejects_bad_values() {
        for (key, value) in [
            ("PRESIGN_SECRET", ""),
            ("MAX_CONCURRENT_RECORDS", "0"),
            ("STORAGE_BACKEND", "s3"),
            ("INVOICE_TABLE", "bad/name"),
            ("PUBLIC_BASE_URL", "localhost"),
        ] {
            let mut pairs: Vec<_> = REQUIRED.iter().copied().filter(|(k, _)| *k != key).collect();
            pairs.push((key, value));
            assert!(
                load(&pairs).is_err(),
                "{key}={value:?} should be rejected"
            );
        }
    }

    #[test]
    fn postgres_backend_needs_database_url() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("STORAGE_BACKEND", "postgres"));
        assert!(load(&pairs).is_err());
    }
}
