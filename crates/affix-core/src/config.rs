//! Configuration module
//!
//! Process-level settings shared by every attachment type: where temp files go, the
//! defaults for local and S3-compatible stores, and processing defaults.

use crate::constants::DEFAULT_STORE_SAVE_TIMEOUT_SECS;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PROCESSOR: &str = "raster";
const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Clone, Debug)]
pub struct AffixConfig {
    pub temp_dir: PathBuf,
    // Storage configuration
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub aws_region: Option<String>,
    pub store_save_timeout_secs: u64,
    // Processing configuration
    pub default_processor: String,
    pub jpeg_quality: u8,
    pub database_url: Option<String>,
}

impl Default for AffixConfig {
    fn default() -> Self {
        Self {
            temp_dir: env::temp_dir().join("affix"),
            local_storage_path: None,
            local_storage_base_url: None,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            aws_region: None,
            store_save_timeout_secs: DEFAULT_STORE_SAVE_TIMEOUT_SECS,
            default_processor: DEFAULT_PROCESSOR.to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            database_url: None,
        }
    }
}

impl AffixConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let temp_dir = env::var("AFFIX_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.temp_dir);

        let store_save_timeout_secs = match env::var("AFFIX_STORE_SAVE_TIMEOUT_SECS") {
            Ok(value) => value.parse().map_err(|_| {
                anyhow::anyhow!("AFFIX_STORE_SAVE_TIMEOUT_SECS must be a whole number of seconds")
            })?,
            Err(_) => defaults.store_save_timeout_secs,
        };

        let jpeg_quality = match env::var("AFFIX_JPEG_QUALITY") {
            Ok(value) => value
                .parse::<u8>()
                .ok()
                .filter(|q| (1..=100).contains(q))
                .ok_or_else(|| anyhow::anyhow!("AFFIX_JPEG_QUALITY must be between 1 and 100"))?,
            Err(_) => defaults.jpeg_quality,
        };

        let config = Self {
            temp_dir,
            local_storage_path: env::var("AFFIX_LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("AFFIX_LOCAL_STORAGE_BASE_URL").ok(),
            s3_bucket: env::var("AFFIX_S3_BUCKET").ok(),
            s3_region: env::var("AFFIX_S3_REGION").ok(),
            s3_endpoint: env::var("AFFIX_S3_ENDPOINT").ok(),
            aws_region: env::var("AWS_REGION").ok(),
            store_save_timeout_secs,
            default_processor: env::var("AFFIX_PROCESSOR")
                .unwrap_or_else(|_| DEFAULT_PROCESSOR.to_string()),
            jpeg_quality,
            database_url: env::var("DATABASE_URL").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.store_save_timeout_secs == 0 {
            return Err(anyhow::anyhow!("store save timeout must be greater than zero"));
        }
        if self.s3_bucket.is_some() && self.s3_region().is_none() {
            return Err(anyhow::anyhow!(
                "AFFIX_S3_REGION or AWS_REGION is required when AFFIX_S3_BUCKET is set"
            ));
        }
        Ok(())
    }

    pub fn store_save_timeout(&self) -> Duration {
        Duration::from_secs(self.store_save_timeout_secs)
    }

    /// S3 region, falling back to `AWS_REGION`.
    pub fn s3_region(&self) -> Option<&str> {
        self.s3_region.as_deref().or(self.aws_region.as_deref())
    }
}
