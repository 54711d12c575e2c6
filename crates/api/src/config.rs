use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ocr: OcrConfig,
    pub classifier: ClassifierConfig,
    pub concurrency: ConcurrencyConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub base_url: String,
    pub api_key: String,
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    pub poll_deadline_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Classification calls in flight across all requests.
    pub max_concurrent_llm_calls: usize,
    /// Classification calls in flight for a single receipt.
    pub max_concurrent_classifications: usize,
    pub max_concurrent_ocr_jobs: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "0.0.0.0:3000".to_string(),
                max_upload_bytes: 10 * 1024 * 1024,
            },
            ocr: OcrConfig {
                base_url: ocr::client::DEFAULT_BASE_URL.to_string(),
                api_key: String::new(),
                poll_interval_ms: 2000,
                max_poll_interval_ms: 10000,
                poll_deadline_secs: 120,
            },
            classifier: ClassifierConfig {
                base_url: classify::llm::DEFAULT_BASE_URL.to_string(),
                api_key: String::new(),
                model: classify::llm::DEFAULT_MODEL.to_string(),
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_llm_calls: 8,
                max_concurrent_classifications: 4,
                max_concurrent_ocr_jobs: 4,
                request_timeout_secs: 60,
            },
            cache: CacheConfig {
                enabled: true,
                max_entries: 10000,
            },
        }
    }
}

impl AppConfig {
    /// Build from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Both API keys are required; everything else
    /// falls back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            server: ServerConfig {
                bind_addr: get("BIND_ADDR").unwrap_or(defaults.server.bind_addr),
                max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", defaults.server.max_upload_bytes)?,
            },
            ocr: OcrConfig {
                base_url: get("TABSCANNER_BASE_URL").unwrap_or(defaults.ocr.base_url),
                api_key: get("TABSCANNER_API_KEY").context("TABSCANNER_API_KEY is not set")?,
                poll_interval_ms: parse_or(&get, "POLL_INTERVAL_MS", defaults.ocr.poll_interval_ms)?,
                max_poll_interval_ms: parse_or(
                    &get,
                    "MAX_POLL_INTERVAL_MS",
                    defaults.ocr.max_poll_interval_ms,
                )?,
                poll_deadline_secs: parse_or(&get, "POLL_DEADLINE_SECS", defaults.ocr.poll_deadline_secs)?,
            },
            classifier: ClassifierConfig {
                base_url: get("GEMINI_BASE_URL").unwrap_or(defaults.classifier.base_url),
                api_key: get("GEMINI_API_KEY").context("GEMINI_API_KEY is not set")?,
                model: get("GEMINI_MODEL").unwrap_or(defaults.classifier.model),
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_llm_calls: parse_or(
                    &get,
                    "MAX_CONCURRENT_LLM_CALLS",
                    defaults.concurrency.max_concurrent_llm_calls,
                )?,
                max_concurrent_classifications: parse_or(
                    &get,
                    "MAX_CONCURRENT_CLASSIFICATIONS",
                    defaults.concurrency.max_concurrent_classifications,
                )?,
                max_concurrent_ocr_jobs: parse_or(
                    &get,
                    "MAX_CONCURRENT_OCR_JOBS",
                    defaults.concurrency.max_concurrent_ocr_jobs,
                )?,
                request_timeout_secs: parse_or(
                    &get,
                    "REQUEST_TIMEOUT_SECS",
                    defaults.concurrency.request_timeout_secs,
                )?,
            },
            cache: CacheConfig {
                enabled: parse_or(&get, "CLASSIFICATION_CACHE_ENABLED", defaults.cache.enabled)?,
                max_entries: parse_or(
                    &get,
                    "CLASSIFICATION_CACHE_MAX_ENTRIES",
                    defaults.cache.max_entries,
                )?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ocr.poll_interval_ms == 0 {
            anyhow::bail!("POLL_INTERVAL_MS must be greater than zero");
        }
        if self.ocr.poll_deadline_secs == 0 {
            anyhow::bail!("POLL_DEADLINE_SECS must be greater than zero");
        }
        Ok(())
    }

    /// Copy safe to log: credentials masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.ocr.api_key = mask(&copy.ocr.api_key);
        copy.classifier.api_key = mask(&copy.classifier.api_key);
        copy
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has invalid value {raw:?}: {e}")),
        None => Ok(default),
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "***".to_string()
    }
}
