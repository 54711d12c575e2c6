use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use classify::LabelProvider;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// Classification answers keyed by the hash of the prompt that produced them.
pub struct Cache {
    llm_responses: DashMap<String, String>,
    max_entries: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl Cache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            llm_responses: DashMap::new(),
            max_entries,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Cache an LLM response
    pub fn set_llm_response(&self, prompt: &str, response: String) {
        if self.max_entries == 0 {
            return;
        }
        if self.llm_responses.len() >= self.max_entries {
            // Simple eviction: clear 25% when full
            let to_remove: Vec<_> = self
                .llm_responses
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.llm_responses.remove(&key);
            }
        }
        let key = self.hash_text(prompt);
        self.llm_responses.insert(key, response);
    }

    pub fn get_llm_response(&self, prompt: &str) -> Option<String> {
        let key = self.hash_text(prompt);
        let found = self.llm_responses.get(&key).map(|r| r.value().clone());
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    fn hash_text(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            llm_responses_cached: self.llm_responses.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CacheStats {
    pub llm_responses_cached: usize,
    pub hits: usize,
    pub misses: usize,
}

/// Serves repeated prompts from the cache. Only successful answers are
/// stored, so a failed call is tried again next time.
pub struct CachedProvider {
    inner: Arc<dyn LabelProvider>,
    cache: Arc<Cache>,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn LabelProvider>, cache: Arc<Cache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl LabelProvider for CachedProvider {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if let Some(answer) = self.cache.get_llm_response(prompt) {
            tracing::debug!("Classification served from cache");
            return Ok(answer);
        }

        let answer = self.inner.generate(prompt).await?;
        self.cache.set_llm_response(prompt, answer.clone());
        Ok(answer)
    }
}
