pub mod categories;
pub mod llm;
pub mod prompt;

pub use categories::AllowedCategories;
pub use llm::{GeminiClient, LabelProvider};

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Category assigned whenever classification cannot produce an allowed label.
pub const UNKNOWN_CATEGORY: &str = "unknown";

pub struct Classifier {
    provider: Arc<dyn LabelProvider>,
    max_concurrency: usize,
}

impl Classifier {
    pub fn new(provider: Arc<dyn LabelProvider>, max_concurrency: usize) -> Self {
        Self {
            provider,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Classify one item against categories in their wire form.
    ///
    /// Never fails: undecodable categories, provider errors and answers
    /// outside the allowed set all come back as [`UNKNOWN_CATEGORY`].
    pub async fn classify(&self, item_name: &str, vendor_name: &str, allowed: &[String]) -> String {
        match AllowedCategories::decode(allowed) {
            Some(allowed) => self.classify_with(item_name, vendor_name, &allowed).await,
            None => {
                warn!(item = item_name, "Could not decode allowed categories");
                UNKNOWN_CATEGORY.to_string()
            }
        }
    }

    pub async fn classify_with(
        &self,
        item_name: &str,
        vendor_name: &str,
        allowed: &AllowedCategories,
    ) -> String {
        let prompt = prompt::build_classification_prompt(item_name, vendor_name, allowed);

        match self.provider.generate(&prompt).await {
            Ok(answer) => match allowed.accept(&answer) {
                Some(category) => {
                    debug!(item = item_name, category = %category, "Item classified");
                    category
                }
                None => {
                    warn!(
                        item = item_name,
                        answer = answer.trim(),
                        "Classifier answer not in allowed categories"
                    );
                    UNKNOWN_CATEGORY.to_string()
                }
            },
            Err(e) => {
                warn!(item = item_name, error = %e, "Classification request failed");
                UNKNOWN_CATEGORY.to_string()
            }
        }
    }

    /// Classify every item of one receipt, at most `max_concurrency` at a time.
    /// Results are in the same order as `item_names`.
    pub async fn classify_all(
        &self,
        item_names: &[String],
        vendor_name: &str,
        allowed: &AllowedCategories,
    ) -> Vec<String> {
        // Boxed so the future stays `Send` inside axum handlers.
        let pending: BoxFuture<'_, Vec<String>> = stream::iter(item_names)
            .map(|name| self.classify_with(name, vendor_name, allowed))
            .buffered(self.max_concurrency)
            .collect::<Vec<String>>()
            .boxed();
        pending.await
    }
}
