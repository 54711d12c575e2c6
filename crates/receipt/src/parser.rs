use chrono::Utc;
use classify::{AllowedCategories, Classifier, UNKNOWN_CATEGORY};
use ocr::{ExtractedLine, RawExtraction};
use tracing::{info, warn};

use crate::record::{ClassifiedItem, ParsedReceipt, format_timestamp};

pub const UNKNOWN_VENDOR: &str = "Unknown Vendor";
pub const NO_DESCRIPTION: &str = "No description";

/// Turns a raw OCR extraction into a classified receipt.
pub struct ReceiptParser {
    classifier: Classifier,
}

impl ReceiptParser {
    pub fn new(classifier: Classifier) -> Self {
        Self { classifier }
    }

    pub async fn parse(&self, raw: &RawExtraction, allowed: &[String]) -> ParsedReceipt {
        let vendor = raw
            .establishment
            .clone()
            .unwrap_or_else(|| UNKNOWN_VENDOR.to_string());
        let uploaded_at = format_timestamp(Utc::now());

        let names: Vec<String> = raw
            .line_items
            .iter()
            .map(|line| {
                line.desc_clean
                    .clone()
                    .unwrap_or_else(|| NO_DESCRIPTION.to_string())
            })
            .collect();

        let categories = match AllowedCategories::decode(allowed) {
            Some(allowed) => self.classifier.classify_all(&names, &vendor, &allowed).await,
            None => {
                warn!(vendor = %vendor, "Allowed categories could not be decoded, every item is unknown");
                vec![UNKNOWN_CATEGORY.to_string(); names.len()]
            }
        };

        let items: Vec<ClassifiedItem> = names
            .into_iter()
            .zip(categories)
            .zip(&raw.line_items)
            .map(|((name, category), line)| ClassifiedItem {
                name,
                price: line.line_total.unwrap_or(0.0),
                vendor: vendor.clone(),
                category,
                uploaded_at: uploaded_at.clone(),
            })
            .collect();

        let (tax, total) = summarize(&raw.summary_items);

        info!(vendor = %vendor, items = items.len(), tax, total, "Receipt parsed");

        ParsedReceipt { items, tax, total }
    }
}

/// Pick the tax and grand total out of the summary lines.
///
/// A description containing "TAX" sets the tax; one equal to "TOTAL" sets the
/// total (both case-insensitive). When several lines match, the last one wins.
pub fn summarize(summary_items: &[ExtractedLine]) -> (f64, f64) {
    let mut tax: Option<f64> = None;
    let mut total: Option<f64> = None;

    for line in summary_items {
        let desc = line.desc_clean.as_deref().unwrap_or_default().to_uppercase();
        let amount = line.line_total.unwrap_or(0.0);

        if desc.contains("TAX") {
            if let Some(previous) = tax {
                warn!(previous, replacement = amount, line = %desc, "Receipt has several tax lines, keeping the last");
            }
            tax = Some(amount);
        } else if desc == "TOTAL" {
            if let Some(previous) = total {
                warn!(previous, replacement = amount, "Receipt has several TOTAL lines, keeping the last");
            }
            total = Some(amount);
        }
    }

    (tax.unwrap_or(0.0), total.unwrap_or(0.0))
}
